//! Background curator: error-hint promotion, duplicate census, graph decay,
//! and a low-value sweep over the knowledge store.
//!
//! The curator does not own the tool registry (that would create a
//! dependency cycle with [`crate::tools`]); instead [`Curator::tick`]
//! returns the hint promotions it decided on and the caller applies them to
//! whatever registry it holds. Everything else the curator touches —
//! the knowledge store and its graph — it owns directly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{KnowledgeStore, StoreBackend};

const DUPLICATE_CENSUS_WINDOW: usize = 20;
const DUPLICATE_OVERLAP_THRESHOLD: f64 = 0.5;
const GRAPH_DECAY_FACTOR: f64 = 0.99;
const LOW_VALUE_IMPORTANCE_CEILING: u8 = 2;
const HINT_PROMOTION_MIN_COUNT: u32 = 2;

/// Cumulative curator statistics, exposed for the monitoring snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CuratorStats {
    pub runs: u64,
    pub hints_added: u64,
    pub merged_candidates: u64,
    pub links_decayed: u64,
    pub last_run: Option<DateTime<Utc>>,
}

/// One `(tool, error_type)` hint the curator decided to promote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHintPromotion {
    pub tool: String,
    pub error_type: String,
    pub lesson: String,
}

/// The full outcome of a single curator tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickReport {
    pub promotions: Vec<ErrorHintPromotion>,
    pub duplicate_candidates_found: usize,
    pub low_value_entries: usize,
    pub edges_decayed: usize,
    pub stats: CuratorStats,
}

#[derive(Default)]
struct PendingHints {
    counts: HashMap<(String, String), u32>,
    lessons: HashMap<(String, String), String>,
}

/// Background maintenance agent over the knowledge store and, indirectly
/// via [`TickReport::promotions`], the tool registry's error hints.
pub struct Curator {
    pending: Mutex<PendingHints>,
    stats: Mutex<CuratorStats>,
}

impl Default for Curator {
    fn default() -> Self {
        Self::new()
    }
}

impl Curator {
    #[must_use]
    pub fn new() -> Self {
        Self { pending: Mutex::new(PendingHints::default()), stats: Mutex::new(CuratorStats::default()) }
    }

    /// Record one `(tool, error_type)` occurrence together with the lesson
    /// the runner learned from it, so a later tick can consider promoting
    /// it into the tool schema's `error_hints` table.
    pub fn record_error(&self, tool: impl Into<String>, error_type: impl Into<String>, lesson: impl Into<String>) {
        let key = (tool.into(), error_type.into());
        let mut pending = self.pending.lock();
        *pending.counts.entry(key.clone()).or_insert(0) += 1;
        pending.lessons.entry(key).or_insert_with(|| lesson.into());
    }

    #[must_use]
    pub fn stats(&self) -> CuratorStats {
        self.stats.lock().clone()
    }

    /// Short, human-readable summary of the `top_n` most frequent
    /// `(tool, error_type)` pairs seen so far this run, for inclusion in a
    /// refine prompt or the task generator's context. Empty when nothing
    /// has been recorded yet.
    #[must_use]
    pub fn error_pattern_summary(&self, top_n: usize) -> String {
        let pending = self.pending.lock();
        let mut counts: Vec<(&(String, String), &u32)> = pending.counts.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        counts
            .into_iter()
            .take(top_n)
            .map(|((tool, error_type), count)| format!("- {tool}/{error_type}: {count} occurrences"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run one curator pass. `existing_hints` tells the curator which
    /// `(tool, error_type)` pairs already carry a hint, so it does not
    /// overwrite a human- or previously-curated entry.
    ///
    /// # Errors
    /// Propagates a persistence failure from the knowledge store.
    pub fn tick<B: StoreBackend>(
        &self,
        store: &KnowledgeStore<B>,
        existing_hints: &HashMap<(String, String), ()>,
    ) -> crate::Result<TickReport> {
        let promotions = self.promote_error_hints(existing_hints);
        let duplicate_candidates_found = self.duplicate_census(store);
        let edges_decayed = self.decay_graph(store);
        let low_value_entries = self.low_value_sweep(store);

        let stats = {
            let mut stats = self.stats.lock();
            stats.runs += 1;
            stats.hints_added += promotions.len() as u64;
            stats.merged_candidates += duplicate_candidates_found as u64;
            stats.links_decayed += edges_decayed as u64;
            stats.last_run = Some(Utc::now());
            stats.clone()
        };

        Ok(TickReport { promotions, duplicate_candidates_found, low_value_entries, edges_decayed, stats })
    }

    fn promote_error_hints(&self, existing_hints: &HashMap<(String, String), ()>) -> Vec<ErrorHintPromotion> {
        let mut pending = self.pending.lock();
        let mut promotions = Vec::new();
        let mut promoted_keys = Vec::new();

        for (key, &count) in &pending.counts {
            if count < HINT_PROMOTION_MIN_COUNT || existing_hints.contains_key(key) {
                continue;
            }
            if let Some(lesson) = pending.lessons.get(key) {
                promotions.push(ErrorHintPromotion {
                    tool: key.0.clone(),
                    error_type: key.1.clone(),
                    lesson: lesson.clone(),
                });
                promoted_keys.push(key.clone());
            }
        }

        for key in promoted_keys {
            pending.counts.remove(&key);
            pending.lessons.remove(&key);
        }
        promotions
    }

    /// Count-only duplicate detection over the most recent window.
    /// Deliberately does not merge or delete anything, matching the
    /// conservative behavior this crate's ranking model inherited.
    fn duplicate_census<B: StoreBackend>(&self, store: &KnowledgeStore<B>) -> usize {
        let lessons = store.snapshot();
        let window_start = lessons.len().saturating_sub(DUPLICATE_CENSUS_WINDOW);
        let window = &lessons[window_start..];

        let mut candidates = 0;
        for i in 0..window.len() {
            for j in (i + 1)..window.len() {
                if significant_word_overlap(&window[i].lesson, &window[j].lesson) >= DUPLICATE_OVERLAP_THRESHOLD {
                    candidates += 1;
                }
            }
        }
        candidates
    }

    fn decay_graph<B: StoreBackend>(&self, store: &KnowledgeStore<B>) -> usize {
        store.with_graph_mut(|graph| {
            graph.decay_all(GRAPH_DECAY_FACTOR);
            graph.edge_count()
        })
    }

    /// Count-only low-value sweep: never deletes.
    fn low_value_sweep<B: StoreBackend>(&self, store: &KnowledgeStore<B>) -> usize {
        store
            .snapshot()
            .iter()
            .filter(|l| l.importance <= LOW_VALUE_IMPORTANCE_CEILING && l.access_count == 0)
            .count()
    }
}

fn significant_word_overlap(a: &str, b: &str) -> f64 {
    let words_a: std::collections::HashSet<&str> = a.split_whitespace().filter(|w| w.len() > 3).collect();
    let words_b: std::collections::HashSet<&str> = b.split_whitespace().filter(|w| w.len() > 3).collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    let smaller = words_a.len().min(words_b.len());
    intersection as f64 / smaller as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::storage::tests::InMemoryBackend;
    use crate::types::Category;

    fn store() -> KnowledgeStore<InMemoryBackend> {
        KnowledgeStore::load(InMemoryBackend::default(), 100, 24).unwrap()
    }

    #[test]
    fn promotes_hint_after_second_occurrence() {
        let curator = Curator::new();
        curator.record_error("python_exec", "IndexError", "check list bounds before indexing");
        let first = curator.tick(&store(), &HashMap::new()).unwrap();
        assert!(first.promotions.is_empty());

        curator.record_error("python_exec", "IndexError", "check list bounds before indexing");
        let second = curator.tick(&store(), &HashMap::new()).unwrap();
        assert_eq!(second.promotions.len(), 1);
        assert_eq!(second.promotions[0].tool, "python_exec");
    }

    #[test]
    fn does_not_repromote_existing_hint() {
        let curator = Curator::new();
        curator.record_error("python_exec", "KeyError", "check dict key exists");
        curator.record_error("python_exec", "KeyError", "check dict key exists");
        let mut existing = HashMap::new();
        existing.insert(("python_exec".to_string(), "KeyError".to_string()), ());
        let report = curator.tick(&store(), &existing).unwrap();
        assert!(report.promotions.is_empty());
    }

    #[test]
    fn duplicate_census_counts_without_mutating_store() {
        let store = store();
        store
            .add("always validate the list bounds before indexing", Category::CodeError, super::super::SourceType::Failure, vec![], None, 5)
            .unwrap();
        store
            .add("always validate the list bounds before accessing", Category::CodeError, super::super::SourceType::Failure, vec![], None, 5)
            .unwrap();
        let curator = Curator::new();
        let report = curator.tick(&store, &HashMap::new()).unwrap();
        assert_eq!(report.duplicate_candidates_found, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn stats_are_cumulative_across_ticks() {
        let curator = Curator::new();
        curator.tick(&store(), &HashMap::new()).unwrap();
        curator.tick(&store(), &HashMap::new()).unwrap();
        assert_eq!(curator.stats().runs, 2);
    }

    #[test]
    fn error_pattern_summary_ranks_by_frequency_and_respects_top_n() {
        let curator = Curator::new();
        curator.record_error("python_exec", "IndexError", "check list bounds");
        curator.record_error("python_exec", "IndexError", "check list bounds");
        curator.record_error("python_exec", "KeyError", "check dict key exists");
        let summary = curator.error_pattern_summary(1);
        assert_eq!(summary, "- python_exec/IndexError: 2 occurrences");
    }

    #[test]
    fn error_pattern_summary_is_empty_with_nothing_recorded() {
        let curator = Curator::new();
        assert!(curator.error_pattern_summary(3).is_empty());
    }
}
