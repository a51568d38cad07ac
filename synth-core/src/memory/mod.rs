//! The knowledge store: persistent lessons, their relation graph, and the
//! query cache that sits in front of retrieval.

pub mod cache;
pub mod curator;
pub mod graph;
mod keywords;
pub(crate) mod storage;

pub use cache::QueryCache;
pub use curator::{Curator, CuratorStats};
pub use graph::{LinkType, RelationGraph};
pub use storage::{JsonStoreBackend, StoreBackend};

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Category;

/// How a lesson came to be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    VerifiedSuccess,
    Refinement,
    Failure,
    ToolError,
    User,
    System,
}

/// One record in the knowledge store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,

    pub lesson: String,
    pub category: Category,
    pub keywords: Vec<String>,
    pub source_type: SourceType,

    pub tools_involved: Vec<String>,
    pub error_type: Option<String>,

    pub base_importance: u8,
    pub importance: u8,
    pub access_count: u64,
    pub success_count: u64,
    pub fail_count: u64,

    pub links: Vec<graph::Edge>,
}

impl Lesson {
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.fail_count;
        if total == 0 {
            0.5 // unknown; treated as neutral by the ranking formula
        } else {
            self.success_count as f64 / total as f64
        }
    }

    /// Normalized text used for dedup-on-write comparisons.
    #[must_use]
    pub fn normalized_text(&self) -> String {
        self.lesson.trim().to_lowercase()
    }
}

const DECAY_RATE: f64 = 0.98;
const DEDUP_WINDOW: usize = 20;
const LINK_CANDIDATE_WINDOW: usize = 15;
const MAX_RELEVANCE_CANDIDATES: usize = 20;

/// The persistent set of lessons plus their relation graph and query cache.
///
/// Writers serialize under a process-local lock and save-on-write; readers
/// may observe a slightly stale snapshot until the next `reload()`.
pub struct KnowledgeStore<B: StoreBackend> {
    backend: B,
    lessons: RwLock<Vec<Lesson>>,
    graph: RwLock<RelationGraph>,
    cache: QueryCache,
    next_ordinal: std::sync::atomic::AtomicU64,
}

impl<B: StoreBackend> KnowledgeStore<B> {
    /// # Errors
    /// Propagates the backend's load error. A corrupt snapshot is handled
    /// by the backend itself (start empty rather than fail); this
    /// constructor only fails if the backend's *own* I/O (not parsing) is
    /// broken.
    pub fn load(backend: B, cache_capacity: usize, cache_ttl_hours: i64) -> crate::Result<Self> {
        let (lessons, graph) = backend.load()?;
        Ok(Self {
            backend,
            lessons: RwLock::new(lessons),
            graph: RwLock::new(graph),
            cache: QueryCache::new(cache_capacity, cache_ttl_hours),
            next_ordinal: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Force a re-read from disk so dashboard/background readers observe
    /// writes made by another process").
    pub fn reload(&self) -> crate::Result<()> {
        let (lessons, graph) = self.backend.load()?;
        *self.lessons.write() = lessons;
        *self.graph.write() = graph;
        Ok(())
    }

    fn persist(&self) -> crate::Result<()> {
        let lessons = self.lessons.read();
        let graph = self.graph.read();
        self.backend.save(&lessons, &graph)
    }

    /// Add a lesson, deduplicating against the most recent
    /// [`DEDUP_WINDOW`] entries by exact normalized-text match. On a true
    /// insertion: extract keywords, link against recent entries, add a
    /// graph node.
    ///
    /// # Errors
    /// Propagates a persistence failure from the backend.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &self,
        lesson: impl Into<String>,
        category: Category,
        source_type: SourceType,
        tools_involved: Vec<String>,
        error_type: Option<String>,
        base_importance: u8,
    ) -> crate::Result<Lesson> {
        let lesson_text = lesson.into();
        let normalized = lesson_text.trim().to_lowercase();

        {
            let mut lessons = self.lessons.write();
            let window_start = lessons.len().saturating_sub(DEDUP_WINDOW);
            if let Some(existing) = lessons[window_start..]
                .iter_mut()
                .find(|l| l.normalized_text() == normalized)
            {
                existing.access_count += 1;
                existing.last_accessed_at = Utc::now();
                let dup = existing.clone();
                drop(lessons);
                self.persist()?;
                return Ok(dup);
            }
        }

        let keywords = keywords::extract(&lesson_text);
        let base_importance = base_importance.clamp(1, 10);
        let now = Utc::now();
        let new_id = Uuid::new_v4();

        let new_lesson = Lesson {
            id: new_id,
            created_at: now,
            last_accessed_at: now,
            lesson: lesson_text,
            category,
            keywords,
            source_type,
            tools_involved,
            error_type,
            base_importance,
            importance: base_importance,
            access_count: 0,
            success_count: 0,
            fail_count: 0,
            links: Vec::new(),
        };

        let links = {
            let lessons = self.lessons.read();
            let window_start = lessons.len().saturating_sub(LINK_CANDIDATE_WINDOW);
            lessons[window_start..]
                .iter()
                .filter_map(|existing| link_weight(&new_lesson, existing).map(|w| (existing.id, w)))
                .collect::<Vec<_>>()
        };

        let mut stored = new_lesson;
        stored.links = links
            .iter()
            .map(|&(to, weight)| graph::Edge {
                to,
                weight,
                link_type: if weight > 0.7 { LinkType::Similar } else { LinkType::Related },
            })
            .collect();

        {
            let mut graph = self.graph.write();
            graph.add_node(new_id);
            for &(to, weight) in &links {
                let link_type = if weight > 0.7 { LinkType::Similar } else { LinkType::Related };
                graph.add_link(new_id, to, weight, link_type);
            }
        }

        self.lessons.write().push(stored.clone());
        self.persist()?;
        Ok(stored)
    }

    /// Ranked relevant lessons for `query`. Candidate gathering is
    /// capped at [`MAX_RELEVANCE_CANDIDATES`]; semantic score defaults to
    /// token-overlap fraction (no vector index in this crate). Updates
    /// access counters/timestamps on the returned entries.
    ///
    /// # Errors
    /// Propagates a persistence failure when access-counter updates are
    /// saved back to the backend.
    pub fn get_relevant(&self, query: &str, n: usize) -> crate::Result<Vec<Lesson>> {
        if let Some(ids) = self.cache.get(query) {
            let lessons = self.lessons.read();
            let found: Vec<Lesson> = ids
                .iter()
                .filter_map(|id| lessons.iter().find(|l| l.id == *id).cloned())
                .collect();
            if !found.is_empty() || ids.is_empty() {
                return Ok(found);
            }
        }

        let query_tokens = tokenize(query);
        let pagerank = self.graph.read().pagerank(0.85, 20);

        let mut scored: Vec<(f64, Lesson)> = {
            let lessons = self.lessons.read();
            let mut candidates: Vec<&Lesson> = lessons.iter().collect();
            candidates.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
            candidates.truncate(MAX_RELEVANCE_CANDIDATES);

            candidates
                .into_iter()
                .map(|l| {
                    let semantic = token_overlap_fraction(&query_tokens, &l.keywords);
                    let normalized_importance = f64::from(l.importance) / 10.0;
                    let access = (l.access_count as f64 + 1.0).ln() / 10.0_f64.ln().max(1.0);
                    let decay_factor = decay_factor(l);
                    let centrality = pagerank.get(&l.id).copied().unwrap_or(0.0);
                    let score = 0.30 * semantic
                        + 0.20 * normalized_importance
                        + 0.10 * access.min(1.0)
                        + 0.10 * decay_factor
                        + 0.15 * l.success_rate()
                        + 0.15 * centrality;
                    (score, l.clone())
                })
                .collect()
        };

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored.truncate(n);

        let result: Vec<Lesson> = scored.into_iter().map(|(_, l)| l).collect();

        {
            let mut lessons = self.lessons.write();
            for r in &result {
                if let Some(l) = lessons.iter_mut().find(|l| l.id == r.id) {
                    l.access_count += 1;
                    l.last_accessed_at = Utc::now();
                }
            }
        }

        self.cache.put(query, result.iter().map(|l| l.id).collect());
        self.persist()?;
        Ok(result)
    }

    /// # Errors
    /// Propagates a persistence failure, or [`crate::Error::NotFound`] if
    /// `id` does not name a stored lesson.
    pub fn mark_success(&self, id: Uuid) -> crate::Result<()> {
        self.mark_outcome(id, true)
    }

    /// # Errors
    /// Propagates a persistence failure, or [`crate::Error::NotFound`] if
    /// `id` does not name a stored lesson.
    pub fn mark_failure(&self, id: Uuid) -> crate::Result<()> {
        self.mark_outcome(id, false)
    }

    fn mark_outcome(&self, id: Uuid, success: bool) -> crate::Result<()> {
        {
            let mut lessons = self.lessons.write();
            let lesson = lessons.iter_mut().find(|l| l.id == id).ok_or(crate::Error::NotFound(id))?;
            if success {
                lesson.success_count += 1;
                lesson.importance = (lesson.importance + 1).min(lesson.base_importance.max(lesson.importance)).min(10);
            } else {
                lesson.fail_count += 1;
                lesson.importance = lesson.importance.saturating_sub(1).max(1);
            }
        }
        self.persist()
    }

    /// Apply one decay pass to every lesson. Idempotent per day: a
    /// second call on the same day recomputes the same `days_old` and
    /// therefore the same importance value.
    ///
    /// # Errors
    /// Propagates a persistence failure.
    pub fn decay(&self) -> crate::Result<DecayReport> {
        let now = Utc::now();
        let mut changed = 0u32;
        {
            let mut lessons = self.lessons.write();
            for lesson in lessons.iter_mut() {
                let days_old = (now - lesson.created_at).num_days().max(0);
                let new_importance = decayed_importance(lesson, days_old);
                if new_importance != lesson.importance {
                    changed += 1;
                }
                lesson.importance = new_importance;
            }
        }
        self.persist()?;
        Ok(DecayReport { entries_changed: changed, ran_at: now })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lessons.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Lesson> {
        self.lessons.read().iter().find(|l| l.id == id).cloned()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Lesson> {
        self.lessons.read().clone()
    }

    #[must_use]
    pub fn graph_snapshot(&self) -> RelationGraph {
        self.graph.read().clone()
    }

    pub fn with_graph_mut<R>(&self, f: impl FnOnce(&mut RelationGraph) -> R) -> R {
        f(&mut self.graph.write())
    }
}

/// Report returned by a single [`KnowledgeStore::decay`] pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayReport {
    pub entries_changed: u32,
    pub ran_at: DateTime<Utc>,
}

fn decayed_importance(lesson: &Lesson, days_old: i64) -> u8 {
    let total_uses = lesson.success_count + lesson.fail_count;
    let bias = if total_uses >= 3 && lesson.success_rate() < 0.4 { 0.85 } else { 1.0 };
    let factor = DECAY_RATE.powi(i32::try_from(days_old).unwrap_or(i32::MAX)) * bias;
    let raw = f64::from(lesson.base_importance) * factor;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = raw.round().max(1.0) as u8;
    rounded.min(lesson.base_importance.max(1))
}

fn decay_factor(lesson: &Lesson) -> f64 {
    if lesson.base_importance == 0 {
        0.0
    } else {
        f64::from(lesson.importance) / f64::from(lesson.base_importance)
    }
}

/// Link-weight rule between a newly-added lesson and an existing one
///: `0.3 + 0.05*overlap` if word overlap >= 3, `+0.2` same category,
/// `+0.3` overlapping tool sets; clipped to 1.0; persisted only if >= 0.3.
fn link_weight(new: &Lesson, existing: &Lesson) -> Option<f64> {
    let new_words: HashSet<&str> = new.lesson.split_whitespace().collect();
    let existing_words: HashSet<&str> = existing.lesson.split_whitespace().collect();
    let overlap = new_words.intersection(&existing_words).count();

    let mut weight = 0.0;
    if overlap >= 3 {
        weight += 0.3 + 0.05 * overlap as f64;
    }
    if new.category == existing.category {
        weight += 0.2;
    }
    let new_tools: HashSet<&String> = new.tools_involved.iter().collect();
    let existing_tools: HashSet<&String> = existing.tools_involved.iter().collect();
    if !new_tools.is_empty() && new_tools.intersection(&existing_tools).count() > 0 {
        weight += 0.3;
    }

    weight = weight.min(1.0);
    if weight >= 0.3 {
        Some(weight)
    } else {
        None
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}

fn token_overlap_fraction(query_tokens: &HashSet<String>, keywords: &[String]) -> f64 {
    if query_tokens.is_empty() || keywords.is_empty() {
        return 0.0;
    }
    let keyword_set: HashSet<&str> = keywords.iter().map(String::as_str).collect();
    let overlap = query_tokens.iter().filter(|t| keyword_set.contains(t.as_str())).count();
    overlap as f64 / query_tokens.len() as f64
}
