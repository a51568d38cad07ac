//! Adaptive per-category difficulty tracking.
//!
//! Tracks success rate at the current global difficulty; raises difficulty
//! when the pool is doing well, lowers it when struggling, and surfaces a
//! worst-first weakness list the task generator samples from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::Category;

const MIN_DIFFICULTY: u8 = 1;
const MAX_DIFFICULTY: u8 = 5;
const MIN_SAMPLES_FOR_ADJUSTMENT: usize = 3;
const RAISE_THRESHOLD: f64 = 0.75;
const LOWER_THRESHOLD: f64 = 0.4;
const MAX_SCORE_SAMPLES: usize = 20;
const MAX_HISTORY: usize = 100;
const WEAKNESS_MIN_SAMPLES: usize = 3;
const WEAKNESS_MAX_SUCCESS_RATE: f64 = 0.5;
const WEAKNESS_TOP_N: usize = 5;

/// Per-`(category, difficulty)` outcome counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryStats {
    pub total: u64,
    pub success: u64,
    pub score_samples: Vec<u32>,
}

impl CategoryStats {
    fn record(&mut self, succeeded: bool, score: u32) {
        self.total += 1;
        if succeeded {
            self.success += 1;
        }
        self.score_samples.push(score);
        if self.score_samples.len() > MAX_SCORE_SAMPLES {
            self.score_samples.remove(0);
        }
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64
        }
    }
}

/// One completed-task record kept in the bounded history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub category: Category,
    pub difficulty: u8,
    pub succeeded: bool,
    pub score: u32,
}

/// Adaptive curriculum state: current global difficulty, per-category
/// counters, derived weaknesses, and a bounded history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Curriculum {
    pub current_difficulty: u8,
    stats: HashMap<(Category, u8), CategoryStats>,
    history: Vec<HistoryEntry>,
}

impl Default for Curriculum {
    fn default() -> Self {
        Self { current_difficulty: 1, stats: HashMap::new(), history: Vec::new() }
    }
}

impl Curriculum {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed task's outcome, possibly adjusting the global
    /// difficulty.
    pub fn record_task(&mut self, category: Category, succeeded: bool, score: u32) {
        let difficulty = self.current_difficulty;
        self.stats.entry((category, difficulty)).or_default().record(succeeded, score);

        self.history.push(HistoryEntry { category, difficulty, succeeded, score });
        if self.history.len() > MAX_HISTORY {
            self.history.remove(0);
        }

        self.maybe_adjust_difficulty(category, difficulty);
    }

    fn maybe_adjust_difficulty(&mut self, category: Category, difficulty: u8) {
        let Some(stats) = self.stats.get(&(category, difficulty)) else { return };
        if (stats.total as usize) < MIN_SAMPLES_FOR_ADJUSTMENT {
            return;
        }
        let rate = stats.success_rate();
        if rate >= RAISE_THRESHOLD && self.current_difficulty < MAX_DIFFICULTY {
            self.current_difficulty += 1;
        } else if rate < LOWER_THRESHOLD && self.current_difficulty > MIN_DIFFICULTY {
            self.current_difficulty -= 1;
        }
    }

    /// Categories with at least [`WEAKNESS_MIN_SAMPLES`] samples (summed
    /// across every difficulty) and an aggregate success rate below
    /// [`WEAKNESS_MAX_SUCCESS_RATE`], worst-first, capped at
    /// [`WEAKNESS_TOP_N`].
    #[must_use]
    pub fn weaknesses(&self) -> Vec<Category> {
        let mut per_category: HashMap<Category, (u64, u64)> = HashMap::new();
        for ((category, _), stats) in &self.stats {
            let entry = per_category.entry(*category).or_insert((0, 0));
            entry.0 += stats.total;
            entry.1 += stats.success;
        }

        let mut weak: Vec<(Category, f64)> = per_category
            .into_iter()
            .filter(|(_, (total, _))| *total as usize >= WEAKNESS_MIN_SAMPLES)
            .map(|(category, (total, success))| (category, success as f64 / total as f64))
            .filter(|(_, rate)| *rate < WEAKNESS_MAX_SUCCESS_RATE)
            .collect();

        weak.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        weak.truncate(WEAKNESS_TOP_N);
        weak.into_iter().map(|(category, _)| category).collect()
    }

    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    #[must_use]
    pub fn stats_for(&self, category: Category, difficulty: u8) -> Option<&CategoryStats> {
        self.stats.get(&(category, difficulty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_raises_after_three_strong_samples() {
        let mut curriculum = Curriculum::new();
        for _ in 0..3 {
            curriculum.record_task(Category::Math, true, 24);
        }
        assert_eq!(curriculum.current_difficulty, 2);
    }

    #[test]
    fn difficulty_lowers_after_three_weak_samples() {
        let mut curriculum = Curriculum::new();
        curriculum.current_difficulty = 3;
        for _ in 0..3 {
            curriculum.record_task(Category::Math, false, 5);
        }
        assert_eq!(curriculum.current_difficulty, 2);
    }

    #[test]
    fn difficulty_never_exceeds_bounds() {
        let mut curriculum = Curriculum::new();
        curriculum.current_difficulty = MAX_DIFFICULTY;
        for _ in 0..10 {
            curriculum.record_task(Category::Math, true, 25);
        }
        assert_eq!(curriculum.current_difficulty, MAX_DIFFICULTY);
    }

    #[test]
    fn weaknesses_exclude_categories_with_too_few_samples() {
        let mut curriculum = Curriculum::new();
        curriculum.record_task(Category::Parsing, false, 2);
        assert!(curriculum.weaknesses().is_empty());
    }

    #[test]
    fn weaknesses_sorted_worst_first() {
        let mut curriculum = Curriculum::new();
        for _ in 0..3 {
            curriculum.record_task(Category::Parsing, false, 2);
        }
        curriculum.current_difficulty = 1;
        for _ in 0..3 {
            curriculum.record_task(Category::DictOps, false, 2);
        }
        let weak = curriculum.weaknesses();
        assert!(weak.contains(&Category::Parsing));
        assert!(weak.contains(&Category::DictOps));
    }

    #[test]
    fn history_is_bounded() {
        let mut curriculum = Curriculum::new();
        for _ in 0..(MAX_HISTORY + 10) {
            curriculum.record_task(Category::General, true, 20);
        }
        assert_eq!(curriculum.history().len(), MAX_HISTORY);
    }
}
