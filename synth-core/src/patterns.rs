//! Test-pattern learner: records one exemplar per
//! `(category, input_type, output_type)` from every verified task, so the
//! task generator and the retrieval orchestrator can seed future tasks and
//! prompts with a realistic shape for that category.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Category, TestCase, ValueTypeTag};

/// A learned `(category, input-type, output-type)` exemplar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPattern {
    pub category: Category,
    pub input_type: ValueTypeTag,
    pub output_type: ValueTypeTag,
    pub example_in: String,
    pub example_out: String,
    pub task_hint: String,
    pub learned_at: DateTime<Utc>,
    pub use_count: u64,
}

type PatternKey = (Category, ValueTypeTag, ValueTypeTag);

/// The cross-session store of learned test patterns, deduplicated by
/// `(category, input_type, output_type)`.
#[derive(Debug, Default, Clone)]
pub struct PatternStore {
    patterns: HashMap<PatternKey, TestPattern>,
}

impl PatternStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pattern learned from a successfully verified task, keyed by
    /// the first test case's types. Duplicates bump `use_count` and refresh
    /// `learned_at` rather than inserting a second entry.
    pub fn learn(&mut self, category: Category, task_hint: &str, first_case: &TestCase) {
        let key = (category, first_case.input.type_tag(), first_case.expected.type_tag());
        if let Some(existing) = self.patterns.get_mut(&key) {
            existing.use_count += 1;
            existing.learned_at = Utc::now();
            return;
        }
        self.patterns.insert(
            key,
            TestPattern {
                category,
                input_type: first_case.input.type_tag(),
                output_type: first_case.expected.type_tag(),
                example_in: first_case.input.to_python_repr(),
                example_out: first_case.expected.to_python_repr(),
                task_hint: task_hint.to_string(),
                learned_at: Utc::now(),
                use_count: 1,
            },
        );
    }

    /// Up to `n` patterns recorded for `category`, most-used first.
    #[must_use]
    pub fn for_category(&self, category: Category, n: usize) -> Vec<TestPattern> {
        let mut matches: Vec<&TestPattern> = self.patterns.values().filter(|p| p.category == category).collect();
        matches.sort_by(|a, b| b.use_count.cmp(&a.use_count).then_with(|| b.learned_at.cmp(&a.learned_at)));
        matches.truncate(n);
        matches.into_iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn case(input: Value, expected: Value) -> TestCase {
        TestCase { input, expected }
    }

    #[test]
    fn duplicate_key_bumps_use_count_instead_of_inserting() {
        let mut store = PatternStore::new();
        let tc = case(Value::Str("abc".into()), Value::Str("cba".into()));
        store.learn(Category::StringManipulation, "reverse a string", &tc);
        store.learn(Category::StringManipulation, "reverse another string", &tc);
        assert_eq!(store.len(), 1);
        assert_eq!(store.for_category(Category::StringManipulation, 5)[0].use_count, 2);
    }

    #[test]
    fn different_type_pair_is_a_distinct_pattern() {
        let mut store = PatternStore::new();
        store.learn(Category::Math, "sum a list", &case(Value::List(vec![]), Value::Int(0)));
        store.learn(Category::Math, "average a list", &case(Value::List(vec![]), Value::Float(0.0)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn for_category_caps_at_n() {
        let mut store = PatternStore::new();
        let inputs = [Value::Int(1), Value::Float(1.0), Value::Bool(true), Value::Str("x".into()), Value::List(vec![])];
        for input in inputs {
            store.learn(Category::Math, "task", &case(input, Value::Int(1)));
        }
        assert_eq!(store.len(), 5);
        assert!(store.for_category(Category::Math, 2).len() <= 2);
    }
}
