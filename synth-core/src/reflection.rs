//! Session-scoped reflection buffer and the closed error-type translation
//! table shared by the refiner's refine prompts and the reflection buffer's
//! own lesson field.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const CAPACITY: usize = 5;

/// One closed error type this system recognizes and has specific advice
/// for. Anything else falls back to the generic hint.
const KNOWN_ERROR_TYPES: &[(&str, &str, &str)] = &[
    ("IndexError", "the code indexed past the end of a sequence", "check bounds or use len() before indexing"),
    ("KeyError", "the code looked up a dictionary key that does not exist", "check the key with `in` or use .get() with a default"),
    ("ModuleNotFoundError", "the code imported a project-local or missing module", "don't import project modules; define everything inline"),
    ("ImportError", "an import failed to resolve a name from a module", "only import from the standard library, and verify the name exists"),
    ("TypeError", "an operation was applied to a value of the wrong type", "check argument types before the operation, or convert explicitly"),
    ("AttributeError", "the code accessed an attribute or method that does not exist on the value", "verify the type of the value and the attribute name"),
    ("ValueError", "a value was well-typed but semantically invalid for the operation", "validate the value's range or format before using it"),
    ("NameError", "the code referenced a name that was never defined", "define every name before it is used, and check for typos"),
    ("SyntaxError", "the generated code does not parse as valid Python", "re-check indentation, colons, and matching brackets"),
    ("RecursionError", "the code recursed without making progress toward a base case", "add or fix a base case and ensure the recursive call shrinks the input"),
    ("FileNotFoundError", "the code opened a path that does not exist", "verify the path exists and is relative to the workspace root"),
    ("ZeroDivisionError", "the code divided by zero", "check the divisor is non-zero before dividing"),
];

const GENERIC_LESSON: &str = "review and fix";

/// The advice lesson for a closed error type, or the generic fallback for
/// anything unrecognized.
#[must_use]
pub fn lesson_for_error_type(error_type: &str) -> &'static str {
    KNOWN_ERROR_TYPES
        .iter()
        .find(|(name, _, _)| *name == error_type)
        .map_or(GENERIC_LESSON, |&(_, _, fix)| fix)
}

/// A short "problem + fix hint" block for a refine prompt, with the raw
/// exception message preserved for debugging.
#[must_use]
pub fn translate_error(error_type: &str, raw_message: &str) -> String {
    match KNOWN_ERROR_TYPES.iter().find(|(name, _, _)| *name == error_type) {
        Some((name, problem, fix)) => {
            format!("{name}: {problem}. Fix: {fix}. (raw: {raw_message})")
        }
        None => format!("{error_type}: {GENERIC_LESSON}. (raw: {raw_message})"),
    }
}

/// Best-effort extraction of a Python exception type name from a raw
/// traceback/assertion message, e.g. `"IndexError: list index out of range"`
/// -> `"IndexError"`.
#[must_use]
pub fn extract_error_type(raw_message: &str) -> Option<String> {
    KNOWN_ERROR_TYPES
        .iter()
        .map(|(name, _, _)| *name)
        .find(|name| raw_message.contains(*name))
        .map(str::to_string)
}

/// One entry in the reflection buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionEntry {
    pub iteration: u32,
    pub error_type: String,
    pub error_summary: String,
    pub lesson: String,
    pub recorded_at: DateTime<Utc>,
}

/// Session-scoped bounded queue of reflections, reset at the start of
/// every task. Capacity 5 with sliding-window truncation (oldest dropped
/// first).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReflectionBuffer {
    entries: VecDeque<ReflectionEntry>,
}

impl ReflectionBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all entries, as happens at the start of every task.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Append a failed-iteration reflection, evicting the oldest entry if
    /// the buffer is already at capacity.
    pub fn record(&mut self, iteration: u32, error_type: impl Into<String>, error_summary: impl Into<String>) {
        let error_type = error_type.into();
        let lesson = lesson_for_error_type(&error_type).to_string();
        if self.entries.len() >= CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(ReflectionEntry {
            iteration,
            error_type,
            error_summary: error_summary.into(),
            lesson,
            recorded_at: Utc::now(),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn entries(&self) -> &VecDeque<ReflectionEntry> {
        &self.entries
    }

    /// Render as a "lessons from this session, do not repeat" bullet list
    /// for the refine prompt.
    #[must_use]
    pub fn as_prompt_section(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let mut out = String::from("Lessons from this session, do not repeat:\n");
        for entry in &self.entries {
            out.push_str(&format!("- [iteration {}] {}: {}\n", entry.iteration, entry.error_type, entry.lesson));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_error_type_gets_generic_lesson() {
        assert_eq!(lesson_for_error_type("WeirdCustomError"), GENERIC_LESSON);
    }

    #[test]
    fn known_error_type_has_specific_fix() {
        assert_ne!(lesson_for_error_type("IndexError"), GENERIC_LESSON);
    }

    #[test]
    fn buffer_is_empty_at_task_start() {
        let mut buf = ReflectionBuffer::new();
        buf.record(1, "IndexError", "list index out of range");
        buf.reset();
        assert!(buf.is_empty());
    }

    #[test]
    fn buffer_truncates_to_capacity_dropping_oldest() {
        let mut buf = ReflectionBuffer::new();
        for i in 0..8 {
            buf.record(i, "ValueError", format!("iteration {i}"));
        }
        assert_eq!(buf.len(), CAPACITY);
        assert_eq!(buf.entries().front().unwrap().iteration, 3);
    }

    #[test]
    fn module_not_found_translates_to_inline_definition_hint() {
        let translated = translate_error("ModuleNotFoundError", "No module named 'utils.validators'");
        assert!(translated.contains("define everything inline"));
    }

    #[test]
    fn extracts_known_error_type_from_raw_message() {
        assert_eq!(extract_error_type("IndexError: list index out of range").as_deref(), Some("IndexError"));
        assert_eq!(extract_error_type("totally unknown failure"), None);
    }
}
