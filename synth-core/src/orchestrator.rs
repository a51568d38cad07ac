//! Retrieval Orchestrator: the single facade workers and the refiner call
//! into for memory context, tool suggestions, project file hints, and
//! learned-pattern hints.

use std::path::{Path, PathBuf};

use crate::memory::{KnowledgeStore, Lesson, SourceType, StoreBackend};
use crate::patterns::{PatternStore, TestPattern};
use crate::skills::SkillStore;
use crate::types::{Category, Task, TaskKind};

/// Everything a worker or the refiner needs to build a prompt for one
/// task, assembled once at task start and passed by value (the memory
/// context is frozen for the lifetime of the task).
#[derive(Debug, Clone)]
pub struct Context {
    pub memories: Vec<Lesson>,
    pub memory_ids: Vec<uuid::Uuid>,
    pub task_kind: TaskKind,
    pub category: Category,
    pub suggested_tools: Vec<String>,
    pub tips: Vec<String>,
    pub project_files: Vec<String>,
    pub pattern_hints: Vec<TestPattern>,
}

impl Context {
    /// Render the non-memory parts of the context into a prompt section.
    #[must_use]
    pub fn as_prompt_section(&self) -> String {
        let mut out = String::new();
        if !self.tips.is_empty() {
            out.push_str("Tips:\n");
            for tip in &self.tips {
                out.push_str(&format!("- {tip}\n"));
            }
        }
        if !self.project_files.is_empty() {
            out.push_str("Relevant project files:\n");
            for file in &self.project_files {
                out.push_str(&format!("- {file}\n"));
            }
        }
        if !self.pattern_hints.is_empty() {
            out.push_str("Learned test-shape patterns:\n");
            for pattern in &self.pattern_hints {
                out.push_str(&format!(
                    "- {} -> {} (hint: {})\n",
                    pattern.example_in, pattern.example_out, pattern.task_hint
                ));
            }
        }
        out
    }
}

const PATTERN_HINTS_PER_CATEGORY: usize = 2;
const PROJECT_FILE_SCAN_LIMIT: usize = 8;
const DEFAULT_MEMORY_N: usize = 5;

/// Keyword table for task-kind detection over the closed task-kind set.
const TASK_KIND_KEYWORDS: &[(TaskKind, &[&str])] = &[
    (TaskKind::FileCreate, &["create file", "write file", "save to", "generate a file"]),
    (TaskKind::FileRead, &["read file", "open file", "load file", "contents of"]),
    (TaskKind::FileList, &["list files", "list directory", "show files", "directory listing"]),
    (TaskKind::CodeExec, &["solve(", "write a function", "implement", "return"]),
    (TaskKind::Analysis, &["analyze", "explain", "why does", "what is wrong"]),
];

/// Keyword table for lesson-category detection over the closed 11-tag set.
const LESSON_CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (Category::StringManipulation, &["string", "substring", "reverse", "palindrome", "char"]),
    (Category::Math, &["sum", "average", "prime", "factorial", "math", "number"]),
    (Category::ListOps, &["list", "array", "sort", "filter", "dedupe"]),
    (Category::DictOps, &["dict", "dictionary", "mapping", "key", "value"]),
    (Category::Validation, &["valid", "validate", "check that", "sanitize"]),
    (Category::Parsing, &["parse", "tokenize", "extract fields", "format"]),
];

/// Category-specific advice shown as a "tip" in the prompt.
const CATEGORY_TIPS: &[(Category, &str)] = &[
    (Category::StringManipulation, "prefer slicing and built-in string methods over manual loops"),
    (Category::Math, "watch for integer division and floating-point edge cases"),
    (Category::ListOps, "don't mutate the input list unless the task asks for it"),
    (Category::DictOps, "use .get() with a default instead of bare indexing"),
    (Category::Validation, "return a boolean; don't raise on invalid input unless asked"),
    (Category::Parsing, "trim whitespace and handle empty input explicitly"),
];

fn detect_task_kind(text: &str) -> TaskKind {
    let lower = text.to_lowercase();
    TASK_KIND_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map_or(TaskKind::General, |(kind, _)| *kind)
}

fn detect_category(text: &str) -> Category {
    let lower = text.to_lowercase();
    LESSON_CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map_or(Category::General, |(category, _)| *category)
}

fn suggested_tools_for(kind: TaskKind) -> Vec<String> {
    match kind {
        TaskKind::FileCreate => vec!["write_file".to_string()],
        TaskKind::FileRead => vec!["read_file".to_string()],
        TaskKind::FileList => vec!["list_dir".to_string()],
        TaskKind::CodeExec => vec!["python_exec".to_string()],
        TaskKind::Analysis => vec!["python_exec".to_string(), "search_files".to_string()],
        TaskKind::General => vec!["python_exec".to_string()],
    }
}

/// Bounded, keyword-matched scan of a project root for files whose name
/// overlaps the task text. No indexing or embeddings.
fn scan_project_files(project_root: &Path, task_text: &str, limit: usize) -> Vec<String> {
    let lower = task_text.to_lowercase();
    let tokens: Vec<&str> = lower.split_whitespace().filter(|t| t.len() > 3).collect();

    let Ok(entries) = std::fs::read_dir(project_root) else {
        return Vec::new();
    };

    let mut matches: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| {
            let name_lower = name.to_lowercase();
            tokens.iter().any(|t| name_lower.contains(t))
        })
        .collect();
    matches.sort();
    matches.truncate(limit);
    matches
}

/// The single facade over memory retrieval, tool suggestion, project file
/// search, and pattern hints.
pub struct Orchestrator<B: StoreBackend> {
    store: KnowledgeStore<B>,
    project_root: Option<PathBuf>,
}

impl<B: StoreBackend> Orchestrator<B> {
    #[must_use]
    pub fn new(store: KnowledgeStore<B>, project_root: Option<PathBuf>) -> Self {
        Self { store, project_root }
    }

    #[must_use]
    pub fn store(&self) -> &KnowledgeStore<B> {
        &self.store
    }

    /// Build the full task context: category detection, relevant
    /// memories, suggested tools, static tips, project files, and pattern
    /// hints.
    ///
    /// # Errors
    /// Propagates a persistence failure from the knowledge store.
    pub fn get_context(&self, task: &Task, patterns: &PatternStore) -> crate::Result<Context> {
        let task_kind = detect_task_kind(&task.description);
        let category = detect_category(&task.description);

        let memories = self.store.get_relevant(&task.description, DEFAULT_MEMORY_N)?;
        let memory_ids = memories.iter().map(|l| l.id).collect();

        let tips = CATEGORY_TIPS
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, tip)| vec![(*tip).to_string()])
            .unwrap_or_default();

        let project_files = self
            .project_root
            .as_deref()
            .map(|root| scan_project_files(root, &task.description, PROJECT_FILE_SCAN_LIMIT))
            .unwrap_or_default();

        let pattern_hints = patterns.for_category(category, PATTERN_HINTS_PER_CATEGORY);

        Ok(Context {
            memories,
            memory_ids,
            task_kind,
            category,
            suggested_tools: suggested_tools_for(task_kind),
            tips,
            project_files,
            pattern_hints,
        })
    }

    /// Rerun retrieval with the refine-specific fields fused into the
    /// query text.
    ///
    /// # Errors
    /// Propagates a persistence failure from the knowledge store.
    pub fn get_refine_context(
        &self,
        task: &Task,
        current_response: &str,
        errors: &[String],
        tools_tried: &[String],
        patterns: &PatternStore,
    ) -> crate::Result<Context> {
        let fused_query = format!(
            "{}\n{}\n{}\n{}",
            task.description,
            current_response,
            errors.join(" "),
            tools_tried.join(" ")
        );
        let mut context = self.get_context(task, patterns)?;
        let memories = self.store.get_relevant(&fused_query, DEFAULT_MEMORY_N)?;
        context.memory_ids = memories.iter().map(|l| l.id).collect();
        context.memories = memories;
        Ok(context)
    }

    /// Apply success/failure feedback to each memory id, invoked by the
    /// runner after a task completes.
    ///
    /// # Errors
    /// Propagates a persistence failure from the knowledge store.
    pub fn mark_memories_feedback(&self, ids: &[uuid::Uuid], success: bool) -> crate::Result<()> {
        for &id in ids {
            if success {
                self.store.mark_success(id)?;
            } else {
                self.store.mark_failure(id)?;
            }
        }
        Ok(())
    }

    /// Record one lesson via the underlying store. Thin pass-through kept
    /// on the facade so callers never need a direct store reference for
    /// the common write path.
    ///
    /// # Errors
    /// Propagates a persistence failure from the knowledge store.
    #[allow(clippy::too_many_arguments)]
    pub fn remember(
        &self,
        lesson: impl Into<String>,
        category: Category,
        source_type: SourceType,
        tools_involved: Vec<String>,
        error_type: Option<String>,
        base_importance: u8,
    ) -> crate::Result<Lesson> {
        self.store.add(lesson, category, source_type, tools_involved, error_type, base_importance)
    }

    /// Apply one decay pass and return a report.
    ///
    /// # Errors
    /// Propagates a persistence failure from the knowledge store.
    pub fn run_maintenance(&self) -> crate::Result<crate::memory::DecayReport> {
        self.store.decay()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::storage::tests::InMemoryBackend;
    use crate::types::TestCase;
    use crate::types::Value;

    fn orchestrator() -> Orchestrator<InMemoryBackend> {
        let store = KnowledgeStore::load(InMemoryBackend::default(), 100, 24).unwrap();
        Orchestrator::new(store, None)
    }

    #[test]
    fn detects_code_exec_kind_from_solve_mention() {
        assert_eq!(detect_task_kind("implement solve(x) that reverses a string"), TaskKind::CodeExec);
    }

    #[test]
    fn detects_string_manipulation_category() {
        assert_eq!(detect_category("reverse the input string"), Category::StringManipulation);
    }

    #[test]
    fn get_context_includes_pattern_hints_for_detected_category() {
        let orch = orchestrator();
        let mut patterns = PatternStore::new();
        patterns.learn(
            Category::StringManipulation,
            "reverse a string",
            &TestCase { input: Value::Str("ab".into()), expected: Value::Str("ba".into()) },
        );
        let task = Task::new("reverse this string please", vec![]);
        let context = orch.get_context(&task, &patterns).unwrap();
        assert_eq!(context.pattern_hints.len(), 1);
    }

    #[test]
    fn mark_memories_feedback_updates_success_counts() {
        let orch = orchestrator();
        let lesson = orch
            .remember("check bounds before indexing", Category::CodeError, SourceType::Failure, vec![], None, 5)
            .unwrap();
        orch.mark_memories_feedback(&[lesson.id], true).unwrap();
        let reloaded = orch.store().get(lesson.id).unwrap();
        assert_eq!(reloaded.success_count, 1);
    }
}
