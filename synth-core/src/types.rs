//! Shared data model: tasks, test cases, candidate code, and worker responses.
//!
//! These types are immutable once constructed: a `WorkerResponse` is
//! produced exactly once and never mutated in place, a `Task` is a
//! snapshot of the problem the pipeline is solving.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A value drawn from the task-generator's literal grammar: integer, float,
/// boolean, string, list, string-keyed mapping, tuple, or null.
///
/// `Tuple` is distinguished from `List` only for `repr`-style rendering
/// (Python tuples and lists serialize with different brackets); structurally
/// they behave the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(BTreeMap<String, Value>),
}

impl Value {
    /// The closed type-tag used to key `TestPattern`s.
    #[must_use]
    pub fn type_tag(&self) -> ValueTypeTag {
        match self {
            Value::Null => ValueTypeTag::Null,
            Value::Bool(_) => ValueTypeTag::Bool,
            Value::Int(_) => ValueTypeTag::Int,
            Value::Float(_) => ValueTypeTag::Float,
            Value::Str(_) => ValueTypeTag::Str,
            Value::List(_) => ValueTypeTag::List,
            Value::Tuple(_) => ValueTypeTag::Tuple,
            Value::Dict(_) => ValueTypeTag::Dict,
        }
    }

    /// Render this value the way Python's `repr()` would, so the rendered
    /// literal round-trips through an injected `assert f(x) == <repr>` line
    /// for strings, tuples, lists, and dicts.
    #[must_use]
    pub fn to_python_repr(&self) -> String {
        match self {
            Value::Null => "None".to_string(),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    format!("{f}")
                }
            }
            Value::Str(s) => format!("{s:?}"),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::to_python_repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(Value::to_python_repr).collect();
                if inner.len() == 1 {
                    format!("({},)", inner[0])
                } else {
                    format!("({})", inner.join(", "))
                }
            }
            Value::Dict(map) => {
                let inner: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{k:?}: {}", v.to_python_repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }
}

/// The closed set of value kinds, mirrored for pattern-matching keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueTypeTag {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Tuple,
    Dict,
}

impl fmt::Display for ValueTypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueTypeTag::Null => "null",
            ValueTypeTag::Bool => "bool",
            ValueTypeTag::Int => "int",
            ValueTypeTag::Float => "float",
            ValueTypeTag::Str => "str",
            ValueTypeTag::List => "list",
            ValueTypeTag::Tuple => "tuple",
            ValueTypeTag::Dict => "dict",
        };
        f.write_str(s)
    }
}

/// One `{input, expected}` pair for `solve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Value,
    pub expected: Value,
}

/// The closed category set used for memory tagging and category detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    StringManipulation,
    Math,
    ListOps,
    DictOps,
    Validation,
    Parsing,
    CodePattern,
    CodeError,
    CodeLogic,
    ToolError,
    General,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::StringManipulation => "string-manipulation",
            Category::Math => "math",
            Category::ListOps => "list-ops",
            Category::DictOps => "dict-ops",
            Category::Validation => "validation",
            Category::Parsing => "parsing",
            Category::CodePattern => "code-pattern",
            Category::CodeError => "code-error",
            Category::CodeLogic => "code-logic",
            Category::ToolError => "tool-error",
            Category::General => "general",
        };
        f.write_str(s)
    }
}

/// The closed task-kind set the category detector recognizes, kept
/// distinct from [`Category`]: task kind describes *what the task asks for*,
/// category describes *what was learned about it*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    FileCreate,
    FileRead,
    FileList,
    CodeExec,
    Analysis,
    General,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::FileCreate => "file_create",
            TaskKind::FileRead => "file_read",
            TaskKind::FileList => "file_list",
            TaskKind::CodeExec => "code_exec",
            TaskKind::Analysis => "analysis",
            TaskKind::General => "general",
        };
        f.write_str(s)
    }
}

/// An immutable natural-language task plus its ordered test cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub description: String,
    pub test_cases: Vec<TestCase>,
}

impl Task {
    #[must_use]
    pub fn new(description: impl Into<String>, test_cases: Vec<TestCase>) -> Self {
        Self { description: description.into(), test_cases }
    }
}

/// An extracted tool invocation from a worker's raw output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub params: BTreeMap<String, Value>,
}

/// The Python-equivalent source extracted from a [`WorkerResponse`].
///
/// Lifecycle: extracted on creation, possibly replaced by a refined form
/// during the worker's or refiner's retry loop, discarded at task end.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateCode {
    pub source: String,
}

impl CandidateCode {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into() }
    }
}

/// Produced exactly once per worker invocation; immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub worker_index: usize,
    pub temperature: f32,
    pub raw_text: String,
    pub tool_call: Option<ToolCall>,
    pub verified: bool,
    pub execution_result: String,
    pub attempts: u32,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl WorkerResponse {
    /// The candidate code block extracted from `raw_text`, if any ```python
    /// fence was present.
    #[must_use]
    pub fn extract_candidate(&self) -> Option<CandidateCode> {
        crate::executor::extract_python_block(&self.raw_text).map(CandidateCode::new)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
