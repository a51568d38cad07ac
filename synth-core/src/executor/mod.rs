//! Assertion injection and candidate execution.
//!
//! The core never sandboxes code itself; it trusts an [`Executor`]
//! collaborator. What the core *does* own is turning a bare candidate
//! function into a self-verifying program: find the first top-level
//! function, append one `assert` per test case with `repr`-formatted
//! literals, and print a success or failure sentinel.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use crate::types::TestCase;

pub const SUCCESS_SENTINEL: &str = "ALL_TESTS_PASSED";
pub const FAILURE_SENTINEL: &str = "VERIFICATION_FAILED";

/// Outcome of running a candidate (or a tool invocation) to completion.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub ok: bool,
    pub stdout: String,
    pub err: Option<String>,
}

impl ExecutionOutcome {
    /// A candidate is verified iff execution succeeded and stdout carries
    /// the success sentinel.
    #[must_use]
    pub fn verified(&self) -> bool {
        self.ok && self.stdout.contains(SUCCESS_SENTINEL)
    }
}

/// Runs source code in an external, untrusted process and reports a
/// structured pass/fail. The orchestration kernel depends only on this
/// trait, never on a concrete sandbox.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, code: &str, timeout: Duration) -> ExecutionOutcome;
}

static TOP_LEVEL_FN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^def\s+(\w+)\s*\(").unwrap());
static PYTHON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```python\s*\n(.+?)\n```").unwrap());
static ANY_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```\w*\s*\n(.+?)\n```").unwrap());

/// Extract the first ` ```python ` fenced block from raw model output.
#[must_use]
pub fn extract_python_block(text: &str) -> Option<String> {
    PYTHON_FENCE.captures(text).map(|c| c[1].trim().to_string())
}

/// Extract the longest fenced code block of any language tag, used by the
/// aggregator to salvage code when a hallucinated tool call must be
/// replaced.
#[must_use]
pub fn longest_fenced_block(text: &str) -> Option<String> {
    ANY_FENCE
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .max_by_key(str::len)
}

/// The name of the first top-level `def` in `code`, if any.
#[must_use]
pub fn first_function_name(code: &str) -> Option<String> {
    TOP_LEVEL_FN.captures(code).map(|c| c[1].to_string())
}

/// Append an assertion-injected verification block to `code`, or report a
/// structured "no function" error if no top-level `def` is found.
///
/// # Errors
/// Returns `Err` with a human-readable message when no top-level function
/// definition can be found in `code`.
pub fn inject_assertions(code: &str, test_cases: &[TestCase]) -> Result<String, String> {
    let Some(func_name) = first_function_name(code) else {
        return Err("no top-level function definition found".to_string());
    };

    let mut block = String::new();
    block.push_str(code);
    block.push_str("\n\ntry:\n");
    for tc in test_cases {
        block.push_str(&format!(
            "    assert {func}({input}) == {expected}, 'case failed for input {input}'\n",
            func = func_name,
            input = tc.input.to_python_repr(),
            expected = tc.expected.to_python_repr(),
        ));
    }
    block.push_str(&format!("    print('{SUCCESS_SENTINEL}')\n"));
    block.push_str("except Exception as e:\n");
    block.push_str(&format!("    print(f'{FAILURE_SENTINEL}: {{e}}')\n"));
    block.push_str("    raise\n");
    Ok(block)
}

/// Spawns `python3` as a subprocess, captures stdout/stderr, and enforces
/// `timeout` by killing the child on expiry. This is the one "real"
/// [`Executor`] the crate ships; orchestration tests use a fake instead.
pub struct SubprocessExecutor {
    pub interpreter: String,
}

impl Default for SubprocessExecutor {
    fn default() -> Self {
        Self { interpreter: "python3".to_string() }
    }
}

#[async_trait]
impl Executor for SubprocessExecutor {
    async fn execute(&self, code: &str, timeout: Duration) -> ExecutionOutcome {
        let run = async {
            let mut child = match tokio::process::Command::new(&self.interpreter)
                .arg("-c")
                .arg(code)
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .spawn()
            {
                Ok(c) => c,
                Err(e) => {
                    return ExecutionOutcome {
                        ok: false,
                        stdout: String::new(),
                        err: Some(format!("failed to spawn {}: {e}", self.interpreter)),
                    }
                }
            };

            match child.wait_with_output().await {
                Ok(output) => ExecutionOutcome {
                    ok: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    err: if output.stderr.is_empty() {
                        None
                    } else {
                        Some(String::from_utf8_lossy(&output.stderr).to_string())
                    },
                },
                Err(e) => ExecutionOutcome {
                    ok: false,
                    stdout: String::new(),
                    err: Some(format!("failed to wait on child: {e}")),
                },
            }
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(outcome) => outcome,
            Err(_) => ExecutionOutcome {
                ok: false,
                stdout: String::new(),
                err: Some(format!("execution exceeded {timeout:?}")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn extracts_python_fence() {
        let text = "here is code:\n```python\ndef solve(x):\n    return x\n```\ndone";
        assert_eq!(extract_python_block(text).unwrap(), "def solve(x):\n    return x");
    }

    #[test]
    fn no_fence_returns_none() {
        assert!(extract_python_block("no code here").is_none());
    }

    #[test]
    fn longest_fence_picks_biggest_block() {
        let text = "```python\nx=1\n```\n```python\ndef solve(x):\n    return x * 2\n```";
        assert_eq!(
            longest_fenced_block(text).unwrap(),
            "def solve(x):\n    return x * 2"
        );
    }

    #[test]
    fn injects_assertions_for_each_test_case() {
        let code = "def solve(x):\n    return x";
        let cases = vec![TestCase { input: Value::Int(1), expected: Value::Int(1) }];
        let injected = inject_assertions(code, &cases).unwrap();
        assert!(injected.contains("assert solve(1) == 1"));
        assert!(injected.contains(SUCCESS_SENTINEL));
        assert!(injected.contains(FAILURE_SENTINEL));
    }

    #[test]
    fn rejects_code_with_no_function() {
        assert!(inject_assertions("x = 1 + 1", &[]).is_err());
    }
}
