//! Test builders and fake [`Inference`]/[`Executor`] implementations shared
//! by this workspace's unit and integration test suites.
//!
//! Kept deliberately small: a scripted-reply inference fake, a sentinel-aware
//! execution fake, and a couple of [`Task`]/[`TestCase`] builders. Anything
//! more elaborate (e.g. a fake that tracks call history per slot) belongs in
//! the test module that actually needs it.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use poetiq_synth_core::executor::{self, ExecutionOutcome, Executor};
use poetiq_synth_core::inference::{ChatMessage, HealthStatus, Inference, InferenceError};
use poetiq_synth_core::{Task, TestCase, Value};

/// Build a [`Task`] from a description and a list of `(input, expected)`
/// pairs.
#[must_use]
pub fn task(description: &str, cases: Vec<(Value, Value)>) -> Task {
    Task::new(description, cases.into_iter().map(|(input, expected)| TestCase { input, expected }).collect())
}

/// A trivial task with no test cases, useful when a scenario only cares
/// about the worker/refiner control flow and not verification.
#[must_use]
pub fn bare_task(description: &str) -> Task {
    Task::new(description, vec![])
}

/// An [`Inference`] fake that returns canned replies in order, one per
/// `generate` call, repeating the last reply once the queue is exhausted.
/// Useful for scripting a refine loop's successive attempts.
pub struct ScriptedInference {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedInference {
    #[must_use]
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let replies: VecDeque<String> = replies.into_iter().map(Into::into).collect();
        let last = replies.back().cloned().unwrap_or_default();
        Self { replies: Mutex::new(replies), last: Mutex::new(last) }
    }

    /// A fake that always returns the same reply.
    #[must_use]
    pub fn fixed(reply: impl Into<String>) -> Self {
        Self::new([reply.into()])
    }
}

#[async_trait]
impl Inference for ScriptedInference {
    async fn generate(&self, _messages: &[ChatMessage], _temperature: f32, _slot_id: i64) -> Result<String, InferenceError> {
        let mut queue = self.replies.lock();
        if let Some(reply) = queue.pop_front() {
            *self.last.lock() = reply.clone();
            Ok(reply)
        } else {
            Ok(self.last.lock().clone())
        }
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus { healthy: true, latency: Some(Duration::from_millis(1)), error: None }
    }
}

/// An [`Inference`] fake whose `generate` always fails, for exercising
/// recoverable-error paths.
pub struct FailingInference;

#[async_trait]
impl Inference for FailingInference {
    async fn generate(&self, _messages: &[ChatMessage], _temperature: f32, _slot_id: i64) -> Result<String, InferenceError> {
        Err(InferenceError::Connection)
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus { healthy: false, latency: None, error: Some("connection refused".to_string()) }
    }
}

/// An [`Executor`] fake that runs no subprocess: code containing the literal
/// `assert False` fails, everything else "passes" and reports the success
/// sentinel, mirroring how [`executor::inject_assertions`] renders a failed
/// assertion.
pub struct SentinelExecutor;

#[async_trait]
impl Executor for SentinelExecutor {
    async fn execute(&self, code: &str, _timeout: Duration) -> ExecutionOutcome {
        let ok = !code.contains("assert False");
        ExecutionOutcome {
            ok,
            stdout: if ok { executor::SUCCESS_SENTINEL.to_string() } else { "boom".to_string() },
            err: if ok { None } else { Some("AssertionError: boom".to_string()) },
        }
    }
}

/// An [`Executor`] fake that always times out or errors, regardless of code,
/// for exercising the pipeline's degraded-backend paths.
pub struct BrokenExecutor;

#[async_trait]
impl Executor for BrokenExecutor {
    async fn execute(&self, _code: &str, _timeout: Duration) -> ExecutionOutcome {
        ExecutionOutcome { ok: false, stdout: String::new(), err: Some("sandbox unavailable".to_string()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_inference_returns_replies_in_order_then_repeats_last() {
        let inference = ScriptedInference::new(["first", "second"]);
        assert_eq!(inference.generate(&[], 0.0, 0).await.unwrap(), "first");
        assert_eq!(inference.generate(&[], 0.0, 0).await.unwrap(), "second");
        assert_eq!(inference.generate(&[], 0.0, 0).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn sentinel_executor_fails_only_on_assert_false() {
        let exec = SentinelExecutor;
        assert!(exec.execute("assert True", Duration::from_secs(1)).await.verified());
        assert!(!exec.execute("assert False", Duration::from_secs(1)).await.ok);
    }

    #[test]
    fn task_builder_pairs_inputs_with_expectations() {
        let t = task("double", vec![(Value::Int(2), Value::Int(4))]);
        assert_eq!(t.test_cases.len(), 1);
        assert_eq!(t.test_cases[0].expected, Value::Int(4));
    }
}
