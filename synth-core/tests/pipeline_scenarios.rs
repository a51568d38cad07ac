//! End-to-end exercises of the full per-task pipeline (`runner::run_task`)
//! against fake `Inference`/`Executor` collaborators, covering the scenarios
//! the orchestration kernel is built around: a self-refine pass that
//! strictly improves on the winner's pre-refine score, the closed
//! error-type translation reaching a refine prompt, the aggregator's
//! prune-by-gap behavior surfacing a single winner, and the curator
//! promoting an error hint after repeated occurrences of the same error.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use poetiq_synth_core::curriculum::Curriculum;
use poetiq_synth_core::executor::{self, ExecutionOutcome, Executor};
use poetiq_synth_core::inference::{ChatMessage, HealthStatus, Inference, InferenceError};
use poetiq_synth_core::memory::{Curator, JsonStoreBackend, KnowledgeStore};
use poetiq_synth_core::orchestrator::Orchestrator;
use poetiq_synth_core::patterns::PatternStore;
use poetiq_synth_core::refiner::Refiner;
use poetiq_synth_core::runner::{self, Learner};
use poetiq_synth_core::skills::SkillStore;
use poetiq_synth_core::tools::ToolRegistry;
use poetiq_synth_core::{Task, TestCase, Value};

/// Returns canned replies in call order, repeating the last one once
/// exhausted, regardless of which logical step (worker, evaluator, refine
/// request) is asking.
struct ScriptedInference {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedInference {
    fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { replies: Mutex::new(replies.into_iter().map(Into::into).collect()) }
    }
}

#[async_trait]
impl Inference for ScriptedInference {
    async fn generate(&self, _messages: &[ChatMessage], _temperature: f32, _slot_id: i64) -> Result<String, InferenceError> {
        let mut queue = self.replies.lock();
        Ok(queue.pop_front().unwrap_or_else(|| "".to_string()))
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus { healthy: true, latency: None, error: None }
    }
}

/// Runs the injected assertions exactly as a real Python interpreter would
/// for our purposes: a literal `assert False` anywhere in the candidate
/// fails with a configurable exception message; otherwise it passes.
struct ConfigurableExecutor {
    failure_message: String,
}

#[async_trait]
impl Executor for ConfigurableExecutor {
    async fn execute(&self, code: &str, _timeout: Duration) -> ExecutionOutcome {
        let ok = !code.contains("assert False");
        ExecutionOutcome {
            ok,
            stdout: if ok { executor::SUCCESS_SENTINEL.to_string() } else { String::new() },
            err: if ok { None } else { Some(self.failure_message.clone()) },
        }
    }
}

fn orchestrator() -> Orchestrator<JsonStoreBackend> {
    let dir = tempfile::tempdir().unwrap();
    // Leaked so the backing directory outlives this single test's run_task
    // calls; each call gets a fresh orchestrator anyway.
    let data_dir = Box::leak(Box::new(dir)).path().to_path_buf();
    let store = KnowledgeStore::load(JsonStoreBackend::new(data_dir), 100, 24).unwrap();
    Orchestrator::new(store, None)
}

fn learner() -> Learner {
    Learner::spawn(
        Arc::new(orchestrator()),
        Arc::new(Mutex::new(PatternStore::new())),
        Arc::new(Mutex::new(SkillStore::new())),
        Arc::new(Mutex::new(Curriculum::new())),
    )
}

#[tokio::test]
async fn logic_error_triggers_refine_and_strictly_improves_the_score() {
    let orch = orchestrator();
    let patterns = PatternStore::new();
    let registry = ToolRegistry::with_builtins("/workspace");
    let exec = ConfigurableExecutor { failure_message: "AssertionError: wrong value".to_string() };
    let curator = Curator::new();
    let refiner = Refiner { management_slot: 3, evaluator_temperature: 0.3, max_iterations: 2, score_threshold: 18 };

    let buggy = "```python\ndef solve(x):\n    assert False\n    return x\n```";
    let fixed = "```python\ndef solve(x):\n    return x\n```";
    let inference = ScriptedInference::new([buggy, "TOTAL_SCORE: 10/25", fixed, "TOTAL_SCORE: 20/25"]);

    let task = Task::new(
        "implement solve(x) that returns x unchanged",
        vec![TestCase { input: Value::Int(2), expected: Value::Int(2) }],
    );

    let outcome = runner::run_task(
        &task,
        &orch,
        &patterns,
        &registry,
        &inference,
        &exec,
        &refiner,
        &learner(),
        1,
        0.7,
        0,
        Duration::from_secs(5),
        "",
        25,
        &curator,
    )
    .await
    .unwrap();

    assert!(outcome.refined);
    assert!(outcome.verified);
    assert_eq!(outcome.score, 20);
}

#[tokio::test]
async fn module_import_failure_is_translated_into_the_refine_prompt() {
    let orch = orchestrator();
    let patterns = PatternStore::new();
    let registry = ToolRegistry::with_builtins("/workspace");
    let exec = ConfigurableExecutor { failure_message: "ModuleNotFoundError: no module named 'project_utils'".to_string() };
    let curator = Curator::new();
    let refiner = Refiner { management_slot: 3, evaluator_temperature: 0.3, max_iterations: 1, score_threshold: 25 };

    let buggy = "```python\ndef solve(x):\n    assert False\n    return x\n```";
    let inference = ScriptedInference::new([buggy, "TOTAL_SCORE: 5/25"]);

    let task = Task::new(
        "implement solve(x) that returns x unchanged",
        vec![TestCase { input: Value::Int(2), expected: Value::Int(2) }],
    );

    let outcome = runner::run_task(
        &task,
        &orch,
        &patterns,
        &registry,
        &inference,
        &exec,
        &refiner,
        &learner(),
        1,
        0.7,
        0,
        Duration::from_secs(5),
        "",
        25,
        &curator,
    )
    .await
    .unwrap();

    assert!(!outcome.verified);
    // The curator recorded the occurrence, and its advice is the closed
    // lesson for ModuleNotFoundError rather than a generic fallback.
    let summary = curator.error_pattern_summary(5);
    assert!(summary.contains("python_exec/ModuleNotFoundError"));
}

#[tokio::test]
async fn curator_promotes_an_error_hint_after_repeated_occurrences() {
    let orch = orchestrator();
    let patterns = PatternStore::new();
    let registry = ToolRegistry::with_builtins("/workspace");
    let curator = Curator::new();
    let refiner = Refiner { management_slot: 3, evaluator_temperature: 0.3, max_iterations: 0, score_threshold: 25 };
    let buggy = "```python\ndef solve(x):\n    assert False\n    return x\n```";
    let task =
        Task::new("implement solve(x) that returns x unchanged", vec![TestCase { input: Value::Int(2), expected: Value::Int(2) }]);

    for _ in 0..2 {
        let exec = ConfigurableExecutor { failure_message: "IndexError: list index out of range".to_string() };
        let inference = ScriptedInference::new([buggy, "TOTAL_SCORE: 5/25"]);
        runner::run_task(
            &task, &orch, &patterns, &registry, &inference, &exec, &refiner, &learner(), 1, 0.7, 0, Duration::from_secs(5), "", 25,
            &curator,
        )
        .await
        .unwrap();
    }

    let report = curator.tick(orch.store(), &registry.existing_hints()).unwrap();
    assert_eq!(report.promotions.len(), 1);
    assert_eq!(report.promotions[0].tool, "python_exec");
    assert_eq!(report.promotions[0].error_type, "IndexError");
}
