//! Per-task pipeline: context retrieval, parallel worker fan-out,
//! aggregation, the refiner's outer loop, and the post-task learning
//! writes.
//!
//! The learning writes (remembering a lesson, harvesting skills, updating
//! test patterns and curriculum) are handed off to a single background
//! consumer over an unbounded mpsc channel so a task never blocks on them,
//! while still applying every write in submission order — two tasks
//! completing back-to-back must not interleave their curriculum/pattern
//! updates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::aggregator;
use crate::curriculum::Curriculum;
use crate::executor::{self, Executor};
use crate::inference::Inference;
use crate::memory::{SourceType, StoreBackend};
use crate::orchestrator::Orchestrator;
use crate::patterns::PatternStore;
use crate::reflection::ReflectionBuffer;
use crate::refiner::{RefineCandidate, Refiner};
use crate::skills::SkillStore;
use crate::tools::ToolRegistry;
use crate::types::{Category, Task, TestCase, WorkerResponse};
use crate::worker::Worker;

/// Final, post-refine view of one task's outcome, returned to the
/// autonomous loop for curriculum/checkpoint bookkeeping.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub raw_text: String,
    pub verified: bool,
    pub score: u32,
    pub refined: bool,
    pub iterations: u32,
    pub fallback_used: bool,
    pub category: Category,
    pub duration: Duration,
}

struct LearnJob {
    task_snippet: String,
    category: Category,
    verified: bool,
    score: u32,
    code: Option<String>,
    memory_ids: Vec<uuid::Uuid>,
    tools_involved: Vec<String>,
    first_case: Option<TestCase>,
}

/// Handle to the single background learner task. Cheaply cloned; the
/// consumer exits once every clone (and the original) is dropped.
#[derive(Clone)]
pub struct Learner {
    tx: mpsc::UnboundedSender<LearnJob>,
}

impl Learner {
    /// Spawn the background consumer and return a handle to submit jobs to
    /// it. `orchestrator`/`patterns`/`skills`/`curriculum` are shared with
    /// the rest of the runtime via `Arc`.
    pub fn spawn<B: StoreBackend + 'static>(
        orchestrator: Arc<Orchestrator<B>>,
        patterns: Arc<Mutex<PatternStore>>,
        skills: Arc<Mutex<SkillStore>>,
        curriculum: Arc<Mutex<Curriculum>>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LearnJob>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                apply_learn_job(&orchestrator, &patterns, &skills, &curriculum, job);
            }
        });
        Self { tx }
    }

    fn submit(&self, job: LearnJob) {
        // The receiver only goes away when the runtime itself is shutting
        // down; there's nothing useful to do with a send error here.
        let _ = self.tx.send(job);
    }
}

fn apply_learn_job<B: StoreBackend>(
    orchestrator: &Orchestrator<B>,
    patterns: &Mutex<PatternStore>,
    skills: &Mutex<SkillStore>,
    curriculum: &Mutex<Curriculum>,
    job: LearnJob,
) {
    let lesson_text = if job.verified {
        format!("solved \"{}\" ({}), tools used: {}", job.task_snippet, job.category, job.tools_involved.join(", "))
    } else {
        format!("failed \"{}\" ({}) at score {}", job.task_snippet, job.category, job.score)
    };
    let source_type = if job.verified { SourceType::VerifiedSuccess } else { SourceType::Failure };
    let base_importance = if job.verified { 6 } else { 4 };
    let _ = orchestrator.remember(lesson_text, job.category, source_type, job.tools_involved, None, base_importance);
    let _ = orchestrator.mark_memories_feedback(&job.memory_ids, job.verified);

    if job.verified {
        if let Some(code) = &job.code {
            skills.lock().harvest_from_code(code);
        }
        if let Some(case) = &job.first_case {
            patterns.lock().learn(job.category, &job.task_snippet, case);
        }
    }

    curriculum.lock().record_task(job.category, job.verified, job.score);
}

/// If the winning candidate carries a `python_exec` tool call whose code
/// was never run by the worker/refiner verification loop (i.e. no fenced
/// code block was present to trigger it), execute it now so the final
/// outcome's `verified` flag reflects reality.
async fn execute_pending_tool_call(
    candidate: &RefineCandidate,
    task: &Task,
    exec: &dyn Executor,
    timeout: Duration,
) -> Option<bool> {
    let call = candidate.tool_call.as_ref()?;
    if call.tool != "python_exec" {
        return None;
    }
    if executor::extract_python_block(&candidate.raw_text).is_some() {
        return None;
    }
    let crate::types::Value::Str(code) = call.params.get("code")? else { return None };
    if task.test_cases.is_empty() {
        return Some(exec.execute(code, timeout).await.ok);
    }
    let injected = executor::inject_assertions(code, &task.test_cases).ok()?;
    Some(exec.execute(&injected, timeout).await.verified())
}

/// Run the full per-task pipeline and hand the learning writes off to
/// `learner`. Every verification failure along the way is recorded with
/// `curator`, and the refine prompt is seeded with `curator`'s current
/// top error-pattern summary.
///
/// # Errors
/// Propagates a persistence failure from the knowledge store.
#[allow(clippy::too_many_arguments)]
pub async fn run_task<B: StoreBackend>(
    task: &Task,
    orchestrator: &Orchestrator<B>,
    patterns: &PatternStore,
    registry: &ToolRegistry,
    inference: &dyn Inference,
    exec: &dyn Executor,
    refiner: &Refiner,
    learner: &Learner,
    worker_count: usize,
    worker_temperature: f32,
    worker_retries: u32,
    execution_timeout: Duration,
    skill_catalog_text: &str,
    skip_refine_threshold: u32,
    curator: &crate::memory::Curator,
) -> crate::Result<TaskOutcome> {
    let start = Instant::now();
    let context = orchestrator.get_context(task, patterns)?;
    let memory_context = context.as_prompt_section();

    let responses: Vec<WorkerResponse> = join_all((0..worker_count).map(|i| {
        let worker = Worker::new(i, worker_temperature, &memory_context, &context.suggested_tools);
        async move {
            worker.run(task, inference, exec, registry, skill_catalog_text, worker_retries, execution_timeout, curator).await
        }
    }))
    .await;

    let aggregation = aggregator::select(responses, task, registry);
    let winner = aggregation.winner;

    let skip_refine =
        winner.verified && aggregator::quick_score(&winner, task) >= i32::try_from(skip_refine_threshold).unwrap_or(i32::MAX);

    let (mut final_candidate, iterations) = if skip_refine {
        let candidate = RefineCandidate {
            raw_text: winner.raw_text,
            tool_call: winner.tool_call,
            verified: winner.verified,
            score: crate::refiner::MAX_SCORE,
            feedback: String::new(),
        };
        (candidate, 0)
    } else {
        // `python_exec` is the default delivery mechanism for a code task (the
        // fenced block the worker returns, not a declared tool call), so only
        // an explicit non-default suggestion (a file or search tool) counts as
        // a hard requirement for the evaluator's required-tool check.
        let required_tool = context.suggested_tools.first().map(String::as_str).filter(|&t| t != "python_exec");
        let mut reflection = ReflectionBuffer::new();
        let error_pattern_summary = curator.error_pattern_summary(3);
        let outcome = refiner
            .refine(&winner, task, inference, exec, registry, &mut reflection, required_tool, &error_pattern_summary, curator)
            .await;
        (outcome.best, outcome.iterations)
    };

    if let Some(verified) = execute_pending_tool_call(&final_candidate, task, exec, execution_timeout).await {
        final_candidate.verified = verified;
    }

    let code = executor::extract_python_block(&final_candidate.raw_text);
    let task_snippet: String = task.description.chars().take(80).collect();

    learner.submit(LearnJob {
        task_snippet,
        category: context.category,
        verified: final_candidate.verified,
        score: final_candidate.score,
        code,
        memory_ids: context.memory_ids.clone(),
        tools_involved: final_candidate.tool_call.as_ref().map(|c| vec![c.tool.clone()]).unwrap_or_default(),
        first_case: task.test_cases.first().cloned(),
    });

    Ok(TaskOutcome {
        raw_text: final_candidate.raw_text,
        verified: final_candidate.verified,
        score: final_candidate.score,
        refined: !skip_refine,
        iterations,
        fallback_used: aggregation.fallback_used,
        category: context.category,
        duration: start.elapsed(),
    })
}

/// Run one decay pass plus one curator tick, applying any error-hint
/// promotions the curator decided on to `registry`. Called by the
/// autonomous loop on its own cadence, not once per task.
///
/// # Errors
/// Propagates a persistence failure from the knowledge store.
pub fn run_maintenance_and_curate<B: StoreBackend>(
    orchestrator: &Orchestrator<B>,
    curator: &crate::memory::Curator,
    registry: &ToolRegistry,
) -> crate::Result<crate::memory::curator::TickReport> {
    orchestrator.run_maintenance()?;
    let report = curator.tick(orchestrator.store(), &registry.existing_hints())?;
    for promotion in &report.promotions {
        registry.apply_hint(&promotion.tool, &promotion.error_type, &promotion.lesson);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{ChatMessage, InferenceError};
    use crate::memory::storage::tests::InMemoryBackend;
    use crate::memory::KnowledgeStore;
    use async_trait::async_trait;

    struct FakeInference {
        reply: String,
    }

    #[async_trait]
    impl Inference for FakeInference {
        async fn generate(&self, _messages: &[ChatMessage], _temperature: f32, _slot_id: i64) -> Result<String, InferenceError> {
            Ok(self.reply.clone())
        }
        async fn health_check(&self) -> crate::inference::HealthStatus {
            crate::inference::HealthStatus { healthy: true, latency: None, error: None }
        }
    }

    struct FakeExecutor;

    #[async_trait]
    impl Executor for FakeExecutor {
        async fn execute(&self, code: &str, _timeout: Duration) -> executor::ExecutionOutcome {
            let ok = !code.contains("assert False");
            executor::ExecutionOutcome {
                ok,
                stdout: if ok { executor::SUCCESS_SENTINEL.to_string() } else { "boom".to_string() },
                err: if ok { None } else { Some("boom".to_string()) },
            }
        }
    }

    fn orchestrator() -> Orchestrator<InMemoryBackend> {
        let store = KnowledgeStore::load(InMemoryBackend::default(), 100, 24).unwrap();
        Orchestrator::new(store, None)
    }

    #[tokio::test]
    async fn run_task_reaches_a_verified_outcome_on_first_try() {
        let orch = orchestrator();
        let patterns = PatternStore::new();
        let registry = ToolRegistry::with_builtins("/workspace");
        let inference = FakeInference { reply: "```python\ndef solve(x):\n    return x\n```".to_string() };
        let exec = FakeExecutor;
        let refiner = Refiner { management_slot: 3, evaluator_temperature: 0.3, max_iterations: 2, score_threshold: 23 };
        let curator = crate::memory::Curator::new();
        let learner = Learner::spawn(
            Arc::new(orchestrator()),
            Arc::new(Mutex::new(PatternStore::new())),
            Arc::new(Mutex::new(SkillStore::new())),
            Arc::new(Mutex::new(Curriculum::new())),
        );
        let task = Task::new("implement solve(x) that returns x unchanged", vec![]);

        let outcome = run_task(
            &task,
            &orch,
            &patterns,
            &registry,
            &inference,
            &exec,
            &refiner,
            &learner,
            1,
            0.7,
            1,
            Duration::from_secs(5),
            "",
            15,
            &curator,
        )
        .await
        .unwrap();

        assert!(outcome.verified);
    }
}
