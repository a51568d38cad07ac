//! The infinite autonomous outer loop: generate a task, run it through the
//! full pipeline, and repeat forever — gated by backend health, a circuit
//! breaker on sustained failure, and a stop-signal file an operator can
//! drop to end the loop cleanly between iterations.
//!
//! Everything here is policy glued on top of [`crate::runtime::Runtime`];
//! the pipeline itself lives in [`crate::runner`].

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::inference::{ChatMessage, Inference, ManagedInference};
use crate::memory::StoreBackend;
use crate::monitoring::{self, Checkpoint, MonitoringStatus};
use crate::runtime::Runtime;
use crate::task_gen;
use crate::types::Task;

/// Running counters the loop accumulates across iterations, mirrored into
/// the checkpointed [`MonitoringStatus`].
#[derive(Debug, Clone, Default)]
pub struct LoopCounters {
    pub tasks_completed: u64,
    pub tasks_verified: u64,
    pub tasks_refined: u64,
    pub consecutive_health_failures: u32,
    pub circuit_breaker_trips: u64,
    pub backend_healthy: bool,
    pub last_task: String,
}

const HEALTH_FAILURE_SLEEP: Duration = Duration::from_secs(10);
const CIRCUIT_BREAKER_SLEEP_LOCAL: Duration = Duration::from_secs(60);

/// Build the next task from the current curriculum state: a difficulty
/// level and, when the pool has a standing weakness, a category nudge.
async fn generate_task<B: StoreBackend>(runtime: &Runtime<B>) -> crate::Result<Task> {
    let (difficulty, weakness) = {
        let curriculum = runtime.curriculum.lock();
        let weakness = curriculum.weaknesses().first().copied();
        (curriculum.current_difficulty, weakness)
    };

    let mut prompt = format!(
        "Generate one self-contained Python coding task for a function named `solve`. \
         Target difficulty {difficulty}/5 (1 is trivial, 5 is intricate). \
         Reply with a `Category: <tag>` line, a short description, then a `Test cases:` \
         section with 2-5 lines of the form `- solve(<input>) -> <expected>` using Python \
         literal syntax for both sides."
    );
    if let Some(category) = weakness {
        prompt.push_str(&format!("\nThe pool has been struggling with `{category}` tasks recently; prefer that category."));
    }
    let error_pattern_summary = runtime.curator.error_pattern_summary(3);
    if !error_pattern_summary.is_empty() {
        prompt.push_str("\nFrequent tool errors across recent tasks:\n");
        prompt.push_str(&error_pattern_summary);
    }

    let managed = ManagedInference { client: &runtime.inference, worker_count: runtime.settings.worker_count };
    let messages = [ChatMessage::user(prompt)];
    let text = managed
        .generate_management(&messages, runtime.settings.worker_temperature, runtime.settings.task_gen_slot)
        .await
        .map_err(crate::Error::Inference)?;

    Ok(task_gen::parse_generated_task(&text, runtime.settings.max_test_cases))
}

fn status_path(runtime: &Runtime<impl StoreBackend>) -> PathBuf {
    PathBuf::from(&runtime.settings.data_dir).join("status.json")
}

fn checkpoint_path(runtime: &Runtime<impl StoreBackend>) -> PathBuf {
    PathBuf::from(&runtime.settings.data_dir).join("autonomous_checkpoint.json")
}

fn skills_dir(runtime: &Runtime<impl StoreBackend>) -> PathBuf {
    PathBuf::from(&runtime.settings.data_dir).join("skills")
}

/// Resume the task counter from a prior run's checkpoint, if one exists.
/// Per spec §3/§6, the checkpoint is consulted only here, at startup — it
/// plays no part in mid-task recovery.
fn resume_task_count(runtime: &Runtime<impl StoreBackend>) -> u64 {
    monitoring::read_checkpoint(&checkpoint_path(runtime)).map_or(0, |c| c.task_count)
}

fn checkpoint<B: StoreBackend>(runtime: &Runtime<B>, counters: &LoopCounters) -> crate::Result<()> {
    let (current_difficulty, weaknesses) = {
        let curriculum = runtime.curriculum.lock();
        (curriculum.current_difficulty, curriculum.weaknesses().iter().map(ToString::to_string).collect())
    };
    let lesson_count = runtime.orchestrator.store().len();
    let skill_count = runtime.skills.lock().len();
    let pattern_count = runtime.patterns.lock().len();

    let status = MonitoringStatus::new(
        counters.tasks_completed,
        counters.tasks_verified,
        counters.tasks_refined,
        current_difficulty,
        weaknesses,
        counters.consecutive_health_failures,
        counters.circuit_breaker_trips,
        runtime.curator.stats(),
        lesson_count,
        skill_count,
        pattern_count,
        counters.backend_healthy,
    );
    monitoring::write_status(&status_path(runtime), &status)?;

    let checkpoint = Checkpoint::new(counters.tasks_completed, counters.last_task.clone());
    monitoring::write_checkpoint(&checkpoint_path(runtime), &checkpoint)?;

    runtime.persist_skills(&skills_dir(runtime))?;
    Ok(())
}

/// Whether the stop-signal file named by `settings.stop_signal_file` exists
/// in the current directory. An operator drops this file to end the loop
/// cleanly between iterations rather than killing the process mid-task.
fn stop_signal_present(runtime: &Runtime<impl StoreBackend>) -> bool {
    std::path::Path::new(&runtime.settings.stop_signal_file).exists()
}

/// Block on backend health at the top of every iteration (spec §4.11 step
/// 2), polling until healthy. Unlike the periodic counted check in step 3,
/// failures observed here never touch `consecutive_health_failures` — an
/// unavailable backend blocks the loop instead of feeding the circuit
/// breaker, so the system never "learns" from unavailable-backend errors.
/// Still honors the stop signal so an operator can end the loop while it
/// is blocked here.
async fn block_on_inference_health(runtime: &Runtime<impl StoreBackend>, counters: &mut LoopCounters) -> bool {
    loop {
        let health = runtime.inference.health_check().await;
        counters.backend_healthy = health.healthy;
        if health.healthy {
            return true;
        }
        warn!(error = ?health.error, "backend unavailable, blocking autonomous loop");
        if stop_signal_present(runtime) {
            return false;
        }
        tokio::time::sleep(HEALTH_FAILURE_SLEEP).await;
    }
}

/// Run the autonomous loop until the stop-signal file appears. Never
/// returns `Err` for a recoverable per-task failure; those are logged and
/// the loop continues. Only a non-recoverable [`crate::Error`] (store
/// corruption, config, security) aborts the loop.
pub async fn run(runtime: &Runtime<impl StoreBackend>) -> crate::Result<()> {
    let mut counters = LoopCounters { tasks_completed: resume_task_count(runtime), ..LoopCounters::default() };
    if counters.tasks_completed > 0 {
        info!(resumed_from = counters.tasks_completed, "resumed task counter from checkpoint");
    }

    loop {
        if stop_signal_present(runtime) {
            info!("stop signal detected, ending autonomous loop");
            return Ok(());
        }

        if !block_on_inference_health(runtime, &mut counters).await {
            info!("stop signal detected while blocked on backend health, ending autonomous loop");
            return Ok(());
        }

        if counters.tasks_completed > 0
            && counters.tasks_completed % u64::from(runtime.settings.health_check_interval_tasks) == 0
        {
            let health = runtime.inference.health_check().await;
            counters.backend_healthy = health.healthy;
            if health.healthy {
                counters.consecutive_health_failures = 0;
            } else {
                counters.consecutive_health_failures += 1;
                warn!(error = ?health.error, consecutive = counters.consecutive_health_failures, "backend health check failed");

                if counters.consecutive_health_failures >= runtime.settings.circuit_breaker_threshold {
                    counters.circuit_breaker_trips += 1;
                    if runtime.settings.containerized {
                        warn!("circuit breaker tripped in containerized mode, resetting and continuing");
                        counters.consecutive_health_failures = 0;
                    } else {
                        warn!("circuit breaker tripped, backing off before retrying");
                        tokio::time::sleep(CIRCUIT_BREAKER_SLEEP_LOCAL).await;
                    }
                } else {
                    tokio::time::sleep(HEALTH_FAILURE_SLEEP).await;
                    continue;
                }
            }
        }

        let task = match generate_task(runtime).await {
            Ok(task) => task,
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "task generation failed, retrying next iteration");
                tokio::time::sleep(Duration::from_secs(runtime.settings.loop_sleep_secs)).await;
                continue;
            }
            Err(e) => return Err(e),
        };

        let outcome = match runtime.run_task(&task).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "task pipeline failed, continuing");
                tokio::time::sleep(Duration::from_secs(runtime.settings.loop_sleep_secs)).await;
                continue;
            }
            Err(e) => return Err(e),
        };

        counters.tasks_completed += 1;
        counters.last_task = task.description.clone();
        if outcome.verified {
            counters.tasks_verified += 1;
        }
        if outcome.refined {
            counters.tasks_refined += 1;
        }
        info!(
            verified = outcome.verified,
            score = outcome.score,
            category = %outcome.category,
            iterations = outcome.iterations,
            "task completed"
        );

        if counters.tasks_completed % u64::from(runtime.settings.curator_interval_tasks) == 0 {
            if let Err(e) = runtime.run_maintenance_and_curate() {
                warn!(error = %e, "maintenance/curator tick failed");
            }
        }

        if counters.tasks_completed % u64::from(runtime.settings.checkpoint_interval_tasks) == 0 {
            if let Err(e) = checkpoint(runtime, &counters) {
                warn!(error = %e, "checkpoint write failed");
            }
        }

        tokio::time::sleep(Duration::from_secs(runtime.settings.loop_sleep_secs)).await;
    }
}
