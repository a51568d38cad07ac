//! Layered runtime configuration.
//!
//! `Settings` is the single source of truth for every tunable named in the
//! orchestration design — nothing downstream should hard-code a literal that
//! has a name here. File/environment loading lives in the CLI crate
//! (`poetiq-synth-cli`); this type only owns the data and its defaults.

use serde::{Deserialize, Serialize};

/// All tunables for one run of the orchestration kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the inference backend, e.g. `http://localhost:8080`.
    /// The OpenAI-compatible path (`/v1/chat/completions`) and the native
    /// path (`/completion`) are both derived from this root.
    pub backend_url: String,

    /// Model name sent on the OpenAI-compatible endpoint. The native
    /// endpoint does not need one.
    pub model_name: String,

    /// Number of parallel workers `W`; also the number of backend slots
    /// `[0, W)` reserved for worker affinity.
    pub worker_count: usize,

    /// The dedicated management slot for evaluator / memory-linking /
    /// keyword-extraction calls. Must not fall inside `[0, worker_count)`.
    pub management_slot: i64,

    /// The dedicated slot for task generation. Must differ from
    /// `management_slot` and from every worker slot.
    pub task_gen_slot: i64,

    /// Generation temperature used by workers.
    pub worker_temperature: f32,

    /// Lower temperature used for evaluation / scoring calls.
    pub evaluator_temperature: f32,

    pub max_tokens: u32,

    /// Worker self-fix retries. Default 2.
    pub worker_retries: u32,

    /// Refiner outer-loop cap.
    pub max_iterations: u32,

    /// Score at or above which the refiner stops early (0-25 scale).
    /// Kept distinct from `skip_refine_threshold` since the two gates fire
    /// at different call sites and default to different values.
    pub score_threshold: u32,

    /// Score at or above which `run_task` treats a verified winner as
    /// good enough to skip the refiner entirely.
    pub skip_refine_threshold: u32,

    /// Wall-clock timeout for a single candidate execution.
    pub execution_timeout_secs: u64,

    /// Directory under which every persisted JSON file is written.
    pub data_dir: String,

    /// Root directory generated tool calls may touch; paths outside this
    /// root are rejected.
    pub workspace_root: String,

    /// Curator cadence: run once per this many completed tasks.
    pub curator_interval_tasks: u32,

    /// Checkpoint cadence.
    pub checkpoint_interval_tasks: u32,

    /// Health-check cadence in the autonomous loop.
    pub health_check_interval_tasks: u32,

    /// Circuit-breaker threshold `M` on consecutive health/task failures.
    pub circuit_breaker_threshold: u32,

    /// Fixed sleep between autonomous-loop iterations.
    pub loop_sleep_secs: u64,

    /// Whether the circuit breaker runs in "containerized" mode (reset and
    /// continue, relying on an external restart policy) or "local" mode
    /// (attempt a backend self-restart in-process).
    pub containerized: bool,

    /// Maximum test cases retained per generated task.
    pub max_test_cases: usize,

    /// Query-cache capacity.
    pub query_cache_capacity: usize,

    /// Query-cache entry time-to-live in hours.
    pub query_cache_ttl_hours: i64,

    /// Name of the sentinel file that stops the autonomous loop.
    pub stop_signal_file: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8080".to_string(),
            model_name: "local-model".to_string(),
            worker_count: 3,
            management_slot: 3,
            task_gen_slot: 4,
            worker_temperature: 0.7,
            evaluator_temperature: 0.3,
            max_tokens: 16_000,
            worker_retries: 2,
            max_iterations: 5,
            score_threshold: 23,
            skip_refine_threshold: 15,
            execution_timeout_secs: 30,
            data_dir: "data/output".to_string(),
            workspace_root: "sandbox".to_string(),
            curator_interval_tasks: 5,
            checkpoint_interval_tasks: 5,
            health_check_interval_tasks: 10,
            circuit_breaker_threshold: 5,
            loop_sleep_secs: 2,
            containerized: true,
            max_test_cases: 8,
            query_cache_capacity: 100,
            query_cache_ttl_hours: 24,
            stop_signal_file: "STOP_AUTONOMOUS".to_string(),
        }
    }
}

impl Settings {
    /// Apply `POETIQ_SYNTH_*` environment overrides on top of an
    /// already-loaded configuration (file or default). Unset variables
    /// leave the corresponding field untouched.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("POETIQ_SYNTH_BACKEND_URL") {
            self.backend_url = v;
        }
        if let Ok(v) = std::env::var("POETIQ_SYNTH_WORKER_COUNT") {
            if let Ok(n) = v.parse() {
                self.worker_count = n;
            }
        }
        if let Ok(v) = std::env::var("POETIQ_SYNTH_DATA_DIR") {
            self.data_dir = v;
        }
        self
    }

    /// Every slot id that belongs to a worker: `[0, worker_count)`.
    #[must_use]
    pub fn is_worker_slot(&self, slot_id: i64) -> bool {
        slot_id >= 0 && slot_id < self.worker_count as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_management_and_task_gen_slots_outside_worker_range() {
        let s = Settings::default();
        assert!(!s.is_worker_slot(s.management_slot));
        assert!(!s.is_worker_slot(s.task_gen_slot));
        assert_ne!(s.management_slot, s.task_gen_slot);
    }

    #[test]
    fn env_override_changes_worker_count() {
        // SAFETY: test runs under `serial_test` at the call site when env
        // vars are involved; here we only read back what we set.
        unsafe {
            std::env::set_var("POETIQ_SYNTH_WORKER_COUNT", "7");
        }
        let s = Settings::default().with_env_overrides();
        assert_eq!(s.worker_count, 7);
        unsafe {
            std::env::remove_var("POETIQ_SYNTH_WORKER_COUNT");
        }
    }
}
