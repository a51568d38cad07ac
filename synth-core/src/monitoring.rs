//! Live status snapshot written after every task so an external dashboard
//! or health probe can observe the loop without touching the knowledge
//! store directly.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::CuratorStats;

/// A point-in-time view of the autonomous loop's counters and health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringStatus {
    pub tasks_completed: u64,
    pub tasks_verified: u64,
    pub tasks_refined: u64,
    pub current_difficulty: u8,
    pub weaknesses: Vec<String>,
    pub consecutive_health_failures: u32,
    pub circuit_breaker_trips: u64,
    pub curator_stats: CuratorStats,
    pub lesson_count: usize,
    pub skill_count: usize,
    pub pattern_count: usize,
    pub backend_healthy: bool,
    pub updated_at: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
impl MonitoringStatus {
    #[must_use]
    pub fn new(
        tasks_completed: u64,
        tasks_verified: u64,
        tasks_refined: u64,
        current_difficulty: u8,
        weaknesses: Vec<String>,
        consecutive_health_failures: u32,
        circuit_breaker_trips: u64,
        curator_stats: CuratorStats,
        lesson_count: usize,
        skill_count: usize,
        pattern_count: usize,
        backend_healthy: bool,
    ) -> Self {
        Self {
            tasks_completed,
            tasks_verified,
            tasks_refined,
            current_difficulty,
            weaknesses,
            consecutive_health_failures,
            circuit_breaker_trips,
            curator_stats,
            lesson_count,
            skill_count,
            pattern_count,
            backend_healthy,
            updated_at: Utc::now(),
        }
    }
}

/// Write `status` to `path` atomically (temp-file-then-rename), matching
/// the knowledge store's own persistence discipline.
///
/// # Errors
/// Propagates an I/O or serialization failure.
pub fn write_status(path: &Path, status: &MonitoringStatus) -> crate::Result<()> {
    write_json_atomic(path, status)
}

/// `{task_count, last_task, timestamp, process_id}` (spec §3/§6:
/// `autonomous_checkpoint.json`), persisted on a fixed cadence and read
/// back only once, at startup, to resume the autonomous loop's task
/// counter. Never consulted for mid-task recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub task_count: u64,
    pub last_task: String,
    pub timestamp: DateTime<Utc>,
    pub process_id: u32,
}

impl Checkpoint {
    #[must_use]
    pub fn new(task_count: u64, last_task: impl Into<String>) -> Self {
        Self { task_count, last_task: last_task.into(), timestamp: Utc::now(), process_id: std::process::id() }
    }
}

/// Write `checkpoint` to `path` atomically, matching [`write_status`].
///
/// # Errors
/// Propagates an I/O or serialization failure.
pub fn write_checkpoint(path: &Path, checkpoint: &Checkpoint) -> crate::Result<()> {
    write_json_atomic(path, checkpoint)
}

/// Read a checkpoint back from `path`, if it exists and parses. Used only
/// at startup to resume the task counter; returns `None` on a missing or
/// corrupt file rather than erroring, matching the store's
/// start-empty-on-corruption policy.
#[must_use]
pub fn read_checkpoint(path: &Path) -> Option<Checkpoint> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

fn write_json_atomic(path: &Path, value: &impl Serialize) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, body)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_status_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let status = MonitoringStatus::new(10, 7, 3, 2, vec!["math".to_string()], 0, 0, CuratorStats::default(), 5, 2, 4, true);
        write_status(&path, &status).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let reloaded: MonitoringStatus = serde_json::from_str(&raw).unwrap();
        assert_eq!(reloaded.tasks_completed, 10);
        assert!(reloaded.backend_healthy);
    }

    #[test]
    fn checkpoint_round_trips_and_carries_the_process_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autonomous_checkpoint.json");
        let checkpoint = Checkpoint::new(42, "reverse a string");
        write_checkpoint(&path, &checkpoint).unwrap();

        let reloaded = read_checkpoint(&path).unwrap();
        assert_eq!(reloaded.task_count, 42);
        assert_eq!(reloaded.last_task, "reverse a string");
        assert_eq!(reloaded.process_id, std::process::id());
    }

    #[test]
    fn reading_a_missing_checkpoint_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_checkpoint(&dir.path().join("absent.json")).is_none());
    }
}
