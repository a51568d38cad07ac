//! Subcommand handlers. Each builds (or reuses) a [`Runtime`] and reports
//! its result through the shared [`Report`]/[`OutputFormat`] machinery.

use std::path::Path;

use poetiq_synth_core::autonomous;
use poetiq_synth_core::memory::JsonStoreBackend;
use poetiq_synth_core::runtime::Runtime;
use poetiq_synth_core::task_gen;
use serde::Serialize;

use crate::output::Report;

#[derive(Debug, Serialize)]
pub struct RunTaskReport {
    pub description: String,
    pub verified: bool,
    pub score: u32,
    pub refined: bool,
    pub iterations: u32,
    pub fallback_used: bool,
    pub category: String,
    pub duration_secs: f64,
    pub raw_text: String,
}

impl Report for RunTaskReport {
    fn write_human<W: std::io::Write>(&self, mut w: W) -> anyhow::Result<()> {
        writeln!(w, "task: {}", self.description)?;
        writeln!(w, "  verified:  {}", self.verified)?;
        writeln!(w, "  score:     {}/25", self.score)?;
        writeln!(w, "  category:  {}", self.category)?;
        writeln!(w, "  refined:   {} ({} iteration(s))", self.refined, self.iterations)?;
        writeln!(w, "  fallback:  {}", self.fallback_used)?;
        writeln!(w, "  duration:  {:.2}s", self.duration_secs)?;
        writeln!(w)?;
        writeln!(w, "{}", self.raw_text)?;
        Ok(())
    }
}

impl Report for poetiq_synth_core::monitoring::MonitoringStatus {
    fn write_human<W: std::io::Write>(&self, mut w: W) -> anyhow::Result<()> {
        writeln!(w, "tasks completed: {}", self.tasks_completed)?;
        writeln!(w, "tasks verified:  {}", self.tasks_verified)?;
        writeln!(w, "tasks refined:   {}", self.tasks_refined)?;
        writeln!(w, "difficulty:      {}", self.current_difficulty)?;
        writeln!(w, "weaknesses:      {}", self.weaknesses.join(", "))?;
        writeln!(w, "circuit trips:   {}", self.circuit_breaker_trips)?;
        writeln!(w, "backend healthy: {}", self.backend_healthy)?;
        writeln!(w, "lessons:         {}", self.lesson_count)?;
        writeln!(w, "skills:          {}", self.skill_count)?;
        writeln!(w, "patterns:        {}", self.pattern_count)?;
        writeln!(w, "updated at:      {}", self.updated_at)?;
        Ok(())
    }
}

impl Report for poetiq_synth_core::memory::curator::TickReport {
    fn write_human<W: std::io::Write>(&self, mut w: W) -> anyhow::Result<()> {
        writeln!(w, "hint promotions:    {}", self.promotions.len())?;
        for promotion in &self.promotions {
            writeln!(w, "  - {} / {}: {}", promotion.tool, promotion.error_type, promotion.lesson)?;
        }
        writeln!(w, "duplicate candidates: {}", self.duplicate_candidates_found)?;
        writeln!(w, "low-value entries:    {}", self.low_value_entries)?;
        writeln!(w, "edges decayed:        {}", self.edges_decayed)?;
        writeln!(w, "lifetime runs:        {}", self.stats.runs)?;
        Ok(())
    }
}

/// Build one task from `spec_text` (the same `Category:`/`Test cases:`
/// shape the task generator produces) and run it through the full
/// pipeline once.
///
/// # Errors
/// Propagates a runtime bootstrap or pipeline failure.
pub async fn run_task(runtime: &Runtime<JsonStoreBackend>, spec_text: &str) -> anyhow::Result<RunTaskReport> {
    let task = task_gen::parse_generated_task(spec_text, runtime.settings.max_test_cases);
    let outcome = runtime.run_task(&task).await?;
    Ok(RunTaskReport {
        description: task.description,
        verified: outcome.verified,
        score: outcome.score,
        refined: outcome.refined,
        iterations: outcome.iterations,
        fallback_used: outcome.fallback_used,
        category: outcome.category.to_string(),
        duration_secs: outcome.duration.as_secs_f64(),
        raw_text: outcome.raw_text,
    })
}

/// Run the infinite autonomous loop until the stop-signal file appears.
///
/// # Errors
/// Propagates a non-recoverable pipeline failure.
pub async fn run_loop(runtime: &Runtime<JsonStoreBackend>) -> anyhow::Result<()> {
    autonomous::run(runtime).await.map_err(Into::into)
}

/// Read the last checkpointed [`MonitoringStatus`] from `data_dir/status.json`.
///
/// # Errors
/// Propagates an I/O or parse failure, or reports that no checkpoint exists yet.
pub fn read_status(data_dir: &Path) -> anyhow::Result<poetiq_synth_core::monitoring::MonitoringStatus> {
    let path = data_dir.join("status.json");
    let body = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("no checkpoint at {}: {e}", path.display()))?;
    serde_json::from_str(&body).map_err(Into::into)
}

/// Run one maintenance-and-curate pass outside the autonomous loop's own
/// cadence, for manual invocation or a cron-style external scheduler.
///
/// # Errors
/// Propagates a persistence failure from the knowledge store.
pub fn curate(runtime: &Runtime<JsonStoreBackend>) -> anyhow::Result<poetiq_synth_core::memory::curator::TickReport> {
    runtime.run_maintenance_and_curate().map_err(Into::into)
}
