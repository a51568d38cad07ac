//! Wires every subsystem together from [`Settings`]: the knowledge store
//! and its background curator, the closed tool registry, the
//! curriculum/pattern/skill stores, the inference client, the subprocess
//! executor, the refiner, and the background learner.
//!
//! This is the one place the orchestration kernel commits to concrete
//! types (`JsonStoreBackend`, `HttpInferenceClient`, `SubprocessExecutor`);
//! everything upstream of it depends only on the `StoreBackend`,
//! `Inference`, and `Executor` traits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::curriculum::Curriculum;
use crate::executor::SubprocessExecutor;
use crate::inference::HttpInferenceClient;
use crate::memory::curator::TickReport;
use crate::memory::{Curator, JsonStoreBackend, KnowledgeStore, StoreBackend};
use crate::orchestrator::Orchestrator;
use crate::patterns::PatternStore;
use crate::refiner::Refiner;
use crate::runner::{self, Learner, TaskOutcome};
use crate::skills::SkillStore;
use crate::tools::ToolRegistry;
use crate::types::Task;
use crate::Settings;

const SKILL_HINTS_PER_PROMPT: usize = 5;

/// Every subsystem one run of the autonomous loop (or a single `run-task`
/// invocation) needs, already wired together.
pub struct Runtime<B: StoreBackend> {
    pub settings: Settings,
    pub orchestrator: Arc<Orchestrator<B>>,
    pub curator: Arc<Curator>,
    pub registry: Arc<ToolRegistry>,
    pub curriculum: Arc<Mutex<Curriculum>>,
    pub patterns: Arc<Mutex<PatternStore>>,
    pub skills: Arc<Mutex<SkillStore>>,
    pub inference: Arc<HttpInferenceClient>,
    pub exec: Arc<SubprocessExecutor>,
    pub refiner: Refiner,
    pub learner: Learner,
}

impl Runtime<JsonStoreBackend> {
    /// Build the default, on-disk-backed runtime from `settings`.
    ///
    /// # Errors
    /// Propagates a persistence failure from the knowledge store, or a
    /// client-build failure from the inference backend.
    pub fn bootstrap(settings: Settings) -> crate::Result<Self> {
        let backend = JsonStoreBackend::new(&settings.data_dir);
        let store = KnowledgeStore::load(backend, settings.query_cache_capacity, settings.query_cache_ttl_hours)?;
        let orchestrator = Arc::new(Orchestrator::new(store, None));
        let curator = Arc::new(Curator::new());
        let registry = Arc::new(ToolRegistry::with_builtins(PathBuf::from(&settings.workspace_root)));
        let curriculum = Arc::new(Mutex::new(Curriculum::new()));
        let patterns = Arc::new(Mutex::new(PatternStore::new()));
        let skills = Arc::new(Mutex::new(SkillStore::new()));
        let inference = Arc::new(
            HttpInferenceClient::new(settings.backend_url.clone(), settings.model_name.clone())
                .map_err(|e| crate::Error::Config(format!("failed to build inference client: {e}")))?,
        );
        let exec = Arc::new(SubprocessExecutor::default());
        let refiner = Refiner {
            management_slot: settings.management_slot,
            evaluator_temperature: settings.evaluator_temperature,
            max_iterations: settings.max_iterations,
            score_threshold: settings.score_threshold,
        };
        let learner = Learner::spawn(orchestrator.clone(), patterns.clone(), skills.clone(), curriculum.clone());

        Ok(Self { settings, orchestrator, curator, registry, curriculum, patterns, skills, inference, exec, refiner, learner })
    }
}

impl<B: StoreBackend> Runtime<B> {
    /// Run one task through the full pipeline using this runtime's wired
    /// subsystems. Takes a short-lived lock on `patterns`/`skills` to build
    /// an owned snapshot rather than holding either mutex across the
    /// `.await` points inside the pipeline.
    ///
    /// # Errors
    /// Propagates a persistence failure from the knowledge store.
    pub async fn run_task(&self, task: &Task) -> crate::Result<TaskOutcome> {
        let patterns_snapshot = self.patterns.lock().clone();
        let skill_catalog = self.skills.lock().skills_for_prompt(&task.description, SKILL_HINTS_PER_PROMPT).join("\n");

        runner::run_task(
            task,
            &self.orchestrator,
            &patterns_snapshot,
            &self.registry,
            self.inference.as_ref(),
            self.exec.as_ref(),
            &self.refiner,
            &self.learner,
            self.settings.worker_count,
            self.settings.worker_temperature,
            self.settings.worker_retries,
            Duration::from_secs(self.settings.execution_timeout_secs),
            &skill_catalog,
            self.settings.skip_refine_threshold,
            &self.curator,
        )
        .await
    }

    /// Run one decay pass plus one curator tick, applying any resulting
    /// error-hint promotions to this runtime's tool registry.
    ///
    /// # Errors
    /// Propagates a persistence failure from the knowledge store.
    pub fn run_maintenance_and_curate(&self) -> crate::Result<TickReport> {
        runner::run_maintenance_and_curate(&self.orchestrator, &self.curator, &self.registry)
    }

    /// Persist the harvested skill library under `skills_dir`.
    ///
    /// # Errors
    /// Propagates an I/O failure writing the skill files or the index.
    pub fn persist_skills(&self, skills_dir: &std::path::Path) -> crate::Result<()> {
        self.skills.lock().persist(skills_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_wires_every_subsystem_with_matching_refiner_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.data_dir = dir.path().join("data").to_string_lossy().to_string();
        settings.workspace_root = dir.path().join("sandbox").to_string_lossy().to_string();

        let runtime = Runtime::bootstrap(settings.clone()).unwrap();

        assert_eq!(runtime.refiner.management_slot, settings.management_slot);
        assert_eq!(runtime.refiner.score_threshold, settings.score_threshold);
        assert!(runtime.registry.is_registered("python_exec"));
        assert_eq!(runtime.orchestrator.store().len(), 0);
    }
}
