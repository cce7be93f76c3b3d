//! Persistence layer for pipeline run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::PipelineResult;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

/// Summary of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    /// Event that started the run
    pub trigger_event: String,

    /// Source ref of the triggering event
    pub trigger_ref: String,

    /// Run status
    pub status: ExecutionStatus,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run completed
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of matrix jobs
    pub total_jobs: usize,

    pub succeeded_jobs: usize,
    pub failed_jobs: usize,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run summary, replacing any previous record with the same ID
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// List runs for a pipeline, newest first
    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>>;

    /// List all pipeline names, sorted
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or `--no-history` runs)
#[derive(Default)]
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        self.runs.write().await.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|r| r.pipeline_name == pipeline_name)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a finished run
pub fn create_summary(result: &PipelineResult) -> RunSummary {
    RunSummary {
        run_id: result.run_id,
        pipeline_name: result.pipeline_name.clone(),
        trigger_event: result.trigger.event.clone(),
        trigger_ref: result.trigger.source_ref.clone(),
        status: result.status,
        started_at: result.started_at,
        completed_at: Some(result.finished_at),
        total_jobs: result.jobs.len(),
        succeeded_jobs: result.succeeded_jobs().len(),
        failed_jobs: result.jobs.len() - result.succeeded_jobs().len(),
    }
}

/// Open the default history store, falling back to memory when it is unavailable
pub async fn open_history() -> Arc<dyn PersistenceBackend> {
    #[cfg(feature = "sqlite")]
    {
        match SqliteRunStore::with_default_path().await {
            Ok(store) => return Arc::new(store),
            Err(e) => warn!("Run history unavailable, keeping this run in memory: {:#}", e),
        }
    }
    Arc::new(InMemoryPersistence::new())
}

/// Save a finished run to history
///
/// Returns the stored summary, or `None` if the backend rejected it. A
/// history failure never changes the outcome of the run itself.
pub async fn record_run(
    store: &dyn PersistenceBackend,
    result: &PipelineResult,
) -> Option<RunSummary> {
    let summary = create_summary(result);
    match store.save_run(&summary).await {
        Ok(()) => Some(summary),
        Err(e) => {
            warn!("Failed to save run {} to history: {:#}", summary.run_id, e);
            None
        }
    }
}
