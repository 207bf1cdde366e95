//! Persistence layer for workflow run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::{RepositoryEvent, Workflow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    pub workflow_name: String,

    /// Event name (`push`, `pull_request`)
    pub event: String,

    /// Full ref the event targeted
    pub git_ref: String,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Progress (0.0 to 1.0)
    pub progress: f64,

    /// Number of jobs that completed successfully
    pub completed_jobs: usize,

    pub total_jobs: usize,

    /// SHA-256 of the job and step layout the run executed
    pub workflow_digest: String,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run, replacing any earlier record with the same id
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// List runs of a workflow, most recent first
    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunSummary>>;

    /// Most recent run of a workflow
    async fn latest_run(&self, workflow_name: &str) -> Result<Option<RunSummary>> {
        Ok(self.list_runs(workflow_name).await?.into_iter().next())
    }

    async fn delete_run(&self, run_id: Uuid) -> Result<()>;

    /// List all workflow names, sorted
    async fn list_workflows(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or `--no-history`)
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

    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunSummary>> {
        let mut runs: Vec<RunSummary> = self
            .runs
            .read()
            .await
            .values()
            .filter(|r| r.workflow_name == workflow_name)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    async fn delete_run(&self, run_id: Uuid) -> Result<()> {
        self.runs.write().await.remove(&run_id);
        Ok(())
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .runs
            .read()
            .await
            .values()
            .map(|r| r.workflow_name.clone())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a workflow after a run
pub fn create_summary(workflow: &Workflow, event: &RepositoryEvent) -> RunSummary {
    RunSummary {
        run_id: workflow.state.run_id,
        workflow_name: workflow.name.clone(),
        event: event.kind.to_string(),
        git_ref: event.git_ref.to_string(),
        status: workflow.state.status,
        started_at: workflow.state.started_at.unwrap_or_else(Utc::now),
        completed_at: workflow.state.completed_at,
        progress: workflow.state.progress(),
        completed_jobs: workflow.state.completed_jobs,
        total_jobs: workflow.state.total_jobs,
        workflow_digest: workflow.digest(),
    }
}
