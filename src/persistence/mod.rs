//! Persistence layer for workflow run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::core::{StageOutcome, WorkflowRun};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub workflow_name: String,

    /// Message the run was started with
    pub message: String,

    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution completed (if complete)
    pub completed_at: Option<DateTime<Utc>>,

    /// Progress (0.0 to 1.0)
    pub progress: f64,

    pub completed_stages: usize,

    pub failed_stages: usize,

    pub skipped_stages: usize,

    /// Total number of declared stages
    pub total_stages: usize,
}

/// Stored state of one stage within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRowStatus {
    Completed,
    Failed,
    Skipped,
}

impl StageRowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageRowStatus::Completed => "completed",
            StageRowStatus::Failed => "failed",
            StageRowStatus::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "completed" => Some(StageRowStatus::Completed),
            "failed" => Some(StageRowStatus::Failed),
            "skipped" => Some(StageRowStatus::Skipped),
            _ => None,
        }
    }
}

/// One stored stage record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecordRow {
    pub execution_id: Uuid,

    /// Position in the run log (skipped stages come after recorded ones)
    pub position: usize,

    pub stage: String,

    pub group: Option<String>,

    pub status: StageRowStatus,

    pub output: Option<String>,

    pub structured: Option<Value>,

    pub error: Option<String>,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save (or replace) a run summary
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load a run summary by ID
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>>;

    /// Replace the stage records of a run
    async fn save_stage_records(&self, execution_id: Uuid, records: &[StageRecordRow])
        -> Result<()>;

    /// Load the stage records of a run, ordered by position
    async fn load_stage_records(&self, execution_id: Uuid) -> Result<Vec<StageRecordRow>>;

    /// List all runs of a workflow, most recent first
    async fn list_executions(&self, workflow_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// List all workflow names with stored runs
    async fn list_workflows(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<Uuid, ExecutionSummary>>,
    by_workflow: RwLock<HashMap<String, Vec<Uuid>>>,
    stage_records: RwLock<HashMap<Uuid, Vec<StageRecordRow>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let mut execs = self.executions.write().await;
        let replaced = execs
            .insert(execution.execution_id, execution.clone())
            .is_some();

        if !replaced {
            let mut by_workflow = self.by_workflow.write().await;
            by_workflow
                .entry(execution.workflow_name.clone())
                .or_default()
                .push(execution.execution_id);
        }

        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let execs = self.executions.read().await;
        Ok(execs.get(&execution_id).cloned())
    }

    async fn save_stage_records(
        &self,
        execution_id: Uuid,
        records: &[StageRecordRow],
    ) -> Result<()> {
        let mut stage_records = self.stage_records.write().await;
        stage_records.insert(execution_id, records.to_vec());
        Ok(())
    }

    async fn load_stage_records(&self, execution_id: Uuid) -> Result<Vec<StageRecordRow>> {
        let stage_records = self.stage_records.read().await;
        let mut rows = stage_records.get(&execution_id).cloned().unwrap_or_default();
        rows.sort_by_key(|r| r.position);
        Ok(rows)
    }

    async fn list_executions(&self, workflow_name: &str) -> Result<Vec<ExecutionSummary>> {
        let execs = self.executions.read().await;
        let by_workflow = self.by_workflow.read().await;

        let mut result: Vec<ExecutionSummary> = by_workflow
            .get(workflow_name)
            .map(|ids| ids.iter().filter_map(|id| execs.get(id).cloned()).collect())
            .unwrap_or_default();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let by_workflow = self.by_workflow.read().await;
        let mut names: Vec<String> = by_workflow.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Create a summary from a run
pub fn create_summary(run: &WorkflowRun) -> ExecutionSummary {
    ExecutionSummary {
        execution_id: run.execution_id,
        workflow_name: run.workflow_name.clone(),
        message: run.message.clone(),
        status: run.status,
        started_at: run.started_at.unwrap_or_else(Utc::now),
        completed_at: run.completed_at,
        progress: run.progress(),
        completed_stages: run.completed_stages(),
        failed_stages: run.failed_stages(),
        skipped_stages: run.skipped_stages.len(),
        total_stages: run.total_stages,
    }
}

/// Flatten a run log into stage rows
pub fn create_stage_rows(run: &WorkflowRun) -> Vec<StageRecordRow> {
    let mut rows: Vec<StageRecordRow> = run
        .records
        .iter()
        .enumerate()
        .map(|(position, record)| {
            let (status, output, structured, error) = match &record.outcome {
                StageOutcome::Completed { content } => (
                    StageRowStatus::Completed,
                    Some(content.text.clone()),
                    content.structured.clone(),
                    None,
                ),
                StageOutcome::Failed { error } => {
                    (StageRowStatus::Failed, None, None, Some(error.clone()))
                }
            };
            StageRecordRow {
                execution_id: run.execution_id,
                position,
                stage: record.stage.clone(),
                group: record.group.clone(),
                status,
                output,
                structured,
                error,
                started_at: Some(record.started_at),
                completed_at: Some(record.completed_at),
            }
        })
        .collect();

    let offset = rows.len();
    rows.extend(
        run.skipped_stages
            .iter()
            .enumerate()
            .map(|(i, stage)| StageRecordRow {
                execution_id: run.execution_id,
                position: offset + i,
                stage: stage.clone(),
                group: None,
                status: StageRowStatus::Skipped,
                output: None,
                structured: None,
                error: None,
                started_at: None,
                completed_at: None,
            }),
    );
    rows
}

/// Store a run's summary and stage records
pub async fn save_run(backend: &dyn PersistenceBackend, run: &WorkflowRun) -> Result<()> {
    backend.save_execution(&create_summary(run)).await?;
    backend
        .save_stage_records(run.execution_id, &create_stage_rows(run))
        .await
}
