//! Execution state models

use crate::core::context::StepContent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall workflow execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Run is in progress
    Running,
    /// Every reached stage completed
    Completed,
    /// A stage (or a predicate under the `fail` policy) aborted the run
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
        }
    }

    /// Parse the stored representation, defaulting to `Pending`
    pub fn parse(value: &str) -> Self {
        match value {
            "Running" => ExecutionStatus::Running,
            "Completed" => ExecutionStatus::Completed,
            "Failed" => ExecutionStatus::Failed,
            _ => ExecutionStatus::Pending,
        }
    }
}

/// How a single stage invocation ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    Completed { content: StepContent },
    Failed { error: String },
}

/// One entry of the run log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name
    pub stage: String,

    /// Enclosing parallel or conditional group, if any
    pub group: Option<String>,

    pub outcome: StageOutcome,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,
}

impl StageRecord {
    pub fn content(&self) -> Option<&StepContent> {
        match &self.outcome {
            StageOutcome::Completed { content } => Some(content),
            StageOutcome::Failed { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, StageOutcome::Completed { .. })
    }
}

/// Result of evaluating a conditional group's predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRecord {
    pub condition: String,

    /// The decision taken (false when evaluation failed)
    pub result: bool,

    /// Evaluation error, if the predicate failed
    pub error: Option<String>,

    pub evaluated_at: DateTime<Utc>,
}

/// State and ordered log of one workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub workflow_name: String,

    /// Message the run was started with
    pub message: String,

    pub status: ExecutionStatus,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Number of stages declared in the workflow
    pub total_stages: usize,

    /// Per-stage outputs in the order they were recorded
    pub records: Vec<StageRecord>,

    /// Predicate evaluations in the order they happened
    pub conditions: Vec<ConditionRecord>,

    /// Stages skipped because their condition did not hold
    pub skipped_stages: Vec<String>,
}

impl WorkflowRun {
    pub fn new(workflow_name: impl Into<String>, message: impl Into<String>, total_stages: usize) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            workflow_name: workflow_name.into(),
            message: message.into(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_stages,
            records: Vec::new(),
            conditions: Vec::new(),
            skipped_stages: Vec::new(),
        }
    }

    /// Mark run as started
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark run as completed
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark run as failed
    pub fn fail(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    pub fn completed_stages(&self) -> usize {
        self.records.iter().filter(|r| r.is_completed()).count()
    }

    pub fn failed_stages(&self) -> usize {
        self.records.len() - self.completed_stages()
    }

    /// Stage names in the order they were recorded
    pub fn execution_order(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.stage.as_str()).collect()
    }

    /// Output of a completed stage
    pub fn output_of(&self, stage: &str) -> Option<&StepContent> {
        self.records
            .iter()
            .rev()
            .find(|r| r.stage == stage)
            .and_then(|r| r.content())
    }

    /// Output of the last completed stage
    pub fn final_content(&self) -> Option<&StepContent> {
        self.records.iter().rev().find_map(|r| r.content())
    }

    /// Share of declared stages that have finished or been skipped (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_stages == 0 {
            return 0.0;
        }
        let done = self.records.len() + self.skipped_stages.len();
        (done as f64 / self.total_stages as f64).min(1.0)
    }

    /// Concatenate completed stage outputs into a report
    pub fn report(&self) -> String {
        self.records
            .iter()
            .filter_map(|r| r.content().map(|c| format!("## {}\n{}", r.stage, c.text.trim_end())))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
