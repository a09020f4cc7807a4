//! Run-level errors

use crate::agent::AgentError;
use crate::core::PredicateError;
use thiserror::Error;

/// Why a workflow run stopped early
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A stage executor failed; the run was aborted at that stage
    #[error("stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: AgentError,
    },

    /// A predicate failed under the `fail` policy
    #[error("condition '{condition}' could not be evaluated: {source}")]
    Predicate {
        condition: String,
        #[source]
        source: PredicateError,
    },

    /// The workflow definition is structurally invalid
    #[error("invalid workflow: {0}")]
    Invalid(String),
}

impl WorkflowError {
    /// Name of the stage or condition the run stopped at
    pub fn location(&self) -> Option<&str> {
        match self {
            WorkflowError::StageFailed { stage, .. } => Some(stage),
            WorkflowError::Predicate { condition, .. } => Some(condition),
            WorkflowError::Invalid(_) => None,
        }
    }
}
