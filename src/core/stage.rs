//! Stage domain model

use crate::agent::{AgentError, ProgressCallback};
use crate::core::context::{StepContent, StepInput};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// The opaque callable that performs a stage's work
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Run the stage once against `input`, optionally streaming chunks
    async fn run(
        &self,
        input: &StepInput,
        callback: Option<&dyn ProgressCallback>,
    ) -> Result<StepContent, AgentError>;
}

/// A single named unit of work in a workflow
#[derive(Clone)]
pub struct Stage {
    /// Unique stage name
    pub name: String,

    /// Optional human-readable description
    pub description: Option<String>,

    executor: Arc<dyn StageExecutor>,
}

impl Stage {
    pub fn new(name: impl Into<String>, executor: Arc<dyn StageExecutor>) -> Self {
        Self {
            name: name.into(),
            description: None,
            executor,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The bound executor
    pub fn executor(&self) -> &Arc<dyn StageExecutor> {
        &self.executor
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
