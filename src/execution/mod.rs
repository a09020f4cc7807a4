//! Workflow execution engine

pub mod engine;
pub mod error;
pub mod executor;

pub use engine::{EventHandler, ExecutionEvent, WorkflowRunner};
pub use error::WorkflowError;
pub use executor::{extract_structured, AgentStage};
