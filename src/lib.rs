//! agent-workflow - conditional multi-stage workflows over external agents

pub mod agent;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use agent::{AgentClientConfig, AgentError, AgentExecutor, AgentResponse, CliAgentClient};
pub use agent::{ProgressCallback, StreamEvent};
pub use core::config::{AgentProvider, AgentRegistry, CommandAgentProvider, WorkflowConfig};
pub use core::{
    Condition, ConditionalGroup, ExecutionStatus, FnCondition, OutputCondition, ParallelGroup,
    PredicateError, PredicateFailurePolicy, Stage, StageExecutor, StepContent, StepInput,
    Workflow, WorkflowItem, WorkflowRun,
};
pub use execution::{AgentStage, ExecutionEvent, WorkflowError, WorkflowRunner};
