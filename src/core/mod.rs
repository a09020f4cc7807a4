//! Core domain models for workflows
//!
//! This module defines the stages, groups and predicates that make up a
//! workflow, the data threaded between them, and the YAML configuration
//! they are built from.

pub mod condition;
pub mod config;
pub mod context;
pub mod stage;
pub mod state;
pub mod workflow;

pub use condition::*;
pub use context::*;
pub use stage::*;
pub use state::*;
pub use workflow::*;
