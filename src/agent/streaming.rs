//! Streaming support for agent execution
//!
//! Agents that can produce output incrementally report it through a
//! [`ProgressCallback`]. Each call to `execute_streaming()` on an
//! [`AgentExecutor`](crate::agent::AgentExecutor) emits a `Start`, zero or
//! more `TextDelta` chunks, and a final `End` carrying the full content.
//!
//! # Example
//!
//! ```
//! use workflow::agent::{ProgressCallback, StreamEvent};
//!
//! struct LivePrinter;
//!
//! impl ProgressCallback for LivePrinter {
//!     fn on_event(&self, event: &StreamEvent) {
//!         if let StreamEvent::TextDelta { delta } = event {
//!             print!("{}", delta);
//!         }
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};

/// A single streaming event from an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Agent started producing output
    Start,
    /// A chunk of text output
    TextDelta { delta: String },
    /// Agent finished; carries the complete content
    End { content: String },
}

/// Callback for processing events as they arrive from streaming execution
///
/// This trait is object-safe and is passed around as `&dyn ProgressCallback`.
pub trait ProgressCallback: Send + Sync {
    /// Called for each event during streaming execution
    fn on_event(&self, event: &StreamEvent);
}

/// Emit a complete response as a single-chunk stream
pub fn emit_whole(callback: Option<&dyn ProgressCallback>, content: &str) {
    if let Some(cb) = callback {
        cb.on_event(&StreamEvent::Start);
        if !content.is_empty() {
            cb.on_event(&StreamEvent::TextDelta {
                delta: content.to_string(),
            });
        }
        cb.on_event(&StreamEvent::End {
            content: content.to_string(),
        });
    }
}
