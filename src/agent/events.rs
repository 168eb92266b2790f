//! Typed events emitted by the conversation loop
//!
//! Observers subscribe through an [`EventSink`]; the terminal printer, the worker's
//! JSON-lines log, and tests are all just sinks.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// One observable step of a loop invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    IterationStart {
        iteration: usize,
    },
    Content {
        content: String,
    },
    Reasoning {
        content: String,
    },
    /// A tool call's name became known while streaming
    ToolCallDetected {
        index: usize,
        name: String,
    },
    #[serde(rename = "tool_call_start")]
    ToolStart {
        name: String,
        args: serde_json::Value,
    },
    #[serde(rename = "tool_call")]
    ToolResult {
        name: String,
        result: String,
    },
    ToolError {
        name: String,
        error: String,
    },
    Done {
        content: String,
    },
    Error {
        content: String,
    },
    ContextUpdate {
        model: String,
        tokens_used: u32,
        max_tokens: u32,
    },
}

/// Receiver of loop events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AgentEvent);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: AgentEvent) {}
}

/// Adapter for a plain closure
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(AgentEvent) + Send + Sync,
{
    fn emit(&self, event: AgentEvent) {
        (self.0)(event)
    }
}

impl EventSink for UnboundedSender<AgentEvent> {
    fn emit(&self, event: AgentEvent) {
        // A dropped subscriber only means nobody is listening.
        let _ = self.send(event);
    }
}

/// Collects events in memory
impl EventSink for Mutex<Vec<AgentEvent>> {
    fn emit(&self, event: AgentEvent) {
        if let Ok(mut events) = self.lock() {
            events.push(event);
        }
    }
}

/// A sink plus the stream subscribing to it
pub fn channel() -> (UnboundedSender<AgentEvent>, UnboundedReceiverStream<AgentEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, UnboundedReceiverStream::new(rx))
}
