//! Tools module - capabilities the model can invoke
//!
//! Filesystem and shell access, the task board, the message queue, and (for the
//! coordinator only) sub-agent management, all behind the [`Tool`] trait.

pub mod agents;
pub mod fs;
pub mod messaging;
pub mod registry;
pub mod shell;
pub mod tasks;

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::core::{ConvoyError, Result, ToolCategory, ToolDefinition};
use crate::swarm::{AgentIdentity, Mailbox};

pub use registry::ToolRegistry;

/// A capability the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    /// Schema advertised to the model
    fn definition(&self) -> ToolDefinition;

    fn category(&self) -> ToolCategory;

    /// Run with parsed arguments, returning the text handed back to the model
    async fn execute(&self, args: &Value) -> Result<String>;
}

/// Per-session configuration shared by tools
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Stamped on outgoing messages
    pub identity: AgentIdentity,
    /// Root of agents/, mq/ and tasks/
    pub state_dir: PathBuf,
}

impl ToolContext {
    pub fn new(identity: AgentIdentity, state_dir: impl AsRef<Path>) -> Self {
        Self {
            identity,
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    pub fn mailbox(&self) -> Mailbox {
        Mailbox::new(&self.state_dir)
    }

    pub fn task_board(&self) -> tasks::TaskBoard {
        tasks::TaskBoard::new(&self.state_dir)
    }
}

/// A required string argument
pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ConvoyError::invalid_args(format!("Missing required argument: {}", key)))
}

/// An optional string argument; empty strings count as absent
pub fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}
