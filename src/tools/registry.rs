//! Tool registry - manages and dispatches tool calls
//!
//! Central hub for registering tools and routing tool calls to handlers.
//! Every outcome, including unknown names and panics, comes back as a [`ToolResult`].

use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::core::{ConvoyError, ToolCategory, ToolDefinition, ToolResult};
use crate::swarm::AgentManager;
use crate::tools::agents::{CheckAgentsTool, GetAgentResultTool, SpawnAgentTool};
use crate::tools::fs::{ListDirTool, ReadFileTool, WriteFileTool};
use crate::tools::messaging::{MqReadTool, MqSendTool};
use crate::tools::shell::RunShellTool;
use crate::tools::tasks::{CreateTaskTool, ListTasksTool, MoveTaskTool, ReadTaskTool, UpdateTaskTool};
use crate::tools::{Tool, ToolContext};

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    /// Definitions in registration order
    definitions: Vec<ToolDefinition>,
    /// Tool categories
    categories: HashMap<String, ToolCategory>,
    /// Handlers indexed by name
    handlers: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricted set for sub-agents: filesystem, shell, tasks, messaging
    pub fn for_sub_agent(ctx: &ToolContext) -> Self {
        let mut registry = Self::new();
        registry.register(ReadFileTool);
        registry.register(WriteFileTool);
        registry.register(ListDirTool);
        registry.register(RunShellTool::default());

        let board = ctx.task_board();
        registry.register(CreateTaskTool::new(board.clone()));
        registry.register(ListTasksTool::new(board.clone()));
        registry.register(ReadTaskTool::new(board.clone()));
        registry.register(UpdateTaskTool::new(board.clone()));
        registry.register(MoveTaskTool::new(board));

        registry.register(MqSendTool::new(ctx.clone()));
        registry.register(MqReadTool::new(ctx.clone()));
        registry
    }

    /// Coordinator superset: adds sub-agent spawn and inspection
    pub fn for_coordinator(ctx: &ToolContext, manager: Arc<AgentManager>) -> Self {
        let mut registry = Self::for_sub_agent(ctx);
        registry.register(SpawnAgentTool::new(manager.clone()));
        registry.register(CheckAgentsTool::new(manager.clone()));
        registry.register(GetAgentResultTool::new(manager));
        registry
    }

    /// Register a tool; a later registration under the same name replaces the earlier one
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let definition = tool.definition();
        let name = definition.name().to_string();

        self.definitions.retain(|d| d.name() != name);
        self.definitions.push(definition);
        self.categories.insert(name.clone(), tool.category());
        self.handlers.insert(name, Box::new(tool));
    }

    /// Get all tool definitions
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Get tool definitions by category
    pub fn definitions_by_category(&self, category: ToolCategory) -> Vec<&ToolDefinition> {
        self.definitions
            .iter()
            .filter(|def| self.categories.get(def.name()) == Some(&category))
            .collect()
    }

    /// Registered tool names in order
    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        let Some(tool) = self.handlers.get(name) else {
            tracing::debug!(tool = %name, "unknown tool requested");
            return ToolResult::from_error(name, &ConvoyError::UnknownTool(name.to_string()));
        };

        match AssertUnwindSafe(tool.execute(&args)).catch_unwind().await {
            Ok(Ok(output)) => ToolResult::success(name, output),
            Ok(Err(e)) => {
                tracing::debug!(tool = %name, error = %e, "tool failed");
                ToolResult::from_error(name, &e)
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::warn!(tool = %name, panic = %detail, "tool panicked");
                ToolResult::failure(name, format!("Tool {} panicked: {}", name, detail))
            }
        }
    }
}
