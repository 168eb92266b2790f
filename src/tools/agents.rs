//! Coordinator-only tools: spawn_agent, check_agents, get_agent_result

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::{ConvoyError, Result, ToolCategory, ToolDefinition};
use crate::swarm::{AgentManager, AgentStatus};
use crate::tools::{optional_str, required_str, Tool};

/// spawn_agent
pub struct SpawnAgentTool {
    manager: Arc<AgentManager>,
}

impl SpawnAgentTool {
    pub fn new(manager: Arc<AgentManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for SpawnAgentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "spawn_agent",
            "Spawn an async sub-agent that runs in the background. It shares the filesystem and can communicate via the message queue. Returns immediately with the agent ID.",
            json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string", "description": "The task/prompt for the sub-agent"},
                    "context": {
                        "type": "string",
                        "description": "Optional extra context to prepend to the prompt (e.g. relevant file contents, prior findings)"
                    }
                },
                "required": ["prompt"]
            }),
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Agents
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let prompt = required_str(args, "prompt")?;
        let context = optional_str(args, "context");
        let record = self.manager.spawn(prompt, context).await?;

        Ok(json!({
            "agent_id": record.id,
            "status": "spawned",
            "prompt_preview": record.prompt_preview(),
        })
        .to_string())
    }
}

#[derive(Serialize)]
struct AgentSummary {
    id: String,
    status: AgentStatus,
    prompt_preview: String,
    started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<String>,
}

/// check_agents
pub struct CheckAgentsTool {
    manager: Arc<AgentManager>,
}

impl CheckAgentsTool {
    pub fn new(manager: Arc<AgentManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for CheckAgentsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::no_args(
            "check_agents",
            "Check the status of all spawned sub-agents. Returns a summary of each agent's current state.",
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Agents
    }

    async fn execute(&self, _args: &Value) -> Result<String> {
        let summaries: Vec<AgentSummary> = self
            .manager
            .list_all()
            .into_iter()
            .map(|record| AgentSummary {
                prompt_preview: record.prompt_preview(),
                id: record.id,
                status: record.status,
                started_at: record.started_at,
                finished_at: record.finished_at,
            })
            .collect();
        Ok(serde_json::to_string(&summaries)?)
    }
}

/// get_agent_result
pub struct GetAgentResultTool {
    manager: Arc<AgentManager>,
}

impl GetAgentResultTool {
    pub fn new(manager: Arc<AgentManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for GetAgentResultTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "get_agent_result",
            "Get the full result and step-by-step output of a completed sub-agent.",
            json!({
                "type": "object",
                "properties": {
                    "agent_id": {"type": "string", "description": "The agent ID, e.g. \"a001\""}
                },
                "required": ["agent_id"]
            }),
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Agents
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let agent_id = required_str(args, "agent_id")?;
        let report = self.manager.get_result(agent_id).map_err(|e| match e {
            ConvoyError::NotFound(_) | ConvoyError::Json(_) | ConvoyError::Io(_) => {
                ConvoyError::tool(format!("Agent not found: {}", agent_id))
            }
            other => other,
        })?;
        Ok(serde_json::to_string(&report)?)
    }
}
