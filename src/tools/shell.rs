//! run_shell - executes a command via `sh -c`

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::core::{ConvoyError, Result, ToolCategory, ToolDefinition};
use crate::tools::{required_str, Tool};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Captures stdout, stderr and the exit code of a shell command
pub struct RunShellTool {
    timeout: Duration,
}

impl Default for RunShellTool {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }
}

impl RunShellTool {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Tool for RunShellTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "run_shell",
            "Execute a shell command and return stdout/stderr",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Shell command to execute"
                    }
                },
                "required": ["command"]
            }),
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::System
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let command = required_str(args, "command")?;
        tracing::debug!(command = %command, "running shell command");

        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .stdin(std::process::Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            ConvoyError::tool(format!(
                "Command timed out after {}s: {}",
                self.timeout.as_secs(),
                command
            ))
        })?
        .map_err(|e| ConvoyError::tool(format!("Failed to run command: {}", e)))?;

        Ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "exitCode": output.status.code(),
        })
        .to_string())
    }
}
