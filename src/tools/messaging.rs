//! Message-queue tools: mq_send, mq_read
//!
//! Both act as the session's own identity; a sub-agent cannot send as someone else.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::{Result, ToolCategory, ToolDefinition};
use crate::tools::{optional_str, required_str, Tool, ToolContext};

/// mq_send
pub struct MqSendTool {
    ctx: ToolContext,
}

impl MqSendTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for MqSendTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "mq_send",
            "Send a message to another agent via the message queue. Use \"main\" to message the main agent, an agent ID like \"a001\" for a sub-agent, or \"broadcast\" for all agents.",
            json!({
                "type": "object",
                "properties": {
                    "to": {
                        "type": "string",
                        "description": "Recipient agent ID (\"main\", \"a001\", etc.) or \"broadcast\""
                    },
                    "body": {"type": "string", "description": "Message content"}
                },
                "required": ["to", "body"]
            }),
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Messaging
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let to = required_str(args, "to")?;
        let body = required_str(args, "body")?;
        let message = self.ctx.mailbox().send(self.ctx.identity.as_str(), to, body)?;

        Ok(json!({
            "sent": true,
            "id": message.id,
            "from": message.from,
            "to": message.to,
        })
        .to_string())
    }
}

/// mq_read
pub struct MqReadTool {
    ctx: ToolContext,
}

impl MqReadTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for MqReadTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "mq_read",
            "Read messages from the message queue addressed to you or broadcast. Optionally filter by timestamp.",
            json!({
                "type": "object",
                "properties": {
                    "since": {
                        "type": "string",
                        "description": "ISO timestamp; only return messages after this time (optional)"
                    }
                }
            }),
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Messaging
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let since = optional_str(args, "since");
        let messages = self
            .ctx
            .mailbox()
            .read_since(self.ctx.identity.as_str(), since);
        Ok(serde_json::to_string(&messages)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::{AgentIdentity, MqMessage};

    #[tokio::test]
    async fn test_send_stamps_identity_and_read_filters() {
        let dir = tempfile::tempdir().unwrap();
        let worker = ToolContext::new(AgentIdentity::agent("a001"), dir.path());
        let coordinator = ToolContext::new(AgentIdentity::coordinator(), dir.path());

        let sent = MqSendTool::new(worker.clone())
            .execute(&json!({"to": "main", "body": "done with step 1"}))
            .await
            .unwrap();
        let sent: Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(sent, json!({"sent": true, "id": "0001", "from": "a001", "to": "main"}));

        MqSendTool::new(coordinator.clone())
            .execute(&json!({"to": "a002", "body": "not for a001"}))
            .await
            .unwrap();

        let read = MqReadTool::new(coordinator).execute(&json!({})).await.unwrap();
        let read: Vec<MqMessage> = serde_json::from_str(&read).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].body, "done with step 1");

        let read = MqReadTool::new(worker).execute(&json!({})).await.unwrap();
        let read: Vec<MqMessage> = serde_json::from_str(&read).unwrap();
        assert!(read.is_empty());
    }

    #[tokio::test]
    async fn test_read_since_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(AgentIdentity::agent("a001"), dir.path());
        let first = ctx.mailbox().send("main", "broadcast", "one").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        ctx.mailbox().send("main", "a001", "two").unwrap();

        let read = MqReadTool::new(ctx)
            .execute(&json!({"since": first.timestamp}))
            .await
            .unwrap();
        let read: Vec<MqMessage> = serde_json::from_str(&read).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].body, "two");
    }
}
