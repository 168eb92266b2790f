//! Conversation history management
//!
//! Append-only chat history with the system prompt always first. Nothing is ever
//! rewritten in place; the only way back is a full reset.

use crate::core::{Message, ToolCall};

/// Manages conversation history
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Message history, system prompt at index 0
    messages: Vec<Message>,
}

impl Conversation {
    /// Create a new conversation seeded with a system prompt
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Add a user message
    pub fn add_user(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    /// Add a final assistant message
    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.push(Message::assistant(content));
    }

    /// Add an assistant message that requests tool calls
    pub fn add_tool_request(&mut self, content: impl Into<String>, tool_calls: Vec<ToolCall>) {
        self.push(Message::assistant_with_tools(content, tool_calls));
    }

    /// Answer one tool call
    pub fn add_tool_result(&mut self, tool_call_id: impl Into<String>, content: impl Into<String>) {
        self.push(Message::tool(tool_call_id, content));
    }

    /// Append any message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages in order, system prompt first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Tool calls of the most recent assistant message that have no answer yet, in call order.
    ///
    /// Non-empty only when a previous run stopped between appending a tool request and
    /// answering all of it.
    pub fn pending_tool_calls(&self) -> Vec<ToolCall> {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| matches!(m, Message::Assistant { .. }))
        else {
            return Vec::new();
        };

        let answered: Vec<&str> = self.messages[pos + 1..]
            .iter()
            .filter_map(|m| match m {
                Message::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();

        self.messages[pos]
            .tool_calls()
            .iter()
            .filter(|call| !answered.contains(&call.id.as_str()))
            .cloned()
            .collect()
    }

    /// Text of the most recent assistant message that has any
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| matches!(m, Message::Assistant { .. }))
            .find_map(|m| m.text().filter(|t| !t.is_empty()))
    }

    /// Drop everything but the system prompt
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }

    /// Get message count, system prompt included
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when only the system prompt is present
    pub fn is_empty(&self) -> bool {
        self.messages.len() <= 1
    }
}
