//! Shared types used across Convoy modules
//!
//! Contains message structures, tool definitions, and common data types.
//! Messages serialize directly into the chat-completions wire format.

use serde::{Deserialize, Serialize};

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// System instructions
    System { content: String },
    /// User (or synthesized system-notification) turn
    User { content: String },
    /// Model turn, optionally requesting tool invocations
    Assistant {
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// Answer to exactly one tool invocation
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Create a new assistant message without tool calls
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Create an assistant message carrying tool calls; empty text is stored as `None`
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let content = content.into();
        Self::Assistant {
            content: if content.is_empty() {
                None
            } else {
                Some(content)
            },
            tool_calls,
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Create a tool result message
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    /// Role name as sent on the wire
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }

    /// Text content, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::System { content } | Self::User { content } | Self::Tool { content, .. } => {
                Some(content)
            }
            Self::Assistant { content, .. } => content.as_deref(),
        }
    }

    /// Tool calls requested by an assistant message
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// A tool call made by the model
///
/// `arguments` is the raw JSON document reassembled from streamed fragments.
/// It is only parsed at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireToolCall", from = "WireToolCall")]
pub struct ToolCall {
    /// Identifier the matching tool message must echo
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// Raw JSON arguments
    pub arguments: String,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the accumulated arguments; an empty payload means no arguments
    pub fn parse_arguments(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::json!({}));
        }
        serde_json::from_str(&self.arguments)
    }
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunction,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<ToolCall> for WireToolCall {
    fn from(call: ToolCall) -> Self {
        Self {
            id: call.id,
            call_type: function_type(),
            function: WireFunction {
                name: call.name,
                arguments: call.arguments,
            },
        }
    }
}

impl From<WireToolCall> for ToolCall {
    fn from(wire: WireToolCall) -> Self {
        Self {
            id: wire.id,
            name: wire.function.name,
            arguments: wire.function.arguments,
        }
    }
}

/// Definition of a tool that can be called by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Type of tool (always "function" for now)
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function details
    pub function: FunctionDefinition,
}

/// Function definition within a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Name of the function
    pub name: String,
    /// Description of what the function does
    pub description: String,
    /// JSON Schema for the parameters; absent means the tool takes no arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl ToolDefinition {
    /// Create a new function tool definition
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters: Some(parameters),
            },
        }
    }

    /// Create a function definition that takes no arguments
    pub fn no_args(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters: None,
            },
        }
    }

    /// Tool name
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Result of executing a tool
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Name of the tool that was executed
    pub tool_name: String,
    /// Whether the execution was successful
    pub success: bool,
    /// Serialized output (or structured error payload) fed back to the model
    pub output: String,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(tool_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            output: output.into(),
        }
    }

    /// Create a failed result whose output is `{"error": ...}`
    pub fn failure(tool_name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            output: error_payload(error),
        }
    }

    /// Create a failed result from a crate error, keeping its structured payload
    pub fn from_error(tool_name: impl Into<String>, error: &crate::core::ConvoyError) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            output: error.to_payload(),
        }
    }
}

/// Structured error payload returned to the model in place of a tool result
pub fn error_payload(error: impl std::fmt::Display) -> String {
    serde_json::json!({ "error": error.to_string() }).to_string()
}

/// Current UTC time as an RFC 3339 string with microsecond precision.
///
/// Persisted records compare these lexicographically, so the format is fixed-width.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Category of tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    /// File reads, writes and directory listings
    FileSystem,
    /// Shell commands
    System,
    /// Task board workflow
    Tasks,
    /// Agent-to-agent messaging
    Messaging,
    /// Sub-agent spawn and inspection (coordinator only)
    Agents,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolCategory::FileSystem => write!(f, "filesystem"),
            ToolCategory::System => write!(f, "system"),
            ToolCategory::Tasks => write!(f, "tasks"),
            ToolCategory::Messaging => write!(f, "messaging"),
            ToolCategory::Agents => write!(f, "agents"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assistant_with_tools_wire_format() {
        let msg = Message::assistant_with_tools(
            "",
            vec![ToolCall::new("call_1", "list_dir", r#"{"path":"."}"#)],
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "list_dir", "arguments": "{\"path\":\".\"}"}
                }]
            })
        );
    }

    #[test]
    fn test_tool_message_wire_format() {
        let value = serde_json::to_value(Message::tool("call_1", "ok")).unwrap();
        assert_eq!(
            value,
            json!({"role": "tool", "tool_call_id": "call_1", "content": "ok"})
        );
    }

    #[test]
    fn test_message_roundtrips_through_history_file() {
        let msg = Message::assistant_with_tools(
            "thinking aloud",
            vec![ToolCall::new("c", "read_file", "{}")],
        );
        let text = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_empty_arguments_parse_as_object() {
        let call = ToolCall::new("c", "check_agents", "");
        assert_eq!(call.parse_arguments().unwrap(), json!({}));
    }

    #[test]
    fn test_bad_arguments_fail_to_parse() {
        let call = ToolCall::new("c", "read_file", "{bad");
        assert!(call.parse_arguments().is_err());
    }

    #[test]
    fn test_no_args_definition_omits_parameters() {
        let def = ToolDefinition::no_args("check_agents", "Check agents");
        let value = serde_json::to_value(&def).unwrap();
        assert!(value["function"].get("parameters").is_none());
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let a = now_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_timestamp();
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }

    #[test]
    fn test_failure_result_is_structured() {
        let result = ToolResult::failure("read_file", "File not found: x");
        let value: serde_json::Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(value["error"], "File not found: x");
        assert!(!result.success);
    }
}
