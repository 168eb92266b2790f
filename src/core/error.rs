//! Custom error types for Convoy
//!
//! Provides a unified error handling system across all modules.

use thiserror::Error;

/// Main error type for Convoy operations
#[derive(Error, Debug)]
pub enum ConvoyError {
    /// Connection failure while talking to the model endpoint
    #[error("Transport error: {0}")]
    Transport(String),

    /// No data arrived on the model stream within the read timeout
    #[error("Stream read timed out after {0}s")]
    StreamTimeout(u64),

    /// Non-success HTTP status from the model endpoint
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Tool execution errors
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Tool name not present in the registry
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments missing or of the wrong type
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted state could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// A task cannot enter `done` while acceptance criteria are unchecked
    #[error("Cannot move to done: unchecked criteria remain ({})", .0.join("; "))]
    DoneGate(Vec<String>),

    /// A referenced agent, task, or file does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for Convoy operations
pub type Result<T> = std::result::Result<T, ConvoyError>;

impl ConvoyError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// Create an invalid-arguments error
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Structured payload handed back to the model in place of a tool result
    pub fn to_payload(&self) -> String {
        match self {
            Self::DoneGate(unchecked) => serde_json::json!({
                "error": "Cannot move to done: unchecked criteria remain",
                "unchecked": unchecked,
            })
            .to_string(),
            Self::ToolExecution(msg) => crate::core::types::error_payload(msg),
            other => crate::core::types::error_payload(other),
        }
    }

    /// Whether this error ends the current loop invocation (transport class)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::StreamTimeout(_) | Self::Api { .. } | Self::Http(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display_includes_body() {
        let err = ConvoyError::Api {
            status: 500,
            body: "model crashed".to_string(),
        };
        assert_eq!(err.to_string(), "API error (500): model crashed");
        assert!(err.is_transport());
    }

    #[test]
    fn test_tool_errors_are_not_transport() {
        assert!(!ConvoyError::tool("boom").is_transport());
        assert!(!ConvoyError::UnknownTool("nope".into()).is_transport());
        assert!(ConvoyError::StreamTimeout(120).is_transport());
    }

    #[test]
    fn test_tool_execution_payload_is_bare_message() {
        let payload = ConvoyError::tool("File not found: x").to_payload();
        assert_eq!(payload, r#"{"error":"File not found: x"}"#);
        let payload = ConvoyError::UnknownTool("nope".into()).to_payload();
        assert_eq!(payload, r#"{"error":"Unknown tool: nope"}"#);
    }

    #[test]
    fn test_done_gate_payload_lists_criteria() {
        let err = ConvoyError::DoneGate(vec!["tests pass".into(), "docs updated".into()]);
        let payload: serde_json::Value = serde_json::from_str(&err.to_payload()).unwrap();
        assert_eq!(payload["unchecked"][1], "docs updated");
        assert!(err.to_string().contains("tests pass; docs updated"));
    }
}
