//! LLM provider trait for abstracting the model backend
//!
//! The conversation loop only sees this seam, so tests can script model turns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{Message, Result, ToolCall, ToolDefinition};
use crate::llm::sse::{FinishReason, StreamDelta};

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Visible text content of the response
    pub content: String,
    /// Any tool calls the model wants to make, in first-seen order
    pub tool_calls: Vec<ToolCall>,
    /// Token usage information
    pub usage: Option<TokenUsage>,
    /// Model that generated the response
    pub model: String,
    /// Why generation stopped, if reported
    pub finish_reason: Option<FinishReason>,
}

impl LlmResponse {
    /// Plain text turn without tool calls
    pub fn text(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            usage: None,
            model: model.into(),
            finish_reason: Some(FinishReason::Stop),
        }
    }

    /// Turn that requests tool invocations
    pub fn with_tools(
        model: impl Into<String>,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            usage: None,
            model: model.into(),
            finish_reason: Some(FinishReason::ToolCalls),
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Callback invoked for every incremental delta while a response streams
pub type DeltaCallback<'a> = &'a (dyn Fn(StreamDelta) + Send + Sync);

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stream one model turn, reporting deltas as they arrive
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        on_delta: DeltaCallback<'_>,
    ) -> Result<LlmResponse>;

    /// Model name sent with each request
    fn model(&self) -> &str;

    /// Token budget; also the context-utilization maximum
    fn max_tokens(&self) -> u32;

    /// Get the provider name
    fn name(&self) -> &str;
}
