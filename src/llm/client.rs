//! OpenAI-compatible streaming chat client
//!
//! Async HTTP client for any `/chat/completions` endpoint that streams server-sent
//! events, with tool calling and a per-read stall timeout.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::core::config::LlmConfig;
use crate::core::{ConvoyError, Message, Result, ToolDefinition};
use crate::llm::sse::SseDecoder;
use crate::llm::traits::{DeltaCallback, LlmProvider, LlmResponse};

/// Streaming chat-completions client
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    url: url::Url,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    read_timeout: Duration,
    inline_think: bool,
}

/// Chat request body
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    stream: bool,
    max_tokens: u32,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

impl ChatClient {
    /// Create a client from configuration
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: config.chat_url()?,
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            max_tokens: config.max_tokens,
            read_timeout: config.read_timeout(),
            inline_think: config.inline_think,
        })
    }

    /// Endpoint this client posts to
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    fn build_request<'a>(
        &'a self,
        messages: &'a [Message],
        tools: &'a [ToolDefinition],
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
            stream: true,
            max_tokens: self.max_tokens,
            stream_options: StreamOptions {
                include_usage: true,
            },
        }
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response> {
        let mut builder = self.client.post(self.url.clone()).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = tokio::time::timeout(self.read_timeout, builder.send())
            .await
            .map_err(|_| ConvoyError::StreamTimeout(self.read_timeout.as_secs()))?
            .map_err(|e| {
                if e.is_connect() {
                    ConvoyError::transport(format!(
                        "Cannot connect to model endpoint at {}: {}",
                        self.url, e
                    ))
                } else {
                    ConvoyError::from(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), body = %body, "model endpoint rejected request");
            return Err(ConvoyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for ChatClient {
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        on_delta: DeltaCallback<'_>,
    ) -> Result<LlmResponse> {
        let request = self.build_request(messages, tools);
        tracing::debug!(
            url = %self.url,
            messages = messages.len(),
            tools = tools.len(),
            "sending chat request"
        );

        let response = self.send(&request).await?;

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new(self.inline_think);

        loop {
            let next = tokio::time::timeout(self.read_timeout, stream.next())
                .await
                .map_err(|_| ConvoyError::StreamTimeout(self.read_timeout.as_secs()))?;

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| ConvoyError::transport(format!("Stream error: {}", e)))?;

            for delta in decoder.feed(&chunk) {
                on_delta(delta);
            }
            if decoder.is_done() {
                break;
            }
        }

        let (tail, turn) = decoder.finish();
        for delta in tail {
            on_delta(delta);
        }

        tracing::debug!(
            tool_calls = turn.tool_calls.len(),
            text_len = turn.text.len(),
            "stream done"
        );

        Ok(LlmResponse {
            content: turn.text,
            tool_calls: turn.tool_calls,
            usage: turn.usage,
            model: self.model.clone(),
            finish_reason: turn.finish_reason,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolDefinition;

    fn config() -> LlmConfig {
        LlmConfig {
            base_url: "http://localhost:1234/v1".to_string(),
            model: "test-model".to_string(),
            api_key: None,
            max_tokens: 4096,
            read_timeout_secs: 5,
            inline_think: false,
        }
    }

    #[test]
    fn test_client_creation() {
        let client = ChatClient::from_config(&config()).unwrap();
        assert_eq!(client.url().as_str(), "http://localhost:1234/v1/chat/completions");
        assert_eq!(client.model(), "test-model");
    }

    #[test]
    fn test_request_body_shape() {
        let client = ChatClient::from_config(&config()).unwrap();
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let tools = vec![ToolDefinition::no_args("check_agents", "Check agents")];

        let body = serde_json::to_value(client.build_request(&messages, &tools)).unwrap();
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["tools"][0]["function"]["name"], "check_agents");

        let body = serde_json::to_value(client.build_request(&messages, &[])).unwrap();
        assert!(body.get("tools").is_none());
    }
}
