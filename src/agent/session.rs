//! Conversation loop
//!
//! One [`Session`] owns a conversation history and drives it: request a model turn,
//! stream it, dispatch any tool calls in order, and repeat until the model answers
//! without tools or the iteration ceiling is hit. Everything observable is reported
//! through an [`EventSink`].

use std::sync::Arc;

use crate::agent::conversation::Conversation;
use crate::agent::events::{AgentEvent, EventSink};
use crate::agent::loop_state::AgentLoopState;
use crate::core::{error_payload, ToolCall};
use crate::llm::{LlmProvider, StreamDelta};
use crate::tools::ToolRegistry;

/// How a loop invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// The model answered without requesting tools
    Completed,
    /// The round ceiling was reached
    IterationLimit,
    /// The model call failed (transport, status, or stream timeout)
    Failed(String),
}

/// Summary of one `run`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Visible text of the final turn, if any
    pub final_text: Option<String>,
    /// Rounds started
    pub iterations: usize,
    /// Latest reported total token count
    pub tokens_used: u32,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// A conversation bound to a model and a capability set
pub struct Session {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    conversation: Conversation,
    max_iterations: usize,
}

impl Session {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
        max_iterations: usize,
    ) -> Self {
        Self {
            provider,
            tools,
            conversation: Conversation::new(system_prompt),
            max_iterations,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Forget everything but the system prompt
    pub fn reset(&mut self) {
        self.conversation.reset();
    }

    /// Append `prompt` as a user turn and run the loop to termination.
    ///
    /// Never returns an error: failures are reported as events and in the outcome,
    /// and the history is left valid for a later call.
    pub async fn run(&mut self, prompt: &str, sink: &dyn EventSink) -> RunOutcome {
        // A previous run may have stopped with an unanswered tool request.
        let pending = self.conversation.pending_tool_calls();
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "answering tool calls left from a previous run");
            self.dispatch(&pending, sink).await;
        }

        self.conversation.add_user(prompt);
        let mut state = AgentLoopState::new(self.max_iterations);

        loop {
            let Some(iteration) = state.begin_round() else {
                let message = format!("Max iterations ({}) reached", self.max_iterations);
                sink.emit(AgentEvent::Error {
                    content: message,
                });
                return RunOutcome {
                    status: RunStatus::IterationLimit,
                    final_text: None,
                    iterations: state.iteration,
                    tokens_used: state.tokens_used,
                };
            };
            sink.emit(AgentEvent::IterationStart { iteration });

            let on_delta = |delta: StreamDelta| match delta {
                StreamDelta::Content(content) => sink.emit(AgentEvent::Content { content }),
                StreamDelta::Reasoning(content) => sink.emit(AgentEvent::Reasoning { content }),
                StreamDelta::ToolCallStarted { index, name, .. } => {
                    sink.emit(AgentEvent::ToolCallDetected { index, name })
                }
            };

            let response = match self
                .provider
                .chat_stream(self.conversation.messages(), self.tools.definitions(), &on_delta)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    if e.is_transport() {
                        tracing::warn!(iteration, error = %e, "model endpoint failed; history kept for a retry");
                    } else {
                        tracing::error!(iteration, error = %e, "model round failed");
                    }
                    let message = e.to_string();
                    sink.emit(AgentEvent::Error {
                        content: message.clone(),
                    });
                    return RunOutcome {
                        status: RunStatus::Failed(message),
                        final_text: None,
                        iterations: state.iteration,
                        tokens_used: state.tokens_used,
                    };
                }
            };

            if let Some(usage) = response.usage {
                state.record_usage(usage.total_tokens);
                sink.emit(AgentEvent::ContextUpdate {
                    model: self.provider.model().to_string(),
                    tokens_used: usage.total_tokens,
                    max_tokens: self.provider.max_tokens(),
                });
            }

            if response.tool_calls.is_empty() {
                if !response.content.is_empty() {
                    self.conversation.add_assistant(&response.content);
                }
                sink.emit(AgentEvent::Done {
                    content: response.content.clone(),
                });
                return RunOutcome {
                    status: RunStatus::Completed,
                    final_text: Some(response.content).filter(|t| !t.is_empty()),
                    iterations: state.iteration,
                    tokens_used: state.tokens_used,
                };
            }

            self.conversation
                .add_tool_request(&response.content, response.tool_calls.clone());
            self.dispatch(&response.tool_calls, sink).await;
            tracing::debug!(iteration, results = response.tool_calls.len(), "sending tool results back");
        }
    }

    /// Answer each call in order with exactly one tool message
    async fn dispatch(&mut self, calls: &[ToolCall], sink: &dyn EventSink) {
        for call in calls {
            let args = match call.parse_arguments() {
                Ok(args) => args,
                Err(_) => {
                    let error = format!("Failed to parse arguments: {}", call.arguments);
                    sink.emit(AgentEvent::ToolError {
                        name: call.name.clone(),
                        error: error.clone(),
                    });
                    self.conversation
                        .add_tool_result(&call.id, error_payload(error));
                    continue;
                }
            };

            sink.emit(AgentEvent::ToolStart {
                name: call.name.clone(),
                args: args.clone(),
            });

            let result = self.tools.execute(&call.name, args).await;
            if result.success {
                sink.emit(AgentEvent::ToolResult {
                    name: call.name.clone(),
                    result: result.output.clone(),
                });
            } else {
                sink.emit(AgentEvent::ToolError {
                    name: call.name.clone(),
                    error: result.output.clone(),
                });
            }
            self.conversation.add_tool_result(&call.id, result.output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConvoyError, Message, Result, ToolDefinition};
    use crate::llm::{DeltaCallback, LlmResponse, TokenUsage};
    use crate::swarm::AgentIdentity;
    use crate::tools::ToolContext;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned turns and records the history it was shown
    struct ScriptedProvider {
        turns: Mutex<VecDeque<Result<LlmResponse>>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedProvider {
        fn new(turns: Vec<Result<LlmResponse>>) -> Arc<Self> {
            Arc::new(Self {
                turns: Mutex::new(turns.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<Vec<Message>> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat_stream(
            &self,
            messages: &[Message],
            _tools: &[ToolDefinition],
            on_delta: DeltaCallback<'_>,
        ) -> Result<LlmResponse> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let turn = self
                .turns
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(LlmResponse::text("scripted", "out of script")));
            if let Ok(response) = &turn {
                if !response.content.is_empty() {
                    on_delta(StreamDelta::Content(response.content.clone()));
                }
            }
            turn
        }

        fn model(&self) -> &str {
            "scripted"
        }

        fn max_tokens(&self) -> u32 {
            1000
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn session(provider: Arc<ScriptedProvider>, dir: &std::path::Path, max: usize) -> Session {
        let ctx = ToolContext::new(AgentIdentity::agent("a001"), dir);
        Session::new(
            provider,
            Arc::new(ToolRegistry::for_sub_agent(&ctx)),
            "system",
            max,
        )
    }

    fn events() -> Mutex<Vec<AgentEvent>> {
        Mutex::new(Vec::new())
    }

    #[tokio::test]
    async fn test_plain_answer_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![Ok(LlmResponse::text("scripted", "hello"))]);
        let mut session = session(provider.clone(), dir.path(), 10);
        let sink = events();

        let outcome = session.run("hi", &sink).await;
        assert!(outcome.is_completed());
        assert_eq!(outcome.final_text.as_deref(), Some("hello"));

        let messages = session.conversation().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2], Message::assistant("hello"));
        assert_eq!(provider.requests().len(), 1);

        let events = sink.into_inner().unwrap();
        assert_eq!(events.first(), Some(&AgentEvent::IterationStart { iteration: 1 }));
        assert_eq!(
            events.last(),
            Some(&AgentEvent::Done {
                content: "hello".into()
            })
        );
    }

    #[tokio::test]
    async fn test_empty_answer_appends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![Ok(LlmResponse::text("scripted", ""))]);
        let mut session = session(provider, dir.path(), 10);

        let outcome = session.run("hi", &events()).await;
        assert!(outcome.is_completed());
        assert_eq!(outcome.final_text, None);
        assert_eq!(session.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_two_tool_calls_answered_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "contents").unwrap();

        let calls = vec![
            ToolCall::new(
                "call_0",
                "list_dir",
                serde_json::json!({"path": dir.path()}).to_string(),
            ),
            ToolCall::new(
                "call_1",
                "read_file",
                serde_json::json!({"path": file}).to_string(),
            ),
        ];
        let provider = ScriptedProvider::new(vec![
            Ok(LlmResponse::with_tools("scripted", "", calls.clone())),
            Ok(LlmResponse::text("scripted", "done")),
        ]);
        let mut session = session(provider.clone(), dir.path(), 10);

        session.run("look around", &events()).await;

        let second_request = &provider.requests()[1];
        let tail = &second_request[second_request.len() - 3..];
        assert_eq!(tail[0], Message::assistant_with_tools("", calls));
        assert!(matches!(&tail[1], Message::Tool { tool_call_id, .. } if tool_call_id == "call_0"));
        assert_eq!(tail[2], Message::tool("call_1", "contents"));
    }

    #[tokio::test]
    async fn test_bad_arguments_become_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![
            Ok(LlmResponse::with_tools(
                "scripted",
                "",
                vec![ToolCall::new("call_0", "read_file", "{bad")],
            )),
            Ok(LlmResponse::text("scripted", "recovered")),
        ]);
        let mut session = session(provider.clone(), dir.path(), 10);
        let sink = events();

        let outcome = session.run("go", &sink).await;
        assert!(outcome.is_completed());
        assert_eq!(outcome.iterations, 2);

        let messages = session.conversation().messages();
        assert_eq!(
            messages[3],
            Message::tool(
                "call_0",
                r#"{"error":"Failed to parse arguments: {bad"}"#
            )
        );
        assert!(sink
            .into_inner()
            .unwrap()
            .iter()
            .any(|e| matches!(e, AgentEvent::ToolError { name, .. } if name == "read_file")));
    }

    #[tokio::test]
    async fn test_iteration_limit_leaves_history_answered() {
        let dir = tempfile::tempdir().unwrap();
        let looping = || {
            Ok(LlmResponse::with_tools(
                "scripted",
                "",
                vec![ToolCall::new("c", "list_dir", "{}")],
            ))
        };
        let provider = ScriptedProvider::new(vec![looping(), looping(), looping()]);
        let mut session = session(provider.clone(), dir.path(), 2);
        let sink = events();

        let outcome = session.run("spin", &sink).await;
        assert_eq!(outcome.status, RunStatus::IterationLimit);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(provider.requests().len(), 2);
        assert!(session.conversation().pending_tool_calls().is_empty());
        assert_eq!(
            sink.into_inner().unwrap().last(),
            Some(&AgentEvent::Error {
                content: "Max iterations (2) reached".into()
            })
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![
            Err(ConvoyError::transport("connection refused")),
            Ok(LlmResponse::text("scripted", "back")),
        ]);
        let mut session = session(provider, dir.path(), 10);

        let outcome = session.run("first", &events()).await;
        assert!(matches!(outcome.status, RunStatus::Failed(ref m) if m.contains("connection refused")));
        assert_eq!(session.conversation().len(), 2);

        let outcome = session.run("second", &events()).await;
        assert!(outcome.is_completed());
        assert_eq!(session.conversation().len(), 4);
    }

    #[tokio::test]
    async fn test_usage_reports_context_update() {
        let dir = tempfile::tempdir().unwrap();
        let mut response = LlmResponse::text("scripted", "ok");
        response.usage = Some(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 2,
            total_tokens: 12,
        });
        let provider = ScriptedProvider::new(vec![Ok(response)]);
        let mut session = session(provider, dir.path(), 10);
        let sink = events();

        let outcome = session.run("hi", &sink).await;
        assert_eq!(outcome.tokens_used, 12);
        assert!(sink.into_inner().unwrap().contains(&AgentEvent::ContextUpdate {
            model: "scripted".into(),
            tokens_used: 12,
            max_tokens: 1000,
        }));
    }

    #[tokio::test]
    async fn test_leftover_tool_request_answered_first() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![Ok(LlmResponse::text("scripted", "ok"))]);
        let mut session = session(provider, dir.path(), 10);
        session.conversation.add_user("earlier");
        session
            .conversation
            .add_tool_request("", vec![ToolCall::new("old", "nope", "{}")]);

        session.run("again", &events()).await;

        let messages = session.conversation().messages();
        assert_eq!(
            messages[3],
            Message::tool("old", r#"{"error":"Unknown tool: nope"}"#)
        );
        assert_eq!(messages[4], Message::user("again"));
    }
}
