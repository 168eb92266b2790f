//! Incremental decoder for chat-completion server-sent events
//!
//! Bytes go in as they arrive from the transport; typed deltas come out as soon as a
//! complete `data:` line is available. A pending byte buffer keeps lines (and the
//! UTF-8 sequences inside them) whole no matter where the transport splits chunks.

use serde::Deserialize;
use std::collections::HashMap;

use crate::core::ToolCall;
use crate::llm::think::{Routed, ThinkScanner};
use crate::llm::traits::TokenUsage;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Why the model stopped producing output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Other(String),
}

impl From<&str> for FinishReason {
    fn from(value: &str) -> Self {
        match value {
            "stop" => Self::Stop,
            "tool_calls" | "function_call" => Self::ToolCalls,
            "length" => Self::Length,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One fragment of a streamed tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// A single decoded event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Content(String),
    Reasoning(String),
    ToolCall(ToolCallDelta),
    Finish(FinishReason),
    Usage(TokenUsage),
    Done,
    /// Comments, keep-alives, unparsable or unrecognized payloads
    Ignored,
}

/// Incremental output surfaced to observers while the stream is live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    /// Visible assistant text
    Content(String),
    /// Reasoning text (dedicated channel or inline think block)
    Reasoning(String),
    /// First time a tool call's name is known
    ToolCallStarted { index: usize, id: String, name: String },
}

/// Everything assembled from one finished stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedTurn {
    /// Concatenation of all visible content
    pub text: String,
    /// Completed tool calls in first-seen order
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChoicePayload>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChoicePayload {
    #[serde(default)]
    delta: Option<DeltaPayload>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaPayload {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "reasoning")]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallPayload>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallPayload {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionPayload>,
}

#[derive(Debug, Deserialize)]
struct FunctionPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Parse one line of the event stream into zero or more events
pub fn parse_line(line: &str) -> Vec<StreamEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() || line.starts_with(':') {
        return vec![StreamEvent::Ignored];
    }

    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return vec![StreamEvent::Ignored];
    };
    let data = data.trim();

    if data == DONE_SENTINEL {
        return vec![StreamEvent::Done];
    }

    let payload: ChunkPayload = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, line = %data, "skipping unparsable stream event");
            return vec![StreamEvent::Ignored];
        }
    };

    let mut events = Vec::new();

    if let Some(choice) = payload.choices.into_iter().next() {
        if let Some(delta) = choice.delta {
            if let Some(reasoning) = delta.reasoning_content.filter(|s| !s.is_empty()) {
                events.push(StreamEvent::Reasoning(reasoning));
            }
            if let Some(content) = delta.content.filter(|s| !s.is_empty()) {
                events.push(StreamEvent::Content(content));
            }
            for call in delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = match call.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                events.push(StreamEvent::ToolCall(ToolCallDelta {
                    index: call.index.unwrap_or(0),
                    id: call.id,
                    name,
                    arguments,
                }));
            }
        }
        if let Some(reason) = choice.finish_reason {
            events.push(StreamEvent::Finish(FinishReason::from(reason.as_str())));
        }
    }

    if let Some(usage) = payload.usage {
        events.push(StreamEvent::Usage(usage));
    }

    if events.is_empty() {
        events.push(StreamEvent::Ignored);
    }
    events
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
    announced: bool,
}

/// Tool-call fragments keyed by stream-local index
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    calls: HashMap<usize, PartialCall>,
    order: Vec<usize>,
}

impl ToolCallAccumulator {
    fn apply(&mut self, delta: ToolCallDelta) -> Option<StreamDelta> {
        if !self.calls.contains_key(&delta.index) {
            self.order.push(delta.index);
        }
        let call = self.calls.entry(delta.index).or_default();

        if let Some(id) = delta.id.filter(|s| !s.is_empty()) {
            call.id = id;
        }
        if let Some(name) = delta.name.filter(|s| !s.is_empty()) {
            call.name = name;
        }
        if let Some(fragment) = delta.arguments {
            call.arguments.push_str(&fragment);
        }

        if !call.announced && !call.name.is_empty() {
            call.announced = true;
            return Some(StreamDelta::ToolCallStarted {
                index: delta.index,
                id: call.id.clone(),
                name: call.name.clone(),
            });
        }
        None
    }

    fn finish(mut self) -> Vec<ToolCall> {
        self.order
            .iter()
            .filter_map(|index| {
                self.calls.remove(index).map(|call| {
                    let id = if call.id.is_empty() {
                        format!("call_{}", index)
                    } else {
                        call.id
                    };
                    ToolCall::new(id, call.name, call.arguments)
                })
            })
            .collect()
    }
}

/// Stateful decoder for one streamed response
#[derive(Debug)]
pub struct SseDecoder {
    pending: Vec<u8>,
    think: Option<ThinkScanner>,
    text: String,
    calls: ToolCallAccumulator,
    usage: Option<TokenUsage>,
    finish_reason: Option<FinishReason>,
    done: bool,
}

impl SseDecoder {
    /// Create a decoder; `inline_think` enables the think-block scanner on content
    pub fn new(inline_think: bool) -> Self {
        Self {
            pending: Vec::new(),
            think: inline_think.then(ThinkScanner::new),
            text: String::new(),
            calls: ToolCallAccumulator::default(),
            usage: None,
            finish_reason: None,
            done: false,
        }
    }

    /// Whether the `[DONE]` sentinel has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw transport bytes; returns deltas from every line completed by this chunk
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamDelta> {
        self.pending.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.handle_line(&line[..pos], &mut out);
        }
        out
    }

    /// End of stream: process a deferred trailing line and flush held-back content
    pub fn finish(mut self) -> (Vec<StreamDelta>, DecodedTurn) {
        let mut out = Vec::new();

        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.handle_line(&line, &mut out);
        }

        if let Some(routed) = self.think.as_mut().and_then(ThinkScanner::finish) {
            self.route(routed, &mut out);
        }

        let turn = DecodedTurn {
            text: self.text,
            tool_calls: self.calls.finish(),
            usage: self.usage,
            finish_reason: self.finish_reason,
        };
        (out, turn)
    }

    fn handle_line(&mut self, raw: &[u8], out: &mut Vec<StreamDelta>) {
        let line = String::from_utf8_lossy(raw);
        for event in parse_line(&line) {
            self.apply(event, out);
        }
    }

    fn apply(&mut self, event: StreamEvent, out: &mut Vec<StreamDelta>) {
        match event {
            StreamEvent::Content(content) => match self.think.as_mut() {
                Some(scanner) => {
                    for routed in scanner.push(&content) {
                        self.route(routed, out);
                    }
                }
                None => {
                    self.text.push_str(&content);
                    out.push(StreamDelta::Content(content));
                }
            },
            StreamEvent::Reasoning(reasoning) => out.push(StreamDelta::Reasoning(reasoning)),
            StreamEvent::ToolCall(delta) => {
                if let Some(started) = self.calls.apply(delta) {
                    out.push(started);
                }
            }
            StreamEvent::Finish(reason) => {
                if reason == FinishReason::Length {
                    tracing::warn!("model hit the max_tokens limit; output may be truncated");
                }
                self.finish_reason = Some(reason);
            }
            StreamEvent::Usage(usage) => self.usage = Some(usage),
            StreamEvent::Done => self.done = true,
            StreamEvent::Ignored => {}
        }
    }

    fn route(&mut self, routed: Routed, out: &mut Vec<StreamDelta>) {
        match routed {
            Routed::Reasoning(text) => out.push(StreamDelta::Reasoning(text)),
            Routed::Visible(text) => {
                self.text.push_str(&text);
                out.push(StreamDelta::Content(text));
            }
        }
    }
}
