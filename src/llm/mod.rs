//! LLM module - model endpoint integration
//!
//! Streams chat completions from an OpenAI-compatible endpoint and decodes them
//! into text, reasoning and tool calls.

pub mod client;
pub mod sse;
pub mod think;
pub mod traits;

pub use client::ChatClient;
pub use sse::{DecodedTurn, FinishReason, SseDecoder, StreamDelta, StreamEvent};
pub use think::{ThinkScanner, ThinkState};
pub use traits::{DeltaCallback, LlmProvider, LlmResponse, TokenUsage};
