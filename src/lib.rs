//! Convoy - multi-agent coding assistant
//!
//! A coordinator agent talks to an OpenAI-compatible streaming endpoint, runs tools,
//! and delegates work to sub-agents running as separate processes. Everything the
//! agents share lives in one state directory.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **LLM**: Streaming client and SSE decoder behind the `LlmProvider` trait
//! - **Agent**: Conversation loop, typed events, and the sub-agent worker
//! - **Swarm**: Agent lifecycle, message queue, and heartbeat
//! - **Tools**: Tool registry with filesystem, shell, task, messaging, and agent tools
//! - **CLI**: Coordinator REPL
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use convoy::agent::{NullSink, Session};
//! use convoy::llm::ChatClient;
//! use convoy::swarm::AgentIdentity;
//! use convoy::tools::{ToolContext, ToolRegistry};
//!
//! #[tokio::main]
//! async fn main() -> convoy::Result<()> {
//!     let config = convoy::Config::load();
//!     let ctx = ToolContext::new(AgentIdentity::agent("a001"), &config.swarm.state_dir);
//!     let mut session = Session::new(
//!         Arc::new(ChatClient::from_config(&config.llm)?),
//!         Arc::new(ToolRegistry::for_sub_agent(&ctx)),
//!         "You are a helpful assistant.",
//!         10,
//!     );
//!     let outcome = session.run("List the files here", &NullSink).await;
//!     println!("{:?}", outcome.final_text);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod llm;
pub mod swarm;
pub mod tools;

// Re-export commonly used items
pub use agent::Session;
pub use cli::Repl;
pub use core::{Config, ConvoyError, Result};
