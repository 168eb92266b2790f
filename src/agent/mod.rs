//! Agent module - the conversation loop and everything around it
//!
//! Contains the loop that coordinates model calls and tool execution, its history and
//! events, and the runtime of a spawned sub-agent.

pub mod conversation;
pub mod events;
pub mod loop_state;
pub mod prompts;
pub mod session;
pub mod worker;

pub use conversation::Conversation;
pub use events::{channel, AgentEvent, EventSink, FnSink, NullSink};
pub use loop_state::AgentLoopState;
pub use session::{RunOutcome, RunStatus, Session};
pub use worker::{run_worker, WorkerLog, WorkerSpec};
