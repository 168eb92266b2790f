//! Swarm module - multi-agent coordination over a shared state directory
//!
//! Sub-agents are separate OS processes. Everything they share with the coordinator
//! lives under one directory: agent records, the message queue, and the task board.

pub mod heartbeat;
pub mod ids;
pub mod mailbox;
pub mod manager;
pub mod store;

pub use heartbeat::{ActivityFeed, HeartbeatMonitor, HeartbeatRace, HeartbeatReport, InputSource, StatusChange, Turn};
pub use mailbox::{Mailbox, MqMessage, BROADCAST, COORDINATOR_ID};
pub use manager::{AgentManager, AgentReport, WorkerCommand};
pub use store::{AgentRecord, AgentResult, AgentStatus, AgentStore};

/// Environment variable carrying a worker's agent id
pub const AGENT_ID_ENV: &str = "CONVOY_AGENT_ID";
/// Environment variable carrying context inherited from the parent
pub const AGENT_CONTEXT_ENV: &str = "CONVOY_AGENT_CONTEXT";
/// Environment variable carrying the shared state directory
pub const STATE_DIR_ENV: &str = "CONVOY_STATE_DIR";

/// Who is acting: the coordinator or one specific sub-agent.
///
/// Stamped on outgoing messages and used to pick the capability set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentIdentity(String);

impl AgentIdentity {
    /// The interactive coordinator
    pub fn coordinator() -> Self {
        Self(COORDINATOR_ID.to_string())
    }

    /// A spawned sub-agent
    pub fn agent(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
