//! Heartbeat coordinator
//!
//! Polls the message queue and agent records on a fixed interval while the
//! coordinator waits for user input. Anything new becomes a synthesized system
//! notification, injected as the coordinator's next turn.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::swarm::mailbox::{Mailbox, MqMessage};
use crate::swarm::store::{AgentStatus, AgentStore};

/// Pending read of the next line of user input; `None` means input is closed
pub type InputFuture = Pin<Box<dyn Future<Output = Option<String>> + Send>>;

/// Source of interactive input
pub trait InputSource {
    /// Start waiting for the next line
    fn next_input(&mut self) -> InputFuture;
}

/// Passive display of swarm activity, independent of the coordinator's own turns
pub trait ActivityFeed: Send + Sync {
    fn message(&self, message: &MqMessage);
    fn status(&self, change: &StatusChange);
}

/// A change in an agent's persisted status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    /// First sighting of an agent
    Spawned { agent_id: String, status: AgentStatus },
    Transition {
        agent_id: String,
        from: AgentStatus,
        to: AgentStatus,
    },
}

impl std::fmt::Display for StatusChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawned { agent_id, status } => write!(f, "{} spawned ({})", agent_id, status),
            Self::Transition { agent_id, from, to } => {
                write!(f, "{} {} -> {}", agent_id, from, to)
            }
        }
    }
}

/// What one poll found
#[derive(Debug, Clone, Default)]
pub struct HeartbeatReport {
    /// New messages addressed to this identity or broadcast, excluding its own
    pub inbox: Vec<MqMessage>,
    /// Every new message, whoever it is for
    pub observed: Vec<MqMessage>,
    pub changes: Vec<StatusChange>,
}

impl HeartbeatReport {
    /// Nothing at all was observed
    pub fn is_empty(&self) -> bool {
        self.observed.is_empty() && self.changes.is_empty()
    }

    /// Notification text for the coordinator, if anything concerns it
    pub fn notification(&self) -> Option<String> {
        if self.inbox.is_empty() && self.changes.is_empty() {
            return None;
        }

        let mut text = String::from("[System notification]");
        if !self.inbox.is_empty() {
            text.push_str("\nNew messages:");
            for m in &self.inbox {
                text.push_str(&format!("\n- from {} (to {}): {}", m.from, m.to, m.body));
            }
        }
        if !self.changes.is_empty() {
            text.push_str("\nAgent status changes:");
            for change in &self.changes {
                text.push_str(&format!("\n- {}", change));
            }
        }
        Some(text)
    }
}

/// Incremental observer of the queue and agent records
#[derive(Debug)]
pub struct HeartbeatMonitor {
    identity: String,
    mailbox: Mailbox,
    store: AgentStore,
    watermark: Option<String>,
    known: HashMap<String, AgentStatus>,
}

impl HeartbeatMonitor {
    pub fn new(identity: impl Into<String>, mailbox: Mailbox, store: AgentStore) -> Self {
        Self {
            identity: identity.into(),
            mailbox,
            store,
            watermark: None,
            known: HashMap::new(),
        }
    }

    /// Absorb existing state silently so only later activity is reported
    pub fn prime(&mut self) {
        let _ = self.poll();
    }

    /// Read everything new since the last poll
    pub fn poll(&mut self) -> HeartbeatReport {
        let observed = self.mailbox.read_all_since(self.watermark.as_deref());
        if let Some(latest) = observed.iter().map(|m| &m.timestamp).max() {
            self.watermark = Some(latest.clone());
        }

        let inbox = observed
            .iter()
            .filter(|m| m.is_for(&self.identity) && m.from != self.identity)
            .cloned()
            .collect();

        let mut changes = Vec::new();
        for record in self.store.list() {
            match self.known.insert(record.id.clone(), record.status) {
                None => changes.push(StatusChange::Spawned {
                    agent_id: record.id,
                    status: record.status,
                }),
                Some(previous) if previous != record.status => {
                    changes.push(StatusChange::Transition {
                        agent_id: record.id,
                        from: previous,
                        to: record.status,
                    })
                }
                Some(_) => {}
            }
        }

        HeartbeatReport {
            inbox,
            observed,
            changes,
        }
    }
}

/// Next turn for the coordinator loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    User(String),
    Notification(String),
    /// Input source is exhausted
    Closed,
}

/// Race between the pending input read and the heartbeat timer.
///
/// The input read survives heartbeat ticks and is only replaced after it resolves;
/// the timer is fresh on every tick.
pub struct HeartbeatRace<S> {
    source: S,
    monitor: HeartbeatMonitor,
    interval: Duration,
    pending: Option<InputFuture>,
}

impl<S: InputSource> HeartbeatRace<S> {
    pub fn new(source: S, monitor: HeartbeatMonitor, interval: Duration) -> Self {
        Self {
            source,
            monitor,
            interval,
            pending: None,
        }
    }

    pub fn monitor(&self) -> &HeartbeatMonitor {
        &self.monitor
    }

    /// Wait for user input, or for a heartbeat that finds something worth a turn
    pub async fn next_turn(&mut self, feed: &dyn ActivityFeed) -> Turn {
        loop {
            let outcome = {
                let input = self
                    .pending
                    .get_or_insert_with(|| self.source.next_input());
                let tick = tokio::time::sleep(self.interval);
                tokio::select! {
                    line = input.as_mut() => Some(line),
                    _ = tick => None,
                }
            };

            match outcome {
                Some(line) => {
                    self.pending = None;
                    return match line {
                        Some(line) => Turn::User(line),
                        None => Turn::Closed,
                    };
                }
                None => {
                    let report = self.monitor.poll();
                    if report.is_empty() {
                        continue;
                    }
                    for message in &report.observed {
                        feed.message(message);
                    }
                    for change in &report.changes {
                        feed.status(change);
                    }
                    if let Some(notification) = report.notification() {
                        tracing::debug!(
                            messages = report.inbox.len(),
                            changes = report.changes.len(),
                            "heartbeat notification"
                        );
                        return Turn::Notification(notification);
                    }
                }
            }
        }
    }
}
