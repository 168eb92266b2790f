//! File-backed message queue
//!
//! One pretty-printed JSON file per message under `<state_dir>/mq/`, named by a
//! zero-padded sequential id. The queue is a write-once log: nothing is ever
//! mutated or deleted, and readers filter by recipient and a timestamp watermark.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{now_timestamp, ConvoyError, Result};
use crate::swarm::ids::{self, MESSAGE_WIDTH};

/// Recipient sentinel matching every agent
pub const BROADCAST: &str = "broadcast";
/// Identity of the interactive coordinator
pub const COORDINATOR_ID: &str = "main";

const MESSAGE_SUFFIX: &str = ".json";

/// One queued message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub body: String,
    pub timestamp: String,
}

impl MqMessage {
    /// Addressed to `recipient` directly or broadcast
    pub fn is_for(&self, recipient: &str) -> bool {
        self.to == recipient || self.to == BROADCAST
    }

    /// Strictly newer than the watermark, if any
    pub fn is_after(&self, since: Option<&str>) -> bool {
        since.map_or(true, |since| self.timestamp.as_str() > since)
    }
}

/// Handle to the queue directory
#[derive(Debug, Clone)]
pub struct Mailbox {
    root: PathBuf,
}

impl Mailbox {
    /// Queue rooted at `<state_dir>/mq`
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            root: state_dir.as_ref().join("mq"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append a message and return it with its allocated id.
    ///
    /// The file appears fully written under its final name; the timestamp is taken
    /// right before the claim.
    pub fn send(&self, from: &str, to: &str, body: &str) -> Result<MqMessage> {
        let mut sent = None;
        ids::publish_file(&self.root, MESSAGE_SUFFIX, MESSAGE_WIDTH, |id| {
            let message = MqMessage {
                id: id.to_string(),
                from: from.to_string(),
                to: to.to_string(),
                body: body.to_string(),
                timestamp: now_timestamp(),
            };
            let bytes = serde_json::to_vec_pretty(&message)?;
            sent = Some(message);
            Ok(bytes)
        })?;

        let message = sent.ok_or_else(|| ConvoyError::storage("message was never rendered"))?;
        tracing::debug!(id = %message.id, from = %from, to = %to, "message queued");
        Ok(message)
    }

    /// Messages for `recipient` (or broadcast) newer than `since`, in id order
    pub fn read_since(&self, recipient: &str, since: Option<&str>) -> Vec<MqMessage> {
        self.read_all_since(since)
            .into_iter()
            .filter(|m| m.is_for(recipient))
            .collect()
    }

    /// Every message newer than `since`, in id order; malformed files are skipped
    pub fn read_all_since(&self, since: Option<&str>) -> Vec<MqMessage> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(MESSAGE_SUFFIX) && !name.starts_with('.'))
            .collect();
        names.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

        names
            .iter()
            .filter_map(|name| {
                let text = fs::read_to_string(self.root.join(name)).ok()?;
                match serde_json::from_str::<MqMessage>(&text) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        tracing::debug!(file = %name, error = %e, "skipping malformed message");
                        None
                    }
                }
            })
            .filter(|m| m.is_after(since))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailbox() -> (tempfile::TempDir, Mailbox) {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = Mailbox::new(dir.path());
        (dir, mailbox)
    }

    #[test]
    fn test_send_allocates_sequential_ids() {
        let (_dir, mailbox) = mailbox();
        let first = mailbox.send("main", "a001", "hello").unwrap();
        let second = mailbox.send("a001", "main", "hi back").unwrap();

        assert_eq!(first.id, "0001");
        assert_eq!(second.id, "0002");
        assert!(mailbox.root().join("0002.json").exists());
    }

    #[test]
    fn test_broadcast_reaches_everyone_direct_reaches_one() {
        let (_dir, mailbox) = mailbox();
        mailbox.send("main", BROADCAST, "all hands").unwrap();
        mailbox.send("main", "a001", "just you").unwrap();

        for recipient in ["a001", "a002", "main"] {
            let bodies: Vec<String> = mailbox
                .read_since(recipient, None)
                .into_iter()
                .map(|m| m.body)
                .collect();
            assert!(bodies.contains(&"all hands".to_string()), "{}", recipient);
            assert_eq!(bodies.contains(&"just you".to_string()), recipient == "a001");
        }
    }

    #[test]
    fn test_watermark_is_strict() {
        let (_dir, mailbox) = mailbox();
        let first = mailbox.send("a001", "main", "one").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        mailbox.send("a001", "main", "two").unwrap();

        let newer = mailbox.read_since("main", Some(&first.timestamp));
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].body, "two");
    }

    #[test]
    fn test_missing_dir_and_malformed_files() {
        let (_dir, mailbox) = mailbox();
        assert!(mailbox.read_all_since(None).is_empty());

        mailbox.send("main", "a001", "ok").unwrap();
        fs::write(mailbox.root().join("0002.json"), "{oops").unwrap();
        fs::write(mailbox.root().join("notes.txt"), "ignored").unwrap();

        let all = mailbox.read_all_since(None);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].body, "ok");
    }

    #[test]
    fn test_concurrent_readers_never_see_partial_messages() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let (_dir, mailbox) = mailbox();
        fs::create_dir_all(mailbox.root()).unwrap();
        let sending = AtomicBool::new(true);

        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                while sending.load(Ordering::SeqCst) {
                    for entry in fs::read_dir(mailbox.root()).unwrap().flatten() {
                        let name = entry.file_name().to_string_lossy().into_owned();
                        if name.starts_with('.') {
                            continue;
                        }
                        let text = fs::read_to_string(entry.path()).unwrap();
                        let message: MqMessage = serde_json::from_str(&text)
                            .unwrap_or_else(|e| panic!("{} unreadable: {}", name, e));
                        assert_eq!(format!("{}.json", message.id), name);
                    }
                }
            });

            let senders: Vec<_> = (0..4)
                .map(|n| {
                    let mailbox = mailbox.clone();
                    scope.spawn(move || {
                        for i in 0..10 {
                            mailbox.send(&format!("a00{}", n), BROADCAST, &format!("m{}", i)).unwrap();
                        }
                    })
                })
                .collect();
            for sender in senders {
                sender.join().unwrap();
            }
            sending.store(false, Ordering::SeqCst);
            reader.join().unwrap();
        });

        assert_eq!(mailbox.read_all_since(None).len(), 40);
    }

    #[test]
    fn test_reading_never_mutates() {
        let (_dir, mailbox) = mailbox();
        mailbox.send("main", "a001", "keep me").unwrap();
        let before = mailbox.read_all_since(None);
        let _ = mailbox.read_since("a001", None);
        assert_eq!(mailbox.read_all_since(None), before);
    }
}
