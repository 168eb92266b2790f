//! Persisted agent records
//!
//! Layout under `<state_dir>/agents/<id>/`:
//! - `meta.json`: the [`AgentRecord`], rewritten on every status transition
//! - `output.jsonl`: append-only event log written by the worker
//! - `result.json`: the [`AgentResult`], written once by the worker

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::{now_timestamp, ConvoyError, Result};
use crate::swarm::ids::{self, AGENT_PREFIX, AGENT_WIDTH};

const META_FILE: &str = "meta.json";
const RESULT_FILE: &str = "result.json";
const OUTPUT_FILE: &str = "output.jsonl";

/// Lifecycle status of a sub-agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Running,
    Completed,
    Error,
}

impl AgentStatus {
    /// Whether the agent has finished, successfully or not
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Status implied by a process exit code
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Self::Completed,
            _ => Self::Error,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Metadata of one spawned agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl AgentRecord {
    /// Fresh `running` record
    pub fn running(id: impl Into<String>, prompt: impl Into<String>, context: Option<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            context,
            status: AgentStatus::Running,
            pid: None,
            started_at: now_timestamp(),
            finished_at: None,
            exit_code: None,
        }
    }

    /// First 100 characters of the prompt
    pub fn prompt_preview(&self) -> String {
        preview(&self.prompt, 100)
    }
}

/// Final report of a worker, written once at the end of its loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps_count: usize,
    pub tokens_used: u32,
    pub started_at: String,
    pub finished_at: String,
}

/// First `max_chars` characters of `text`
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Read and deserialize a JSON file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Pretty-print `value` to `path` through a temp file and rename, so readers never
/// observe a half-written document.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| ConvoyError::storage(format!("Path {} has no file name", path.display())))?;
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_path = path.with_file_name(format!(
        ".{}.tmp-{}-{nonce}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    let data = serde_json::to_vec_pretty(value)?;
    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        temp_file.write_all(&data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    Ok(())
}

/// File-backed store of agent records
#[derive(Debug, Clone)]
pub struct AgentStore {
    root: PathBuf,
}

impl AgentStore {
    /// Store rooted at `<state_dir>/agents`
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            root: state_dir.as_ref().join("agents"),
        }
    }

    /// Directory holding all agent subdirectories
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one agent
    pub fn agent_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Claim a fresh agent id and its directory
    pub fn allocate(&self) -> Result<String> {
        let (id, _) = ids::allocate_dir(&self.root, AGENT_PREFIX, AGENT_WIDTH)?;
        Ok(id)
    }

    /// Read an agent's metadata
    pub fn read_record(&self, id: &str) -> Result<AgentRecord> {
        let path = self.agent_dir(id).join(META_FILE);
        if !path.exists() {
            return Err(ConvoyError::not_found(format!("agent {}", id)));
        }
        read_json(&path)
    }

    /// Persist an agent's metadata
    pub fn write_record(&self, record: &AgentRecord) -> Result<()> {
        write_json_atomic(&self.agent_dir(&record.id).join(META_FILE), record)
    }

    /// All readable records in id order; unreadable entries are skipped
    pub fn list(&self) -> Vec<AgentRecord> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        names
            .iter()
            .filter_map(|name| match self.read_record(name) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::debug!(agent = %name, error = %e, "skipping unreadable agent record");
                    None
                }
            })
            .collect()
    }

    /// Final result, if the worker has written one
    pub fn read_result(&self, id: &str) -> Option<AgentResult> {
        read_json(&self.agent_dir(id).join(RESULT_FILE)).ok()
    }

    /// Persist a worker's final result
    pub fn write_result(&self, result: &AgentResult) -> Result<()> {
        write_json_atomic(&self.agent_dir(&result.agent_id).join(RESULT_FILE), result)
    }

    /// Append one record to an agent's event log
    pub fn append_output(&self, id: &str, record: &serde_json::Value) -> Result<()> {
        let dir = self.agent_dir(id);
        fs::create_dir_all(&dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(OUTPUT_FILE))?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Replay an agent's event log; malformed lines are skipped
    pub fn read_output_log(&self, id: &str) -> Vec<serde_json::Value> {
        let Ok(content) = fs::read_to_string(self.agent_dir(id).join(OUTPUT_FILE)) else {
            return Vec::new();
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Self-reported terminal status from the worker itself
    pub fn mark_terminal(&self, id: &str, status: AgentStatus, finished_at: &str) -> Result<()> {
        let mut record = self.read_record(id)?;
        record.status = status;
        record.finished_at = Some(finished_at.to_string());
        self.write_record(&record)
    }

    /// Fold a process exit into the record.
    ///
    /// A record still `running` becomes `completed` on exit code 0 and `error` otherwise.
    /// A record the worker already finalized keeps its status; the exit code is stored
    /// next to it and a disagreement is logged.
    pub fn reconcile_exit(&self, id: &str, exit_code: Option<i32>) -> Result<AgentStatus> {
        let mut record = self.read_record(id)?;
        let observed = AgentStatus::from_exit_code(exit_code);
        record.exit_code = exit_code;

        if record.status == AgentStatus::Running {
            record.status = observed;
            record.finished_at = Some(now_timestamp());
        } else if record.status != observed {
            tracing::warn!(
                agent = %id,
                reported = %record.status,
                exit_code = ?exit_code,
                "agent's self-reported status disagrees with its exit code"
            );
        }

        self.write_record(&record)?;
        Ok(record.status)
    }
}
