//! Sub-agent lifecycle manager
//!
//! Spawns worker processes, records their metadata, and folds their exit into the
//! persisted record in the background. Status queries always read from disk, so a
//! restarted coordinator sees the same view.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::core::config::{Config, SwarmConfig};
use crate::core::{now_timestamp, ConvoyError, Result};
use crate::swarm::store::{AgentRecord, AgentResult, AgentStatus, AgentStore};
use crate::swarm::{AGENT_CONTEXT_ENV, AGENT_ID_ENV, STATE_DIR_ENV};

/// How to launch a worker; the prompt is appended as the last argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// This executable's `worker` subcommand
    pub fn current_exe() -> Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: vec!["worker".to_string()],
        })
    }

    /// Explicit argv; the first element is the program
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ConvoyError::config("worker_command must not be empty"))?;
        Ok(Self {
            program: PathBuf::from(program),
            args: args.to_vec(),
        })
    }

    /// Configured override, else this executable
    pub fn from_config(config: &SwarmConfig) -> Result<Self> {
        match &config.worker_command {
            Some(argv) => Self::from_argv(argv),
            None => Self::current_exe(),
        }
    }
}

/// Merged view of one agent for `get_agent_result`
#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub meta: AgentRecord,
    pub result: Option<AgentResult>,
    pub output_log: Vec<serde_json::Value>,
}

/// Spawns and tracks sub-agent processes
#[derive(Debug, Clone)]
pub struct AgentManager {
    store: AgentStore,
    state_dir: PathBuf,
    command: WorkerCommand,
    worker_env: Vec<(String, String)>,
}

impl AgentManager {
    /// Create a manager over `state_dir`
    pub fn new(state_dir: impl AsRef<Path>, command: WorkerCommand) -> Self {
        let state_dir = state_dir.as_ref().to_path_buf();
        Self {
            store: AgentStore::new(&state_dir),
            state_dir,
            command,
            worker_env: Vec::new(),
        }
    }

    /// Extra environment for every worker launched by this manager
    pub fn with_env<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.worker_env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Create a manager whose workers inherit this configuration's endpoint settings
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(
            Self::new(&config.swarm.state_dir, WorkerCommand::from_config(&config.swarm)?)
                .with_env(config.worker_env()),
        )
    }

    pub fn store(&self) -> &AgentStore {
        &self.store
    }

    /// Start a worker and return its `running` record without waiting for it.
    ///
    /// Must be called inside a tokio runtime; the exit observer is a spawned task.
    pub async fn spawn(&self, prompt: &str, context: Option<&str>) -> Result<AgentRecord> {
        let id = self.store.allocate()?;
        let mut record = AgentRecord::running(&id, prompt, context.map(str::to_string));
        self.store.write_record(&record)?;

        let mut command = tokio::process::Command::new(&self.command.program);
        command
            .args(&self.command.args)
            .arg(prompt)
            .envs(self.worker_env.iter().map(|(k, v)| (k, v)))
            .env(AGENT_ID_ENV, &id)
            .env(STATE_DIR_ENV, &self.state_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        match context {
            Some(context) => command.env(AGENT_CONTEXT_ENV, context),
            None => command.env_remove(AGENT_CONTEXT_ENV),
        };

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                record.status = AgentStatus::Error;
                record.finished_at = Some(now_timestamp());
                if let Err(write_err) = self.store.write_record(&record) {
                    tracing::debug!(agent = %id, error = %write_err, "could not record spawn failure");
                }
                return Err(ConvoyError::tool(format!(
                    "Failed to spawn agent {}: {}",
                    id, e
                )));
            }
        };

        record.pid = child.id();
        match self.store.read_record(&id) {
            Ok(mut current) if current.status == AgentStatus::Running => {
                current.pid = record.pid;
                self.store.write_record(&current)?;
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(agent = %id, error = %e, "could not record pid"),
        }

        tracing::info!(agent = %id, pid = ?record.pid, "spawned sub-agent");

        let store = self.store.clone();
        let agent_id = id.clone();
        tokio::spawn(async move {
            let exit_code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!(agent = %agent_id, error = %e, "failed waiting on sub-agent");
                    None
                }
            };
            match store.reconcile_exit(&agent_id, exit_code) {
                Ok(status) => {
                    tracing::debug!(agent = %agent_id, exit_code = ?exit_code, status = %status, "sub-agent exited")
                }
                Err(e) => {
                    tracing::debug!(agent = %agent_id, error = %e, "could not reconcile sub-agent exit")
                }
            }
        });

        Ok(record)
    }

    /// Current persisted record of one agent
    pub fn check(&self, id: &str) -> Result<AgentRecord> {
        self.store.read_record(id)
    }

    /// Every readable record in id order
    pub fn list_all(&self) -> Vec<AgentRecord> {
        self.store.list()
    }

    /// Metadata, result (once terminal) and replayable event log
    pub fn get_result(&self, id: &str) -> Result<AgentReport> {
        let meta = self.store.read_record(id)?;
        Ok(AgentReport {
            meta,
            result: self.store.read_result(id),
            output_log: self.store.read_output_log(id),
        })
    }
}
