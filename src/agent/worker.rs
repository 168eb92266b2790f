//! Sub-agent worker runtime
//!
//! What a spawned worker process does: run one loop over its task with the restricted
//! tool set, log every event to `output.jsonl`, then write `result.json` and mark its
//! own record terminal.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::agent::events::{AgentEvent, EventSink};
use crate::agent::prompts::{compose_task, sub_agent_prompt};
use crate::agent::session::{RunStatus, Session};
use crate::core::{now_timestamp, ConvoyError, Result};
use crate::llm::LlmProvider;
use crate::swarm::{AgentIdentity, AgentResult, AgentStatus, AgentStore, AGENT_CONTEXT_ENV, AGENT_ID_ENV, STATE_DIR_ENV};
use crate::tools::{ToolContext, ToolRegistry};

/// Longest tool result kept in the event log
const LOGGED_RESULT_CHARS: usize = 2000;

/// Everything a worker needs to know about its assignment
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub agent_id: String,
    pub prompt: String,
    pub context: Option<String>,
    pub state_dir: PathBuf,
    pub max_iterations: usize,
}

impl WorkerSpec {
    /// Read identity, context and state directory from the environment set by the manager.
    ///
    /// `default_state_dir` applies when the manager did not pass one.
    pub fn from_env(prompt: String, default_state_dir: &Path, max_iterations: usize) -> Result<Self> {
        let agent_id = std::env::var(AGENT_ID_ENV)
            .map_err(|_| ConvoyError::config(format!("{} env var is required", AGENT_ID_ENV)))?;
        if prompt.trim().is_empty() {
            return Err(ConvoyError::config("worker needs a prompt"));
        }
        let state_dir = std::env::var_os(STATE_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_state_dir.to_path_buf());

        Ok(Self {
            agent_id,
            prompt,
            context: std::env::var(AGENT_CONTEXT_ENV).ok().filter(|c| !c.is_empty()),
            state_dir,
            max_iterations,
        })
    }
}

/// Event sink that appends a timestamped JSON line per event and keeps counters
pub struct WorkerLog {
    store: AgentStore,
    agent_id: String,
    steps: AtomicUsize,
    tokens: AtomicU32,
}

impl WorkerLog {
    pub fn new(store: AgentStore, agent_id: impl Into<String>) -> Self {
        Self {
            store,
            agent_id: agent_id.into(),
            steps: AtomicUsize::new(0),
            tokens: AtomicU32::new(0),
        }
    }

    /// Rounds started so far
    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::Relaxed)
    }

    /// Latest reported token total
    pub fn tokens(&self) -> u32 {
        self.tokens.load(Ordering::Relaxed)
    }

    fn record(event: &AgentEvent) -> Option<Value> {
        let mut value = match event {
            AgentEvent::IterationStart { .. }
            | AgentEvent::ContextUpdate { .. }
            | AgentEvent::ToolCallDetected { .. } => return None,
            AgentEvent::ToolResult { name, result } => serde_json::to_value(AgentEvent::ToolResult {
                name: name.clone(),
                result: result.chars().take(LOGGED_RESULT_CHARS).collect(),
            }),
            other => serde_json::to_value(other),
        }
        .ok()?;
        value
            .as_object_mut()?
            .insert("timestamp".to_string(), Value::String(now_timestamp()));
        Some(value)
    }
}

impl EventSink for WorkerLog {
    fn emit(&self, event: AgentEvent) {
        match &event {
            AgentEvent::IterationStart { iteration } => self.steps.store(*iteration, Ordering::Relaxed),
            AgentEvent::ContextUpdate { tokens_used, .. } => {
                self.tokens.store(*tokens_used, Ordering::Relaxed)
            }
            _ => {}
        }

        if let Some(line) = Self::record(&event) {
            if let Err(e) = self.store.append_output(&self.agent_id, &line) {
                tracing::debug!(agent = %self.agent_id, error = %e, "could not append to event log");
            }
        }
    }
}

/// Run a worker to completion and persist its result.
///
/// The returned result carries `error` status when the loop failed; the process
/// should then exit non-zero.
pub async fn run_worker(provider: Arc<dyn LlmProvider>, spec: &WorkerSpec) -> Result<AgentResult> {
    let started_at = now_timestamp();
    let store = AgentStore::new(&spec.state_dir);
    std::fs::create_dir_all(store.agent_dir(&spec.agent_id))?;

    let ctx = ToolContext::new(AgentIdentity::agent(&spec.agent_id), &spec.state_dir);
    let tools = Arc::new(ToolRegistry::for_sub_agent(&ctx));
    let mut session = Session::new(
        provider,
        tools,
        sub_agent_prompt(&spec.agent_id),
        spec.max_iterations,
    );

    let log = WorkerLog::new(store.clone(), &spec.agent_id);
    let task = compose_task(&spec.prompt, spec.context.as_deref());
    tracing::info!(agent = %spec.agent_id, "worker starting");
    let outcome = session.run(&task, &log).await;

    let finished_at = now_timestamp();
    let (status, final_response, error) = match outcome.status {
        RunStatus::Completed | RunStatus::IterationLimit => (
            AgentStatus::Completed,
            Some(
                session
                    .conversation()
                    .last_assistant_text()
                    .unwrap_or_default()
                    .to_string(),
            ),
            None,
        ),
        RunStatus::Failed(message) => (AgentStatus::Error, None, Some(message)),
    };

    let result = AgentResult {
        agent_id: spec.agent_id.clone(),
        status,
        final_response,
        error,
        steps_count: log.steps(),
        tokens_used: log.tokens(),
        started_at,
        finished_at: finished_at.clone(),
    };
    store.write_result(&result)?;

    if let Err(e) = store.mark_terminal(&spec.agent_id, status, &finished_at) {
        tracing::debug!(agent = %spec.agent_id, error = %e, "could not update own record");
    }
    tracing::info!(agent = %spec.agent_id, status = %status, steps = result.steps_count, "worker finished");

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Message, ToolCall, ToolDefinition};
    use crate::llm::{DeltaCallback, LlmResponse, StreamDelta, TokenUsage};
    use crate::swarm::AgentRecord;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted(Mutex<Vec<Result<LlmResponse>>>);

    #[async_trait]
    impl LlmProvider for Scripted {
        async fn chat_stream(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            on_delta: DeltaCallback<'_>,
        ) -> Result<LlmResponse> {
            let next = self.0.lock().unwrap().remove(0);
            if let Ok(response) = &next {
                on_delta(StreamDelta::Reasoning("hmm".into()));
                on_delta(StreamDelta::Content(response.content.clone()));
            }
            next
        }

        fn model(&self) -> &str {
            "scripted"
        }

        fn max_tokens(&self) -> u32 {
            100
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn spec(dir: &Path) -> WorkerSpec {
        let store = AgentStore::new(dir);
        let id = store.allocate().unwrap();
        store
            .write_record(&AgentRecord::running(&id, "write a note", None))
            .unwrap();
        WorkerSpec {
            agent_id: id,
            prompt: "write a note".into(),
            context: None,
            state_dir: dir.to_path_buf(),
            max_iterations: 5,
        }
    }

    #[tokio::test]
    async fn test_worker_writes_result_log_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(dir.path());
        let note = dir.path().join("note.txt");

        let mut first = LlmResponse::with_tools(
            "scripted",
            "",
            vec![ToolCall::new(
                "call_0",
                "write_file",
                serde_json::json!({"path": note, "content": "hi"}).to_string(),
            )],
        );
        first.usage = Some(TokenUsage {
            total_tokens: 40,
            ..Default::default()
        });
        let provider = Arc::new(Scripted(Mutex::new(vec![
            Ok(first),
            Ok(LlmResponse::text("scripted", "Wrote the note.")),
        ])));

        let result = run_worker(provider, &spec).await.unwrap();
        assert_eq!(result.status, AgentStatus::Completed);
        assert_eq!(result.final_response.as_deref(), Some("Wrote the note."));
        assert_eq!(result.steps_count, 2);
        assert_eq!(result.tokens_used, 40);
        assert_eq!(std::fs::read_to_string(&note).unwrap(), "hi");

        let store = AgentStore::new(dir.path());
        assert_eq!(store.read_result(&spec.agent_id), Some(result));
        let record = store.read_record(&spec.agent_id).unwrap();
        assert_eq!(record.status, AgentStatus::Completed);
        assert!(record.finished_at.is_some());

        let log = store.read_output_log(&spec.agent_id);
        let kinds: Vec<&str> = log.iter().filter_map(|l| l["type"].as_str()).collect();
        assert_eq!(
            kinds,
            vec!["reasoning", "content", "tool_call_start", "tool_call", "reasoning", "content", "done"]
        );
        assert!(log.iter().all(|l| l["timestamp"].is_string()));
    }

    #[tokio::test]
    async fn test_failed_loop_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(dir.path());
        let provider = Arc::new(Scripted(Mutex::new(vec![Err(ConvoyError::transport(
            "refused",
        ))])));

        let result = run_worker(provider, &spec).await.unwrap();
        assert_eq!(result.status, AgentStatus::Error);
        assert!(result.error.unwrap().contains("refused"));

        let store = AgentStore::new(dir.path());
        assert_eq!(
            store.read_record(&spec.agent_id).unwrap().status,
            AgentStatus::Error
        );
        assert_eq!(store.read_output_log(&spec.agent_id)[0]["type"], "error");
    }

    #[test]
    fn test_logged_results_are_truncated() {
        let line = WorkerLog::record(&AgentEvent::ToolResult {
            name: "read_file".into(),
            result: "x".repeat(5000),
        })
        .unwrap();
        assert_eq!(line["type"], "tool_call");
        assert_eq!(line["result"].as_str().unwrap().len(), LOGGED_RESULT_CHARS);
    }
}
