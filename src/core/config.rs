//! Configuration management for Convoy
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/convoy/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::{ConvoyError, Result};

/// Main configuration for Convoy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model endpoint configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Conversation loop configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// Multi-agent coordination configuration
    #[serde(default)]
    pub swarm: SwarmConfig,
}

/// Streaming chat-completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (e.g. http://localhost:1234/v1)
    pub base_url: String,
    /// Model name sent with every request
    pub model: String,
    /// Bearer token, if the endpoint needs one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Token budget sent with each request; also the context-utilization maximum
    pub max_tokens: u32,
    /// Abort the stream when no bytes arrive for this long
    pub read_timeout_secs: u64,
    /// Route `<think>...</think>` spans in the content channel to reasoning
    #[serde(default)]
    pub inline_think: bool,
}

/// Conversation loop behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Round ceiling for the interactive coordinator
    pub max_iterations: usize,
    /// Round ceiling for one-off `--prompt` runs
    pub single_shot_max_iterations: usize,
    /// Round ceiling for sub-agent workers
    pub sub_agent_max_iterations: usize,
    /// Whether to show debug output
    pub debug: bool,
    /// System prompt override for the coordinator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Shared-filesystem coordination
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Root of agents/, mq/ and tasks/
    pub state_dir: PathBuf,
    /// Heartbeat poll interval
    pub heartbeat_interval_secs: u64,
    /// Command used to launch a worker; the prompt is appended as the last argument.
    /// Defaults to this executable with the `worker` subcommand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_command: Option<Vec<String>>,
}

fn parse_flag(value: &str) -> bool {
    value == "true" || value == "1"
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            model: "zai-org/glm-4.7-flash".to_string(),
            api_key: None,
            max_tokens: 202_752,
            read_timeout_secs: 120,
            inline_think: false,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            single_shot_max_iterations: 25,
            sub_agent_max_iterations: 50,
            debug: false,
            system_prompt: None,
        }
    }
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".convoy"),
            heartbeat_interval_secs: 5,
            worker_command: None,
        }
    }
}

impl LlmConfig {
    /// Per-read stream timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Full URL of the chat-completions route
    pub fn chat_url(&self) -> Result<url::Url> {
        let base = format!("{}/", self.base_url.trim_end_matches('/'));
        url::Url::parse(&base)
            .and_then(|u| u.join("chat/completions"))
            .map_err(|e| ConvoyError::config(format!("Invalid base_url '{}': {}", self.base_url, e)))
    }
}

impl SwarmConfig {
    /// Heartbeat poll interval
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("convoy")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = match Self::load_from_file() {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!(error = %e, "using default configuration");
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    /// Override fields from `CONVOY_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| env::var(key).ok());
    }

    /// Override fields from `CONVOY_*` variables looked up through `var`.
    ///
    /// Unparseable numbers are ignored.
    pub fn apply_env_with(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("CONVOY_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = var("CONVOY_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = var("CONVOY_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = var("CONVOY_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.llm.max_tokens = v;
        }
        if let Some(v) = var("CONVOY_READ_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.llm.read_timeout_secs = v;
        }
        if let Some(v) = var("CONVOY_INLINE_THINK") {
            self.llm.inline_think = parse_flag(&v);
        }
        if let Some(v) = var("CONVOY_DEBUG") {
            self.agent.debug = parse_flag(&v);
        }
        if let Some(v) = var("CONVOY_STATE_DIR") {
            self.swarm.state_dir = PathBuf::from(v);
        }
        if let Some(v) = var("CONVOY_HEARTBEAT_SECS").and_then(|v| v.parse().ok()) {
            self.swarm.heartbeat_interval_secs = v;
        }
    }

    /// Variables that make a worker's `load()` resolve the same endpoint settings,
    /// including CLI overrides applied to this configuration
    pub fn worker_env(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            ("CONVOY_BASE_URL", self.llm.base_url.clone()),
            ("CONVOY_MODEL", self.llm.model.clone()),
            ("CONVOY_MAX_TOKENS", self.llm.max_tokens.to_string()),
            ("CONVOY_READ_TIMEOUT_SECS", self.llm.read_timeout_secs.to_string()),
            ("CONVOY_INLINE_THINK", self.llm.inline_think.to_string()),
            ("CONVOY_DEBUG", self.agent.debug.to_string()),
        ];
        if let Some(key) = &self.llm.api_key {
            vars.push(("CONVOY_API_KEY", key.clone()));
        }
        vars
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(ConvoyError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| ConvoyError::config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ConvoyError::config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file and return the path
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        fs::create_dir_all(&config_dir)
            .map_err(|e| ConvoyError::config(format!("Failed to create config dir: {}", e)))?;

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConvoyError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| ConvoyError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}
