//! Configuration loading and logging setup
//!
//! Sources are layered in this order, later ones winning:
//! built-in defaults, an optional TOML file, then `SESSION_MEMORY__*`
//! environment variables (e.g. `SESSION_MEMORY__MEMORY__TOKEN_THRESHOLD=4000`).

use crate::error::{ContextError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Fixed upper bound on clarifying questions per ambiguous query
pub const MAX_CLARIFYING_QUESTIONS: usize = 3;

const DEFAULT_CONFIG_PATH: &str = "config/session-memory";
const ENV_PREFIX: &str = "SESSION_MEMORY";

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Token budget and context window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Summarization triggers when effective tokens exceed this value
    #[serde(default = "default_token_threshold")]
    pub token_threshold: usize,

    /// Messages handed to the responder alongside the summary
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,

    /// Messages handed to query understanding
    #[serde(default = "default_understanding_window")]
    pub understanding_window: usize,

    /// Upper bound for the augmented context produced by query understanding
    #[serde(default = "default_augmented_context_tokens")]
    pub augmented_context_tokens: usize,

    #[serde(default = "default_max_clarifying_questions")]
    pub max_clarifying_questions: usize,

    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// Fixed per-message cost added on top of the content estimate
    #[serde(default = "default_message_overhead")]
    pub message_overhead_tokens: usize,

    #[serde(default)]
    pub estimator: EstimatorKind,
}

/// Token estimation strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// `chars / chars_per_token`
    #[default]
    CharRatio,
    /// cl100k_base BPE
    Tiktoken,
}

fn default_token_threshold() -> usize {
    3000
}

fn default_recent_window() -> usize {
    8
}

fn default_understanding_window() -> usize {
    10
}

fn default_augmented_context_tokens() -> usize {
    1500
}

fn default_max_clarifying_questions() -> usize {
    MAX_CLARIFYING_QUESTIONS
}

fn default_chars_per_token() -> usize {
    4
}

fn default_message_overhead() -> usize {
    4
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            token_threshold: default_token_threshold(),
            recent_window: default_recent_window(),
            understanding_window: default_understanding_window(),
            augmented_context_tokens: default_augmented_context_tokens(),
            max_clarifying_questions: default_max_clarifying_questions(),
            chars_per_token: default_chars_per_token(),
            message_overhead_tokens: default_message_overhead(),
            estimator: EstimatorKind::default(),
        }
    }
}

/// Structured-completion backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Environment variable holding the API key; unset means no auth header
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_breaker_failures")]
    pub circuit_breaker_failures: usize,

    #[serde(default = "default_breaker_reset")]
    pub circuit_breaker_reset_secs: u64,
}

fn default_llm_endpoint() -> String {
    "http://localhost:11434/v1/chat/completions".to_string()
}

fn default_llm_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_api_key_env() -> String {
    "SESSION_MEMORY_LLM_API_KEY".to_string()
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_temperature() -> f32 {
    0.3
}

fn default_breaker_failures() -> usize {
    5
}

fn default_breaker_reset() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: default_temperature(),
            circuit_breaker_failures: default_breaker_failures(),
            circuit_breaker_reset_secs: default_breaker_reset(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn breaker_reset_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_reset_secs)
    }

    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|key| !key.is_empty())
    }
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: String,
}

fn default_storage_dir() -> String {
    "storage/sessions".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { dir: default_storage_dir() }
    }
}

/// Session registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions untouched for this long are dropped from memory
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: u64,
}

fn default_idle_timeout() -> u64 {
    3600
}

fn default_max_sessions() -> u64 {
    10_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from the default file location and environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from `path` (extension optional) and environment
    pub fn load_from(path: &str) -> Result<Self> {
        // A missing .env is the normal case outside development
        let _ = dotenvy::dotenv();

        let config: Config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX).separator("__"),
            )
            .build()
            .and_then(|raw| raw.try_deserialize())
            .map_err(|e| ContextError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the core cannot operate with
    pub fn validate(&self) -> Result<()> {
        let memory = &self.memory;

        if memory.token_threshold == 0 {
            return Err(ContextError::Configuration(
                "memory.token_threshold must be greater than zero".to_string(),
            ));
        }

        if memory.recent_window == 0 || memory.understanding_window == 0 {
            return Err(ContextError::Configuration(
                "memory windows must hold at least one message".to_string(),
            ));
        }

        if memory.chars_per_token == 0 {
            return Err(ContextError::Configuration(
                "memory.chars_per_token must be greater than zero".to_string(),
            ));
        }

        if memory.max_clarifying_questions != MAX_CLARIFYING_QUESTIONS {
            return Err(ContextError::Configuration(format!(
                "memory.max_clarifying_questions is fixed at {}, got {}",
                MAX_CLARIFYING_QUESTIONS, memory.max_clarifying_questions
            )));
        }

        Ok(())
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
