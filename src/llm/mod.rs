//! Structured-completion capability
//!
//! Semantic work (ambiguity judgement, summary content, replies) is
//! delegated to a backend behind [`CompletionProvider`]. The rest of the
//! crate only validates the shape of what comes back.

pub mod circuit_breaker;
pub mod json;
pub mod openai;
pub mod prompts;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use openai::OpenAiCompatibleProvider;

/// Kind of work requested from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    QueryUnderstanding,
    Summarization,
    ResponseGeneration,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::QueryUnderstanding => "query_understanding",
            TaskKind::Summarization => "summarization",
            TaskKind::ResponseGeneration => "response_generation",
        }
    }

    /// Whether the task expects a JSON object rather than free text
    pub fn is_structured(&self) -> bool {
        !matches!(self, TaskKind::ResponseGeneration)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion errors
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Backend could not be reached or kept failing
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Circuit open for {0}")]
    CircuitOpen(TaskKind),

    /// Backend answered but the result could not be parsed
    #[error("Malformed result: {0}")]
    Malformed(String),
}

/// Backend that completes one task at a time
///
/// Structured tasks return a JSON object; `ResponseGeneration` returns a
/// JSON string holding the reply text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, task: TaskKind, payload: &Value) -> Result<Value, CompletionError>;
}
