//! Error types for session memory management

use thiserror::Error;

use crate::context::summarizer::SummarizerError;
use crate::context::token_budget::BudgetError;
use crate::llm::CompletionError;
use crate::storage::StoreError;

/// Result type alias
pub type Result<T> = std::result::Result<T, ContextError>;

/// Crate-wide error taxonomy
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    /// A structured result did not match the expected shape
    #[error("Validation failure: {0}")]
    Validation(String),

    /// Reading or writing session state failed
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// The completion capability could not be reached
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<CompletionError> for ContextError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Malformed(msg) => ContextError::Validation(msg),
            other => ContextError::CapabilityUnavailable(other.to_string()),
        }
    }
}

impl From<SummarizerError> for ContextError {
    fn from(err: SummarizerError) -> Self {
        match err {
            SummarizerError::InvalidSummary(msg) => ContextError::Validation(msg),
            SummarizerError::Completion(inner) => inner.into(),
        }
    }
}

impl From<StoreError> for ContextError {
    fn from(err: StoreError) -> Self {
        ContextError::Persistence(err.to_string())
    }
}

impl From<BudgetError> for ContextError {
    fn from(err: BudgetError) -> Self {
        ContextError::Configuration(err.to_string())
    }
}
