//! Persistence of conversation state
//!
//! The store holds the durable form of a session. The in-memory state owned
//! by the session manager stays authoritative while the session is live.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::InMemoryStore;

use crate::context::models::{ConversationState, SessionSummary};
use async_trait::async_trait;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid session id: {0}")]
    InvalidId(String),
}

/// Load/save-by-identifier persistence capability
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write the full state and, when present, the summary as a separate artifact
    async fn save(
        &self,
        state: &ConversationState,
        summary: Option<&SessionSummary>,
    ) -> Result<(), StoreError>;

    /// Read a previously saved state; `Ok(None)` when it was never saved
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, StoreError>;
}

/// Session ids double as file names, so only a conservative alphabet is accepted
pub fn validate_session_id(session_id: &str) -> Result<(), StoreError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(session_id.to_string()))
    }
}
