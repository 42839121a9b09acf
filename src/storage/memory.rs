//! Process-local store

use super::{validate_session_id, SessionStore, StoreError};
use crate::context::models::{ConversationState, SessionSummary};
use async_trait::async_trait;
use dashmap::DashMap;

/// Keeps saved sessions in a concurrent map; nothing survives the process
#[derive(Default)]
pub struct InMemoryStore {
    states: DashMap<String, ConversationState>,
    summaries: DashMap<String, SessionSummary>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last summary artifact written for a session
    pub fn summary(&self, session_id: &str) -> Option<SessionSummary> {
        self.summaries.get(session_id).map(|s| s.value().clone())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn save(
        &self,
        state: &ConversationState,
        summary: Option<&SessionSummary>,
    ) -> Result<(), StoreError> {
        validate_session_id(&state.session_id)?;
        self.states.insert(state.session_id.clone(), state.clone());
        if let Some(summary) = summary {
            self.summaries.insert(state.session_id.clone(), summary.clone());
        }
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.states.get(session_id).map(|s| s.value().clone()))
    }
}
