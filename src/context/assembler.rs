//! Responder context assembly
//!
//! The responder never sees raw history. It gets the active summary, a
//! short window of recent turns and the augmented context produced by
//! query understanding.

use super::models::{ConversationState, Message, QueryUnderstanding};
use super::token_estimator::{estimate_messages, TokenEstimator};
use crate::understanding::Language;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Everything handed to response generation for one turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseContext {
    pub query: String,
    pub language: Language,
    pub summary: String,
    pub recent_messages: Vec<Message>,
    pub augmented_context: String,
    pub token_estimate: usize,
}

impl ResponseContext {
    /// Payload for the `response_generation` task
    pub fn to_payload(&self) -> Value {
        let recent: Vec<Value> = self
            .recent_messages
            .iter()
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();

        json!({
            "query": self.query,
            "language": self.language.name(),
            "summary": self.summary,
            "recent_messages": recent,
            "augmented_context": self.augmented_context,
        })
    }
}

/// Builds [`ResponseContext`] values from conversation state
pub struct ContextAssembler {
    recent_window: usize,
    message_overhead: usize,
    estimator: Arc<dyn TokenEstimator>,
}

impl ContextAssembler {
    pub fn new(recent_window: usize, message_overhead: usize, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            recent_window,
            message_overhead,
            estimator,
        }
    }

    /// Assemble context for answering `query`
    ///
    /// The last message of `state` is the user turn being answered and is
    /// carried by `query` instead of the recent window.
    pub fn assemble(
        &self,
        state: &ConversationState,
        query: &str,
        understanding: &QueryUnderstanding,
    ) -> ResponseContext {
        let history = &state.messages()[..state.len().saturating_sub(1)];
        let start = history.len().saturating_sub(self.recent_window);
        let recent_messages = history[start..].to_vec();

        let summary = state
            .current_summary
            .as_ref()
            .map(|s| s.render())
            .unwrap_or_default();

        let token_estimate = self.estimator.estimate(query)
            + self.estimator.estimate(&summary)
            + self.estimator.estimate(&understanding.final_augmented_context)
            + estimate_messages(self.estimator.as_ref(), &recent_messages, self.message_overhead);

        debug!(
            "Assembled response context: recent={}, summary={}, tokens={}",
            recent_messages.len(),
            !summary.is_empty(),
            token_estimate
        );

        ResponseContext {
            query: query.to_string(),
            language: Language::detect(query),
            summary,
            recent_messages,
            augmented_context: understanding.final_augmented_context.clone(),
            token_estimate,
        }
    }
}
