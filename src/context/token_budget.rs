//! Token budget accounting for summarization triggering
//!
//! The effective size of a conversation is what a responder would have to
//! carry: the active summary (if any) plus every message after the range it
//! covers. Summarization triggers when that size exceeds the threshold.

use super::models::{ConversationState, MessageRange};
use super::token_estimator::{estimate_messages, TokenEstimator};
use std::sync::Arc;
use thiserror::Error;

/// Token budget errors
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(String),
}

/// Token budget manager
#[derive(Clone)]
pub struct TokenBudgetManager {
    threshold: usize,
    message_overhead: usize,
    estimator: Arc<dyn TokenEstimator>,
}

impl TokenBudgetManager {
    /// Create a new token budget manager
    pub fn new(
        threshold: usize,
        message_overhead: usize,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Result<Self, BudgetError> {
        if threshold == 0 {
            return Err(BudgetError::ConfigurationInvalid(
                "token threshold must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            threshold,
            message_overhead,
            estimator,
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Effective token count of the state as presented to the responder
    pub fn effective_tokens(&self, state: &ConversationState) -> usize {
        let summary_tokens = state
            .current_summary
            .as_ref()
            .map(|summary| self.estimator.estimate(&summary.render()))
            .unwrap_or(0);

        summary_tokens
            + estimate_messages(
                self.estimator.as_ref(),
                state.unsummarized(),
                self.message_overhead,
            )
    }

    /// Recompute and store `total_tokens`, returning the new value
    pub fn refresh(&self, state: &mut ConversationState) -> usize {
        state.total_tokens = self.effective_tokens(state);
        state.total_tokens
    }

    /// Whether `tokens` is over the summarization threshold
    pub fn exceeds(&self, tokens: usize) -> bool {
        tokens > self.threshold
    }

    /// The most recent segment not covered by the current summary
    pub fn unsummarized_range(&self, state: &ConversationState) -> Option<MessageRange> {
        if state.is_empty() {
            return None;
        }

        let from = state
            .current_summary
            .as_ref()
            .map(|summary| summary.message_range_summarized.to + 1)
            .unwrap_or(0);
        let to = state.len() - 1;

        if from > to {
            return None;
        }
        Some(MessageRange::new(from, to))
    }
}
