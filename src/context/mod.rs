//! Conversation state and the context presented to the responder
//!
//! Full message history is kept verbatim. What shrinks under the token
//! budget is the context built from it: one structured summary of the most
//! recent segment plus a window of recent messages.

pub mod assembler;
pub mod models;
pub mod summarizer;
pub mod token_budget;
pub mod token_estimator;

pub use assembler::{ContextAssembler, ResponseContext};
pub use models::{
    ClarificationState, ConversationState, Message, MessageRange, QueryUnderstanding, Role,
    SessionSummary, UserProfile,
};
pub use summarizer::{LlmSummarizer, Summarizer, SummarizerError};
pub use token_budget::{BudgetError, TokenBudgetManager};
pub use token_estimator::{estimate_messages, CharRatioEstimator, TiktokenEstimator, TokenEstimator};
