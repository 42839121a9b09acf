//! Session memory for multi-turn conversational agents
//!
//! Keeps the full message history of each session, compresses what the
//! responder sees into a structured summary once a token budget is exceeded,
//! and intercepts ambiguous queries with clarifying questions before a reply
//! is generated.

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod session;
pub mod storage;
pub mod understanding;

pub use config::Config;
pub use error::{ContextError, Result};
pub use session::{SessionManager, TurnOutcome, TurnReport};
