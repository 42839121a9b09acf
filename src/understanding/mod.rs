//! Query understanding: language detection, ambiguity analysis and
//! clarification prompts

pub mod clarification;
pub mod engine;
pub mod language;

pub use clarification::render_clarification_prompt;
pub use engine::{combine_clarification, QueryUnderstandingEngine};
pub use language::Language;
