//! Structured summarization of conversation segments

use super::models::{Message, MessageRange, SessionSummary, UserProfile};
use crate::llm::{json::string_list, CompletionError, CompletionProvider, TaskKind};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

const SUMMARY_KEYS: [&str; 5] = ["user_profile", "key_facts", "decisions", "open_questions", "todos"];

/// Summarizer trait for different summarization strategies
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `messages[range]` into a fresh summary covering exactly `range`
    async fn summarize(
        &self,
        messages: &[Message],
        range: MessageRange,
    ) -> Result<SessionSummary, SummarizerError>;
}

/// Summarizer errors
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    /// The backend result did not have the summary shape
    #[error("Invalid summary: {0}")]
    InvalidSummary(String),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Summarizer backed by the structured-completion capability
pub struct LlmSummarizer {
    provider: Arc<dyn CompletionProvider>,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    /// `[index] role: content` lines with absolute message indices
    fn format_segment(messages: &[Message], range: MessageRange) -> String {
        messages
            .iter()
            .enumerate()
            .skip(range.from)
            .take(range.len())
            .map(|(i, m)| format!("[{}] {}", i, m.transcript_line()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        messages: &[Message],
        range: MessageRange,
    ) -> Result<SessionSummary, SummarizerError> {
        if range.is_empty() || range.to >= messages.len() {
            return Err(SummarizerError::InvalidSummary(format!(
                "range {}..={} is outside {} messages",
                range.from,
                range.to,
                messages.len()
            )));
        }

        debug!("Summarizing messages {}..={}", range.from, range.to);

        let payload = json!({
            "conversation": Self::format_segment(messages, range),
            "range": range,
        });

        let result = self.provider.complete(TaskKind::Summarization, &payload).await?;
        parse_summary(&result, range)
    }
}

/// Validate a backend result against the summary shape
pub fn parse_summary(value: &Value, range: MessageRange) -> Result<SessionSummary, SummarizerError> {
    let object = value
        .as_object()
        .ok_or_else(|| SummarizerError::InvalidSummary("result is not a JSON object".to_string()))?;

    if !SUMMARY_KEYS.iter().any(|key| object.contains_key(*key)) {
        return Err(SummarizerError::InvalidSummary(
            "result has none of the summary fields".to_string(),
        ));
    }

    let list = |field: &str| string_list(object.get(field), field).map_err(SummarizerError::InvalidSummary);

    let user_profile = match object.get("user_profile") {
        None | Some(Value::Null) => UserProfile::default(),
        Some(Value::Object(profile)) => {
            let profile_list = |field: &str| {
                string_list(profile.get(field), field)
                    .map(dedup)
                    .map_err(SummarizerError::InvalidSummary)
            };
            UserProfile {
                preferences: profile_list("preferences")?,
                constraints: profile_list("constraints")?,
                interests: profile_list("interests")?,
            }
        }
        Some(other) => {
            return Err(SummarizerError::InvalidSummary(format!(
                "user_profile must be an object, got {}",
                other
            )))
        }
    };

    Ok(SessionSummary {
        user_profile,
        key_facts: list("key_facts")?,
        decisions: list("decisions")?,
        open_questions: list("open_questions")?,
        todos: list("todos")?,
        message_range_summarized: range,
    })
}

/// Drop repeated entries, keeping first occurrences in order
fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}
