//! Data models for conversation state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single message in a conversation, immutable once appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// `role: content` form used for estimation and prompts
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.role, self.content)
    }
}

/// Stable user attributes extracted by summarization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub preferences: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

/// Inclusive bounds of a summarized message segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRange {
    pub from: usize,
    pub to: usize,
}

impl MessageRange {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    pub fn len(&self) -> usize {
        (self.to + 1).saturating_sub(self.from)
    }

    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }
}

/// Compressed view of one conversation segment
///
/// A newer summary replaces the previous one; nothing is merged across
/// segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(default)]
    pub user_profile: UserProfile,
    #[serde(default)]
    pub key_facts: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
    #[serde(default)]
    pub todos: Vec<String>,
    pub message_range_summarized: MessageRange,
}

impl SessionSummary {
    /// Human-readable memory block; empty when nothing was extracted
    pub fn render(&self) -> String {
        let sections: [(&str, &Vec<String>); 7] = [
            ("Preferences", &self.user_profile.preferences),
            ("Constraints", &self.user_profile.constraints),
            ("Interests", &self.user_profile.interests),
            ("Key facts", &self.key_facts),
            ("Decisions", &self.decisions),
            ("Open questions", &self.open_questions),
            ("Todos", &self.todos),
        ];

        sections
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(label, values)| format!("{}: {}", label, values.join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Per-turn analysis of a user query; never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryUnderstanding {
    pub original_query: String,
    pub is_ambiguous: bool,
    pub rewritten_query: Option<String>,
    pub needed_context_from_memory: Vec<String>,
    pub clarifying_questions: Vec<String>,
    pub final_augmented_context: String,
    pub confidence_score: f32,
}

impl QueryUnderstanding {
    /// The query the responder should answer
    pub fn effective_query(&self) -> &str {
        self.rewritten_query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(&self.original_query)
    }
}

/// Clarification workflow state, derived from the pending fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationState {
    Idle,
    AwaitingClarification,
}

/// Aggregate root for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: String,
    /// Full history; only ever appended to
    messages: Vec<Message>,
    pub current_summary: Option<SessionSummary>,
    pub total_tokens: usize,
    pub awaiting_clarification: bool,
    pub pending_clarifying_questions: Vec<String>,
    pub pending_original_query: Option<String>,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            current_summary: None,
            total_tokens: 0,
            awaiting_clarification: false,
            pending_clarifying_questions: Vec::new(),
            pending_original_query: None,
        }
    }

    /// Start a session with a freshly generated identifier
    pub fn with_random_id() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message and return its index
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> usize {
        self.messages.push(Message::new(role, content));
        self.messages.len() - 1
    }

    /// The last `n` messages
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Messages not covered by the current summary
    pub fn unsummarized(&self) -> &[Message] {
        match &self.current_summary {
            Some(summary) => {
                let start = (summary.message_range_summarized.to + 1).min(self.messages.len());
                &self.messages[start..]
            }
            None => &self.messages,
        }
    }

    pub fn clarification_state(&self) -> ClarificationState {
        if self.awaiting_clarification {
            ClarificationState::AwaitingClarification
        } else {
            ClarificationState::Idle
        }
    }

    /// Enter the awaiting-clarification state
    ///
    /// An empty question list leaves the state untouched so the flag can
    /// never be set without questions to show.
    pub fn begin_clarification(&mut self, original_query: impl Into<String>, questions: Vec<String>) {
        if questions.is_empty() {
            return;
        }
        self.awaiting_clarification = true;
        self.pending_clarifying_questions = questions;
        self.pending_original_query = Some(original_query.into());
    }

    /// Leave the awaiting-clarification state, returning the pending query
    pub fn resolve_clarification(&mut self) -> Option<String> {
        self.awaiting_clarification = false;
        self.pending_clarifying_questions.clear();
        self.pending_original_query.take()
    }
}
