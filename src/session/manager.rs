//! Session Manager
//!
//! Drives one inbound turn through the clarification state machine:
//!
//! - `IDLE`: the query is analyzed. An ambiguous query is answered with
//!   clarifying questions and moves the session to `AWAITING_CLARIFICATION`;
//!   anything else goes to the responder.
//! - `AWAITING_CLARIFICATION`: the input is taken as the answer, merged with
//!   the pending query and sent to the responder without a second ambiguity
//!   check.
//!
//! Every append is followed by a token-budget check that may replace the
//! current summary. A turn runs on a copy of the session state and is only
//! committed when it completes, so a failed turn leaves the session as it was.

use super::registry::{SessionEntry, SessionHandle, SessionRegistry};
use crate::config::Config;
use crate::context::assembler::ContextAssembler;
use crate::context::models::{ClarificationState, ConversationState, QueryUnderstanding, Role};
use crate::context::summarizer::{LlmSummarizer, Summarizer};
use crate::context::token_budget::TokenBudgetManager;
use crate::context::token_estimator;
use crate::error::{ContextError, Result};
use crate::llm::{CompletionProvider, TaskKind};
use crate::metrics::METRICS;
use crate::storage::SessionStore;
use crate::understanding::{render_clarification_prompt, Language, QueryUnderstandingEngine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the caller gets back for a turn: a reply or questions, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnOutcome {
    Reply {
        text: String,
    },
    Clarification {
        questions: Vec<String>,
        /// Questions rendered for display in the user's language
        prompt: String,
    },
}

impl TurnOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            TurnOutcome::Reply { .. } => "reply",
            TurnOutcome::Clarification { .. } => "clarification",
        }
    }
}

/// Result of a committed turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReport {
    pub session_id: String,
    #[serde(flatten)]
    pub outcome: TurnOutcome,
    pub total_tokens: usize,
    /// Whether the committed state reached the store
    pub persisted: bool,
    /// Recoverable problems hit during the turn
    pub warnings: Vec<String>,
}

/// Result of appending history without running a turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub index: usize,
    pub total_tokens: usize,
    pub persisted: bool,
    pub warnings: Vec<String>,
}

pub struct SessionManager {
    registry: SessionRegistry,
    store: Arc<dyn SessionStore>,
    responder: Arc<dyn CompletionProvider>,
    summarizer: Arc<dyn Summarizer>,
    engine: QueryUnderstandingEngine,
    budget: TokenBudgetManager,
    assembler: ContextAssembler,
    understanding_window: usize,
}

impl SessionManager {
    /// Wire a manager from configuration
    ///
    /// `provider` serves all three task kinds: query understanding,
    /// summarization and response generation.
    pub fn new(
        config: &Config,
        provider: Arc<dyn CompletionProvider>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        config.validate()?;
        let memory = &config.memory;

        let estimator = token_estimator::from_config(memory)?;
        let budget = TokenBudgetManager::new(
            memory.token_threshold,
            memory.message_overhead_tokens,
            Arc::clone(&estimator),
        )?;

        Ok(Self {
            registry: SessionRegistry::new(&config.session, Arc::clone(&store)),
            store,
            responder: Arc::clone(&provider),
            summarizer: Arc::new(LlmSummarizer::new(Arc::clone(&provider))),
            engine: QueryUnderstandingEngine::new(
                provider,
                Arc::clone(&estimator),
                memory.augmented_context_tokens,
                memory.max_clarifying_questions,
            ),
            budget,
            assembler: ContextAssembler::new(
                memory.recent_window,
                memory.message_overhead_tokens,
                estimator,
            ),
            understanding_window: memory.understanding_window,
        })
    }

    /// Start a session and return its id
    ///
    /// A failed initial write is logged and retried by the next turn or
    /// [`flush`](Self::flush); the session is usable either way.
    pub async fn create_session(&self) -> Result<String> {
        let state = ConversationState::with_random_id();
        let session_id = state.session_id.clone();
        let handle = self.registry.insert(state).await;

        let mut entry = handle.lock().await;
        let mut warnings = Vec::new();
        self.persist(&handle, &mut entry, &mut warnings).await;

        info!("Created session {}", session_id);
        Ok(session_id)
    }

    /// Process one inbound user turn
    pub async fn submit(&self, session_id: &str, text: &str) -> Result<TurnReport> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ContextError::Validation("message must not be empty".to_string()));
        }

        let handle = self.registry.open(session_id).await?;
        let mut entry = handle.lock().await;

        let mut state = entry.state.clone();
        let mut warnings = Vec::new();

        let result = match state.clarification_state() {
            ClarificationState::Idle => self.handle_query(&mut state, text, &mut warnings).await,
            ClarificationState::AwaitingClarification => {
                self.handle_clarification_answer(&mut state, text, &mut warnings).await
            }
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Turn failed for session {}, state unchanged: {}", session_id, e);
                METRICS.record_turn("error");
                return Err(e);
            }
        };

        entry.state = state;
        let persisted = self.persist(&handle, &mut entry, &mut warnings).await;
        METRICS.record_turn(outcome.kind());
        METRICS.record_effective_tokens(entry.state.total_tokens);

        Ok(TurnReport {
            session_id: session_id.to_string(),
            outcome,
            total_tokens: entry.state.total_tokens,
            persisted,
            warnings,
        })
    }

    /// Append a message to the history without understanding or response
    /// generation, e.g. when importing an earlier conversation
    ///
    /// Budget checks and summarization run as for a normal turn.
    pub async fn ingest(&self, session_id: &str, role: Role, text: &str) -> Result<IngestReport> {
        if text.trim().is_empty() {
            return Err(ContextError::Validation("message must not be empty".to_string()));
        }

        let handle = self.registry.open(session_id).await?;
        let mut entry = handle.lock().await;
        if entry.state.awaiting_clarification {
            return Err(ContextError::Validation(
                "session is awaiting a clarification answer".to_string(),
            ));
        }

        let mut state = entry.state.clone();
        let mut warnings = Vec::new();
        let index = state.push(role, text);
        self.after_append(&mut state, &mut warnings).await;

        entry.state = state;
        let persisted = self.persist(&handle, &mut entry, &mut warnings).await;

        Ok(IngestReport {
            index,
            total_tokens: entry.state.total_tokens,
            persisted,
            warnings,
        })
    }

    /// Copy of the current state of a session
    pub async fn snapshot(&self, session_id: &str) -> Result<ConversationState> {
        let handle = self.registry.open(session_id).await?;
        let entry = handle.lock().await;
        Ok(entry.state.clone())
    }

    /// Write the in-memory state again without recomputing anything
    pub async fn flush(&self, session_id: &str) -> Result<()> {
        let handle = self.registry.open(session_id).await?;
        let mut entry = handle.lock().await;
        self.write(&handle, &mut entry).await
    }

    /// Stop holding a session in memory
    ///
    /// Unsaved changes are written first. If that write fails the session
    /// stays live so the caller can retry.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        let handle = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| ContextError::SessionNotFound(session_id.to_string()))?;

        {
            let mut entry = handle.lock().await;
            if entry.dirty {
                self.write(&handle, &mut entry).await?;
            }
        }

        self.registry.remove(session_id).await;
        info!("Ended session {}", session_id);
        Ok(())
    }

    async fn handle_query(
        &self,
        state: &mut ConversationState,
        text: &str,
        warnings: &mut Vec<String>,
    ) -> Result<TurnOutcome> {
        let understanding = {
            let recent = state.recent(self.understanding_window);
            self.engine
                .analyze(text, state.current_summary.as_ref(), recent)
                .await?
        };

        state.push(Role::User, text);
        self.after_append(state, warnings).await;

        if understanding.is_ambiguous {
            let questions = understanding.clarifying_questions.clone();
            state.begin_clarification(text, questions.clone());
            METRICS.record_clarification();
            info!(
                session = %state.session_id,
                questions = questions.len(),
                confidence = understanding.confidence_score,
                "Awaiting clarification"
            );

            let prompt = render_clarification_prompt(&questions, Language::detect(text));
            return Ok(TurnOutcome::Clarification { questions, prompt });
        }

        self.respond(state, &understanding, warnings).await
    }

    async fn handle_clarification_answer(
        &self,
        state: &mut ConversationState,
        text: &str,
        warnings: &mut Vec<String>,
    ) -> Result<TurnOutcome> {
        let original = state.pending_original_query.clone().unwrap_or_default();
        let understanding = {
            let recent = state.recent(self.understanding_window);
            self.engine
                .resolve(&original, text, state.current_summary.as_ref(), recent)
                .await?
        };

        state.push(Role::User, text);
        state.resolve_clarification();
        METRICS.record_clarification_resolved();
        info!(session = %state.session_id, "Clarification resolved");

        self.after_append(state, warnings).await;
        self.respond(state, &understanding, warnings).await
    }

    /// Generate and append the assistant reply for the latest user message
    async fn respond(
        &self,
        state: &mut ConversationState,
        understanding: &QueryUnderstanding,
        warnings: &mut Vec<String>,
    ) -> Result<TurnOutcome> {
        let context = self
            .assembler
            .assemble(state, understanding.effective_query(), understanding);

        let result = self
            .responder
            .complete(TaskKind::ResponseGeneration, &context.to_payload())
            .await?;
        let text = reply_text(&result)?;

        state.push(Role::Assistant, text.clone());
        self.after_append(state, warnings).await;

        Ok(TurnOutcome::Reply { text })
    }

    /// Budget check after an append; summarizes the newest unsummarized
    /// segment once the threshold is exceeded
    ///
    /// A failed summarization keeps the previous summary and is reported as
    /// a warning only.
    async fn after_append(&self, state: &mut ConversationState, warnings: &mut Vec<String>) {
        let tokens = self.budget.refresh(state);
        if !self.budget.exceeds(tokens) {
            return;
        }

        let Some(range) = self.budget.unsummarized_range(state) else {
            return;
        };

        info!(
            session = %state.session_id,
            tokens,
            threshold = self.budget.threshold(),
            from = range.from,
            to = range.to,
            "Token threshold exceeded, summarizing"
        );

        match self.summarizer.summarize(state.messages(), range).await {
            Ok(summary) => {
                state.current_summary = Some(summary);
                let tokens = self.budget.refresh(state);
                METRICS.record_summarization(true);
                debug!("Summary now covers {}..={}, effective tokens {}", range.from, range.to, tokens);
            }
            Err(e) => {
                METRICS.record_summarization(false);
                warn!(
                    session = %state.session_id,
                    "Summarization of {}..={} failed, keeping previous summary: {}",
                    range.from,
                    range.to,
                    e
                );
                warnings.push(format!("summarization failed: {}", e));
            }
        }
    }

    /// Save the entry, recording a failure as a warning and marking it dirty
    async fn persist(
        &self,
        handle: &SessionHandle,
        entry: &mut SessionEntry,
        warnings: &mut Vec<String>,
    ) -> bool {
        match self.write(handle, entry).await {
            Ok(()) => true,
            Err(e) => {
                warnings.push(e.to_string());
                false
            }
        }
    }

    /// Write the entry; a dirty entry stays pinned in memory until a write succeeds
    async fn write(&self, handle: &SessionHandle, entry: &mut SessionEntry) -> Result<()> {
        let state = &entry.state;
        match self.store.save(state, state.current_summary.as_ref()).await {
            Ok(()) => {
                if entry.dirty {
                    self.registry.unpin(&state.session_id).await;
                }
                entry.dirty = false;
                Ok(())
            }
            Err(e) => {
                entry.dirty = true;
                self.registry.pin(&state.session_id, handle);
                METRICS.record_persistence_failure();
                warn!("Failed to persist session {}: {}", state.session_id, e);
                Err(e.into())
            }
        }
    }
}

/// Text of a `response_generation` result
fn reply_text(result: &Value) -> Result<String> {
    let text = match result {
        Value::String(text) => Some(text.as_str()),
        Value::Object(object) => ["response", "content", "text"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_str)),
        _ => None,
    };

    text.map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ContextError::Validation("response generation returned no text".to_string()))
}
