//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use session_memory::config::{Config, MemoryConfig};
use session_memory::context::models::{ConversationState, SessionSummary};
use session_memory::llm::{CompletionError, CompletionProvider, TaskKind};
use session_memory::session::SessionManager;
use session_memory::storage::{InMemoryStore, SessionStore, StoreError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Scripted backend: queued results per task, then an optional default
#[derive(Default)]
pub struct ScriptedProvider {
    queues: Mutex<HashMap<TaskKind, VecDeque<Result<Value, CompletionError>>>>,
    defaults: Mutex<HashMap<TaskKind, Value>>,
    calls: Mutex<Vec<(TaskKind, Value)>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, task: TaskKind, value: Value) {
        self.queues.lock().unwrap().entry(task).or_default().push_back(Ok(value));
    }

    pub fn push_error(&self, task: TaskKind, error: CompletionError) {
        self.queues.lock().unwrap().entry(task).or_default().push_back(Err(error));
    }

    /// Result returned once the queue for `task` is empty
    pub fn set_default(&self, task: TaskKind, value: Value) {
        self.defaults.lock().unwrap().insert(task, value);
    }

    pub fn calls(&self, task: TaskKind) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _)| *kind == task)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, task: TaskKind, payload: &Value) -> Result<Value, CompletionError> {
        self.calls.lock().unwrap().push((task, payload.clone()));
        if let Some(next) = self.queues.lock().unwrap().get_mut(&task).and_then(VecDeque::pop_front) {
            return next;
        }
        self.defaults
            .lock()
            .unwrap()
            .get(&task)
            .cloned()
            .ok_or_else(|| CompletionError::Unavailable(format!("nothing scripted for {}", task)))
    }
}

/// In-memory store whose writes can be switched off
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn summary(&self, session_id: &str) -> Option<SessionSummary> {
        self.inner.summary(session_id)
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn save(
        &self,
        state: &ConversationState,
        summary: Option<&SessionSummary>,
    ) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.save(state, summary).await
    }

    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, StoreError> {
        self.inner.load(session_id).await
    }
}

pub fn config_with_threshold(threshold: usize) -> Config {
    Config {
        memory: MemoryConfig {
            token_threshold: threshold,
            ..MemoryConfig::default()
        },
        ..Config::default()
    }
}

pub fn manager(
    threshold: usize,
    provider: Arc<ScriptedProvider>,
    store: Arc<FlakyStore>,
) -> SessionManager {
    SessionManager::new(&config_with_threshold(threshold), provider, store).unwrap()
}

/// Manager whose sessions leave memory after one idle second
pub fn short_lived_manager(provider: Arc<ScriptedProvider>, store: Arc<FlakyStore>) -> SessionManager {
    let mut config = config_with_threshold(3000);
    config.session.idle_timeout_secs = 1;
    SessionManager::new(&config, provider, store).unwrap()
}

pub fn not_ambiguous() -> Value {
    json!({
        "is_ambiguous": false,
        "rewritten_query": null,
        "needed_context_from_memory": [],
        "clarifying_questions": [],
        "confidence_score": 0.9
    })
}

pub fn ambiguous(questions: &[&str]) -> Value {
    json!({
        "is_ambiguous": true,
        "rewritten_query": null,
        "needed_context_from_memory": [],
        "clarifying_questions": questions,
        "confidence_score": 0.3
    })
}
