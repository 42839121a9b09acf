//! Scripted provider for unit tests

use super::{CompletionError, CompletionProvider, TaskKind};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Replays queued results per task kind and records every call
#[derive(Default)]
pub struct ScriptedProvider {
    queues: Mutex<HashMap<TaskKind, VecDeque<Result<Value, String>>>>,
    calls: Mutex<Vec<(TaskKind, Value)>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: TaskKind, value: Value) -> &Self {
        self.queues.lock().unwrap().entry(task).or_default().push_back(Ok(value));
        self
    }

    /// Queue an `Unavailable` failure
    pub fn push_failure(&self, task: TaskKind, message: &str) -> &Self {
        self.queues
            .lock()
            .unwrap()
            .entry(task)
            .or_default()
            .push_back(Err(message.to_string()));
        self
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
        let next = self.queues.lock().unwrap().get_mut(&task).and_then(VecDeque::pop_front);
        match next {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(CompletionError::Unavailable(message)),
            None => Err(CompletionError::Unavailable(format!("no scripted result for {}", task))),
        }
    }
}
