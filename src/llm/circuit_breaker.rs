//! Circuit breaker guarding the completion backend per task kind

use super::TaskKind;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,   // Normal operation
    Open,     // Failing, reject requests
    HalfOpen, // Letting one trial request through
}

#[derive(Debug, Clone)]
struct BreakerEntry {
    state: BreakerState,
    failure_count: usize,
    opened_at: Option<Instant>,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            opened_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Tracks consecutive failures for each task kind independently, so a
/// failing summarization backend does not block response generation.
pub struct CircuitBreaker {
    breakers: DashMap<TaskKind, BreakerEntry>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Check if calls for `task` should be rejected right now
    pub fn is_open(&self, task: TaskKind) -> bool {
        let mut entry = self.breakers.entry(task).or_insert_with(BreakerEntry::new);

        let (state, opened_at) = (entry.state, entry.opened_at);
        match state {
            BreakerState::Closed | BreakerState::HalfOpen => false,
            BreakerState::Open => match opened_at {
                Some(opened_at) if opened_at.elapsed() >= self.config.reset_timeout => {
                    entry.state = BreakerState::HalfOpen;
                    false
                }
                _ => true,
            },
        }
    }

    pub fn mark_success(&self, task: TaskKind) {
        self.breakers.insert(task, BreakerEntry::new());
    }

    pub fn mark_failure(&self, task: TaskKind) {
        let mut entry = self.breakers.entry(task).or_insert_with(BreakerEntry::new);

        entry.failure_count += 1;

        // A failed half-open trial reopens immediately
        let trial_failed = entry.state == BreakerState::HalfOpen;
        if entry.failure_count >= self.config.failure_threshold || trial_failed {
            entry.state = BreakerState::Open;
            entry.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self, task: TaskKind) -> BreakerState {
        self.breakers
            .get(&task)
            .map(|entry| entry.state)
            .unwrap_or(BreakerState::Closed)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
