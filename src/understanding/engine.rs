//! Query Understanding Engine
//!
//! Ambiguity judgment and rewriting are delegated to the structured-completion
//! capability. This module validates what comes back, keeps generated text in
//! the query's language and bounds the augmented context by a token budget.

use super::language::Language;
use crate::context::models::{Message, QueryUnderstanding, SessionSummary};
use crate::context::token_estimator::TokenEstimator;
use crate::error::{ContextError, Result};
use crate::llm::{json::string_list, CompletionError, CompletionProvider, TaskKind};
use crate::metrics::METRICS;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Analyzes user queries against session memory
pub struct QueryUnderstandingEngine {
    provider: Arc<dyn CompletionProvider>,
    estimator: Arc<dyn TokenEstimator>,
    context_budget: usize,
    max_questions: usize,
}

impl QueryUnderstandingEngine {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        estimator: Arc<dyn TokenEstimator>,
        context_budget: usize,
        max_questions: usize,
    ) -> Self {
        Self {
            provider,
            estimator,
            context_budget,
            max_questions,
        }
    }

    /// Analyze `query` given the active summary and recent messages
    ///
    /// A result that does not match the expected shape degrades to a
    /// non-ambiguous pass-through of the raw query. Only an unreachable
    /// capability is returned as an error.
    pub async fn analyze(
        &self,
        query: &str,
        memory: Option<&SessionSummary>,
        recent: &[Message],
    ) -> Result<QueryUnderstanding> {
        let language = Language::detect(query);
        let payload = json!({
            "query": query,
            "language": language.name(),
            "recent_context": recent
                .iter()
                .map(Message::transcript_line)
                .collect::<Vec<_>>()
                .join("\n"),
            "memory": memory.map(|s| s.render()).unwrap_or_default(),
        });

        let result = match self.provider.complete(TaskKind::QueryUnderstanding, &payload).await {
            Ok(value) => value,
            Err(CompletionError::Malformed(reason)) => {
                return Ok(self.fallback(query, memory, recent, &reason));
            }
            Err(e) => return Err(ContextError::from(e)),
        };

        match self.validate(query, language, &result) {
            Ok(parsed) => {
                let final_augmented_context = self.augment(query, &parsed.needed, memory, recent);
                info!(
                    ambiguous = parsed.is_ambiguous,
                    confidence = parsed.confidence,
                    questions = parsed.questions.len(),
                    "Query analyzed"
                );
                Ok(QueryUnderstanding {
                    original_query: query.to_string(),
                    is_ambiguous: parsed.is_ambiguous,
                    rewritten_query: parsed.rewritten,
                    needed_context_from_memory: parsed.needed,
                    clarifying_questions: parsed.questions,
                    final_augmented_context,
                    confidence_score: parsed.confidence,
                })
            }
            Err(reason) => Ok(self.fallback(query, memory, recent, &reason)),
        }
    }

    /// Analyze the answer to a clarification request
    ///
    /// The pending query and the answer are merged into one effective query.
    /// The result is never ambiguous: the answer is taken to resolve it.
    pub async fn resolve(
        &self,
        original_query: &str,
        answer: &str,
        memory: Option<&SessionSummary>,
        recent: &[Message],
    ) -> Result<QueryUnderstanding> {
        let combined = combine_clarification(original_query, answer);
        let mut understanding = self.analyze(&combined, memory, recent).await?;
        if understanding.is_ambiguous {
            debug!("Ignoring ambiguity of a clarified query");
        }
        understanding.is_ambiguous = false;
        understanding.clarifying_questions.clear();
        Ok(understanding)
    }

    fn validate(
        &self,
        query: &str,
        language: Language,
        value: &Value,
    ) -> std::result::Result<ParsedUnderstanding, String> {
        let object = value
            .as_object()
            .ok_or_else(|| "understanding result is not an object".to_string())?;

        let is_ambiguous = object
            .get("is_ambiguous")
            .and_then(Value::as_bool)
            .ok_or_else(|| "is_ambiguous is missing or not a boolean".to_string())?;

        let confidence = object
            .get("confidence_score")
            .and_then(Value::as_f64)
            .ok_or_else(|| "confidence_score is missing or not a number".to_string())?
            .clamp(0.0, 1.0) as f32;

        let needed = string_list(object.get("needed_context_from_memory"), "needed_context_from_memory")?;

        let mut questions = string_list(object.get("clarifying_questions"), "clarifying_questions")?;
        questions.retain(|q| language.admits(q));
        questions.dedup();
        questions.truncate(self.max_questions);

        if is_ambiguous && questions.is_empty() {
            return Err("ambiguous result carries no usable clarifying questions".to_string());
        }
        if !is_ambiguous {
            questions.clear();
        }

        let rewritten = rewritten_query(object)
            .filter(|q| q != query)
            .filter(|q| {
                let admitted = language.admits(q);
                if !admitted {
                    debug!("Dropping rewritten query in the wrong language");
                }
                admitted
            });

        Ok(ParsedUnderstanding {
            is_ambiguous,
            rewritten,
            needed,
            questions,
            confidence,
        })
    }

    fn fallback(
        &self,
        query: &str,
        memory: Option<&SessionSummary>,
        recent: &[Message],
        reason: &str,
    ) -> QueryUnderstanding {
        warn!("Query understanding fell back to pass-through: {}", reason);
        METRICS.record_understanding_fallback();

        QueryUnderstanding {
            original_query: query.to_string(),
            is_ambiguous: false,
            rewritten_query: None,
            needed_context_from_memory: Vec::new(),
            clarifying_questions: Vec::new(),
            final_augmented_context: self.augment(query, &[], memory, recent),
            confidence_score: 0.0,
        }
    }

    /// Build the augmented context within the configured token budget
    ///
    /// The query is admitted first, then memory items, then recent messages
    /// from newest to oldest. Admission stops at the first item that would
    /// overflow the budget.
    pub fn augment(
        &self,
        query: &str,
        needed: &[String],
        memory: Option<&SessionSummary>,
        recent: &[Message],
    ) -> String {
        let query = self.fit_query(query);

        let memory_items: Vec<String> = if needed.is_empty() {
            memory
                .map(|s| s.render().lines().map(str::to_string).collect())
                .unwrap_or_default()
        } else {
            needed.to_vec()
        };

        let mut admitted_memory: Vec<String> = Vec::new();
        for item in memory_items {
            admitted_memory.push(item);
            if !self.fits(&render_context(&query, &admitted_memory, &[])) {
                admitted_memory.pop();
                break;
            }
        }

        let mut admitted_recent: Vec<String> = Vec::new();
        for message in recent.iter().rev() {
            admitted_recent.insert(0, message.transcript_line());
            if !self.fits(&render_context(&query, &admitted_memory, &admitted_recent)) {
                admitted_recent.remove(0);
                break;
            }
        }

        render_context(&query, &admitted_memory, &admitted_recent)
    }

    fn fits(&self, text: &str) -> bool {
        self.estimator.estimate(text) <= self.context_budget
    }

    /// Longest prefix of `query` whose rendered block fits the budget
    fn fit_query(&self, query: &str) -> String {
        if self.fits(&render_context(query, &[], &[])) {
            return query.to_string();
        }

        let chars: Vec<char> = query.chars().collect();
        let (mut lo, mut hi) = (0usize, chars.len());
        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            let candidate: String = chars[..mid].iter().collect();
            if self.fits(&render_context(&candidate, &[], &[])) {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        chars[..lo].iter().collect()
    }
}

struct ParsedUnderstanding {
    is_ambiguous: bool,
    rewritten: Option<String>,
    needed: Vec<String>,
    questions: Vec<String>,
    confidence: f32,
}

fn rewritten_query(object: &Map<String, Value>) -> Option<String> {
    object
        .get("rewritten_query")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
}

/// Single effective query for a clarified turn
pub fn combine_clarification(original_query: &str, answer: &str) -> String {
    format!(
        "Original question: {}\n\nClarification/feedback: {}",
        original_query.trim(),
        answer.trim()
    )
}

fn render_context(query: &str, memory: &[String], recent: &[String]) -> String {
    let mut sections = Vec::new();
    if !memory.is_empty() {
        sections.push(format!("Session memory:\n{}", memory.join("\n")));
    }
    if !recent.is_empty() {
        sections.push(format!("Recent conversation:\n{}", recent.join("\n")));
    }
    if !query.is_empty() {
        sections.push(format!("Current query:\n{}", query));
    }
    sections.join("\n\n")
}
