//! OpenAI-compatible chat completion backend

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::{json, prompts, CompletionError, CompletionProvider, TaskKind};
use crate::config::LlmConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Chat-completions client implementing every task kind
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: LlmConfig,
    api_key: Option<String>,
    breaker: CircuitBreaker,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: LlmConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CompletionError::Unavailable(format!("HTTP client init failed: {}", e)))?;

        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker_failures,
            reset_timeout: config.breaker_reset_timeout(),
        });
        let api_key = config.api_key();

        Ok(Self {
            client,
            config,
            api_key,
            breaker,
        })
    }

    fn build_request(&self, task: TaskKind, payload: &Value) -> ChatCompletionRequest {
        let (system, user) = prompts::render(task, payload);
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: Some(self.config.temperature),
        }
    }

    /// Send the request with retries, returning the first choice's text
    async fn send(&self, request: &ChatCompletionRequest) -> Result<String, CompletionError> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                debug!("Retry attempt {} for completion", attempt);
                tokio::time::sleep(backoff_for(self.config.retry_backoff(), attempt)).await;
            }

            let mut req = self.client.post(&self.config.endpoint).json(request);
            if let Some(ref api_key) = self.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            let response = match req.send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(CompletionError::Unavailable(e.to_string()));
                    continue;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                last_error = Some(CompletionError::Unavailable(format!("HTTP {}: {}", status, body)));
                continue;
            }

            // A 200 with an unusable body will not improve on retry
            let parsed = response
                .json::<ChatCompletionResponse>()
                .await
                .map_err(|e| CompletionError::Malformed(format!("Failed to parse response: {}", e)))?;

            return parsed
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .ok_or_else(|| CompletionError::Malformed("No choices in response".to_string()));
        }

        warn!("Completion failed after {} attempts", attempts);
        Err(last_error.unwrap_or_else(|| CompletionError::Unavailable("no attempts made".to_string())))
    }
}

/// Exponential backoff before retry `attempt`, capped at `MAX_BACKOFF`
fn backoff_for(base: Duration, attempt: usize) -> Duration {
    base.checked_mul(1u32 << attempt.min(8))
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleProvider {
    async fn complete(&self, task: TaskKind, payload: &Value) -> Result<Value, CompletionError> {
        if self.breaker.is_open(task) {
            return Err(CompletionError::CircuitOpen(task));
        }

        debug!(task = %task, model = %self.config.model, "Requesting completion");
        let request = self.build_request(task, payload);

        let text = match self.send(&request).await {
            Ok(text) => {
                self.breaker.mark_success(task);
                text
            }
            Err(e) => {
                if matches!(e, CompletionError::Unavailable(_)) {
                    self.breaker.mark_failure(task);
                    debug!(task = %task, breaker = ?self.breaker.state(task), "Recorded completion failure");
                }
                return Err(e);
            }
        };

        if task.is_structured() {
            json::extract_object(&text).map_err(CompletionError::Malformed)
        } else {
            Ok(Value::String(text.trim().to_string()))
        }
    }
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_for(server: &mockito::Server) -> LlmConfig {
        LlmConfig {
            endpoint: format!("{}/v1/chat/completions", server.url()),
            max_retries: 2,
            retry_backoff_ms: 1,
            circuit_breaker_failures: 1,
            api_key_env: "SESSION_MEMORY_TEST_UNSET_KEY".to_string(),
            ..LlmConfig::default()
        }
    }

    fn completion_body(content: &str) -> String {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string()
    }

    #[tokio::test]
    async fn test_structured_task_extracts_object() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("```json\n{\"is_ambiguous\": true, \"confidence_score\": 0.4}\n```"))
            .create_async()
            .await;

        let provider = OpenAiCompatibleProvider::new(config_for(&server)).unwrap();
        let value = provider
            .complete(TaskKind::QueryUnderstanding, &json!({"query": "laptop"}))
            .await
            .unwrap();

        assert_eq!(value["is_ambiguous"], true);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_response_generation_returns_text() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("  Sure, here is an answer.  "))
            .create_async()
            .await;

        let provider = OpenAiCompatibleProvider::new(config_for(&server)).unwrap();
        let value = provider
            .complete(TaskKind::ResponseGeneration, &json!({"query": "hi"}))
            .await
            .unwrap();

        assert_eq!(value, Value::String("Sure, here is an answer.".to_string()));
    }

    #[tokio::test]
    async fn test_non_json_structured_result_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("I am not sure what you mean."))
            .create_async()
            .await;

        let provider = OpenAiCompatibleProvider::new(config_for(&server)).unwrap();
        let result = provider.complete(TaskKind::Summarization, &json!({})).await;
        assert!(matches!(result, Err(CompletionError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_server_errors_retry_then_open_circuit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .expect(2)
            .create_async()
            .await;

        let provider = OpenAiCompatibleProvider::new(config_for(&server)).unwrap();
        let first = provider.complete(TaskKind::Summarization, &json!({})).await;
        assert!(matches!(first, Err(CompletionError::Unavailable(_))));
        mock.assert_async().await;

        let second = provider.complete(TaskKind::Summarization, &json!({})).await;
        assert!(matches!(second, Err(CompletionError::CircuitOpen(TaskKind::Summarization))));
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_for(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_for(base, 3), Duration::from_millis(800));
        assert_eq!(backoff_for(base, 20), MAX_BACKOFF);
        assert_eq!(backoff_for(Duration::MAX, 5), MAX_BACKOFF);
        assert_eq!(backoff_for(Duration::from_millis(u64::MAX), 8), MAX_BACKOFF);
    }
}
