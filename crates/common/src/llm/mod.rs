//! Completion service abstraction
//!
//! Provides a unified interface for chat-completion providers:
//! - OpenAI-compatible HTTP endpoints with bounded retry
//! - Scripted mock for development and tests

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

/// Trait for chat-completion generation
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate a completion from a system prompt and user prompt
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// OpenAI chat-completion client
pub struct OpenAICompletion {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    temperature: f32,
    max_tokens: u32,
    timeout_ms: u64,
    max_retries: u32,
}

impl OpenAICompletion {
    /// Create a new OpenAI completion client
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let base = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", base),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_ms: config.timeout_secs * 1000,
            max_retries: config.max_retries,
        })
    }

    fn backoff_policy(&self) -> ExponentialBackoff {
        // Bound total retry time by the per-request timeout times attempts
        let budget = self.timeout_ms * (self.max_retries as u64 + 1);
        ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(Duration::from_millis(budget)),
            ..ExponentialBackoff::default()
        }
    }

    async fn request_once(&self, request: &ChatRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::CompletionTimeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    AppError::CompletionError {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::CompletionError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| AppError::CompletionError {
                    message: format!("Failed to parse response: {}", e),
                })?;

        chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| AppError::CompletionError {
                message: "Empty response".to_string(),
            })
    }
}

#[async_trait]
impl CompletionClient for OpenAICompletion {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        retry(self.backoff_policy(), || async {
            self.request_once(&request).await.map_err(|e| {
                if e.retryable() {
                    tracing::warn!(error = %e, "Completion request failed, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Scripted mock completion client for development and tests.
///
/// Responses are consumed in order; once the script runs out, every
/// call returns the fallback text.
pub struct MockCompletion {
    script: Mutex<VecDeque<String>>,
    fallback: String,
    calls: Mutex<Vec<String>>,
}

impl MockCompletion {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: "The retrieved documents describe the requested topic [chunk1].".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Build a mock that replies with the given responses in order
    pub fn with_script(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mock = Self::new();
        {
            let mut script = mock.script.lock().unwrap_or_else(|e| e.into_inner());
            script.extend(responses.into_iter().map(Into::into));
        }
        mock
    }

    /// User prompts seen so far, in call order
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of completions served
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for MockCompletion {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionClient for MockCompletion {
    async fn complete(&self, _system: &str, user: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(user.to_string());

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    fn model_name(&self) -> &str {
        "mock-completion"
    }
}

/// Create a completion client based on configuration
pub fn create_completion_client(config: &LlmConfig) -> Result<Arc<dyn CompletionClient>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config
                .api_key
                .clone()
                .ok_or_else(|| AppError::Configuration {
                    message: "llm.api_key required for openai provider".into(),
                })?;
            Ok(Arc::new(OpenAICompletion::new(config, key)?))
        }
        "mock" => Ok(Arc::new(MockCompletion::new())),
        other => {
            tracing::warn!(provider = other, "Unknown completion provider, using mock");
            Ok(Arc::new(MockCompletion::new()))
        }
    }
}
