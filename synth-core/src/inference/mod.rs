//! The single conduit to the inference backend.
//!
//! Exposes slot-addressed (`id_slot >= 0`, native `/completion` endpoint)
//! and slot-agnostic (`slot_id = -1`, OpenAI-compatible `/v1/chat/completions`
//! endpoint) generation, sharing one retry/backoff policy and one
//! `cache_prompt` policy.

mod prompt;

pub use prompt::{messages_to_prompt, ChatMessage, Role};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Errors surfaced by the inference client. Distinguished by kind so callers
/// can match instead of string-sniffing; `Display` renders the sentinel
/// strings the spec calls for when this error must travel as prompt text.
#[derive(Debug, thiserror::Error, Clone)]
pub enum InferenceError {
    #[error("ERROR: Connection error. Server may be overloaded or down.")]
    Connection,

    #[error("ERROR: Connection error on slot {0}.")]
    ConnectionOnSlot(i64),

    #[error("server busy (503) on slot {0}")]
    ServerBusy(i64),

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("failed to decode backend response: {0}")]
    Decode(String),
}

/// A single request to the backend: either a message-sequence call routed
/// through the OpenAI-compatible endpoint (`slot_id < 0`), or a templated
/// prompt routed through the native endpoint with an explicit slot
/// (`slot_id >= 0`).
#[async_trait]
pub trait Inference: Send + Sync {
    /// Generate a completion for `messages` at `temperature`, optionally
    /// pinned to `slot_id`. `retry` is `true` when this call is itself a
    /// retry of a prior attempt (forces `cache_prompt=false` regardless of
    /// slot).
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        slot_id: i64,
    ) -> Result<String, InferenceError>;

    /// A minimal low-token-budget request used to probe backend health.
    async fn health_check(&self) -> HealthStatus;
}

/// Result of a [`Inference::health_check`] call.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency: Option<Duration>,
    pub error: Option<String>,
}

/// HTTP client talking to a llama.cpp-compatible backend.
///
/// One long-lived `reqwest::Client`, one connect/request timeout budget per
/// call class: a short one implicitly bounds health checks (`max_tokens=5`
/// keeps them fast even without a distinct client), the configured 300s
/// ceiling applies to generation.
pub struct HttpInferenceClient {
    client: reqwest::Client,
    base_url: String,
    native_url: String,
    model_name: String,
    consecutive_errors: parking_lot::Mutex<u32>,
}

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_BASE: Duration = Duration::from_secs(1);

impl HttpInferenceClient {
    /// # Errors
    /// Returns an error if the underlying `reqwest::Client` cannot be built
    /// (e.g. invalid TLS configuration from the environment).
    pub fn new(backend_url: impl Into<String>, model_name: impl Into<String>) -> reqwest::Result<Self> {
        let backend_url = backend_url.into();
        let native_url = backend_url.trim_end_matches("/v1").to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            base_url: backend_url,
            native_url,
            model_name: model_name.into(),
            consecutive_errors: parking_lot::Mutex::new(0),
        })
    }

    fn record_success(&self) {
        *self.consecutive_errors.lock() = 0;
    }

    fn record_failure(&self) -> u32 {
        let mut guard = self.consecutive_errors.lock();
        *guard += 1;
        *guard
    }

    /// `consecutive_errors() >= 5` is the restart-needed threshold.
    #[must_use]
    pub fn needs_restart(&self) -> bool {
        *self.consecutive_errors.lock() >= 5
    }

    async fn chat_openai(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, InferenceError> {
        let body = json!({
            "model": self.model_name,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": 16_000,
            "frequency_penalty": 0.5,
            "presence_penalty": 0.5,
        });

        let mut last_error = InferenceError::Connection;
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = RETRY_DELAY_BASE * 2u32.pow(attempt);
                tracing::warn!(attempt, ?delay, "retrying chat completion");
                tokio::time::sleep(delay).await;
            }

            match self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .json(&body)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: OpenAiChatResponse = resp
                        .json()
                        .await
                        .map_err(|e| InferenceError::Decode(e.to_string()))?;
                    self.record_success();
                    return Ok(parsed
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .unwrap_or_default());
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let text = resp.text().await.unwrap_or_default();
                    self.record_failure();
                    last_error = InferenceError::Http { status, body: text };
                }
                Err(e) if e.is_timeout() => {
                    self.record_failure();
                    last_error = InferenceError::Timeout;
                }
                Err(_) => {
                    self.record_failure();
                    last_error = InferenceError::Connection;
                }
            }
        }

        tracing::error!(error = %last_error, "chat completion failed after retries");
        Err(InferenceError::Connection)
    }

    async fn chat_with_slot(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        slot_id: i64,
        is_management: bool,
    ) -> Result<String, InferenceError> {
        let prompt = messages_to_prompt(messages);
        let mut cache_prompt = !is_management;

        // CRITICAL STABILITY: management slots process highly variable
        // prompts; reusing cached context truncates incorrectly and crashes
        // the backend. Force a clean slot reset every time.
        if is_management {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        let mut last_error = InferenceError::ConnectionOnSlot(slot_id);
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Disable caching on retry to force a slot reset and avoid a
                // GGML_ASSERT crash from a half-truncated cached prefix.
                cache_prompt = false;
                let delay = RETRY_DELAY_BASE * 2u32.pow(attempt);
                tracing::warn!(attempt, slot_id, ?delay, "retrying slot completion");
                tokio::time::sleep(delay).await;
            }

            let body = json!({
                "prompt": prompt,
                "temperature": temperature,
                "n_predict": 16_000,
                "id_slot": slot_id,
                "cache_prompt": cache_prompt,
                "repeat_penalty": 1.1,
                "frequency_penalty": 0.5,
                "presence_penalty": 0.5,
                "stop": ["</s>", "[INST]", "[/INST]", "User:", "Human:"],
            });

            match self
                .client
                .post(format!("{}/completion", self.native_url))
                .json(&body)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: NativeCompletionResponse = resp
                        .json()
                        .await
                        .map_err(|e| InferenceError::Decode(e.to_string()))?;
                    self.record_success();
                    return Ok(parsed.content);
                }
                Ok(resp) if resp.status().as_u16() == 503 => {
                    self.record_failure();
                    last_error = InferenceError::ServerBusy(slot_id);
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    self.record_failure();
                    last_error = InferenceError::Http { status, body };
                }
                Err(e) if e.is_connect() => {
                    self.record_failure();
                    tracing::error!(slot_id, "inference backend unreachable");
                    last_error = InferenceError::ConnectionOnSlot(slot_id);
                }
                Err(_) => {
                    self.record_failure();
                    last_error = InferenceError::ConnectionOnSlot(slot_id);
                }
            }
        }

        tracing::error!(slot_id, error = %last_error, "slot completion failed after retries");
        Err(InferenceError::ConnectionOnSlot(slot_id))
    }
}

#[async_trait]
impl Inference for HttpInferenceClient {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        slot_id: i64,
    ) -> Result<String, InferenceError> {
        if slot_id < 0 {
            self.chat_openai(messages, temperature).await
        } else {
            // This trait method doesn't know W, so it cannot tell a worker
            // slot from a management slot; it defaults to the worker policy
            // (`cache_prompt=true`). Callers that need the hard management
            // policy enforced must route through `ManagedInference` instead.
            self.chat_with_slot(messages, temperature, slot_id, false).await
        }
    }

    async fn health_check(&self) -> HealthStatus {
        let start = std::time::Instant::now();
        let messages = [ChatMessage { role: Role::User, content: "ping".to_string() }];
        let body = json!({
            "model": self.model_name,
            "messages": messages,
            "temperature": 0.0,
            "max_tokens": 5,
        });

        match self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                self.record_success();
                HealthStatus { healthy: true, latency: Some(start.elapsed()), error: None }
            }
            Ok(resp) => {
                self.record_failure();
                HealthStatus {
                    healthy: false,
                    latency: None,
                    error: Some(format!("http {}", resp.status())),
                }
            }
            Err(e) => {
                self.record_failure();
                HealthStatus { healthy: false, latency: None, error: Some(e.to_string()) }
            }
        }
    }
}

/// Wraps a [`HttpInferenceClient`] with knowledge of `W` so the hard
/// `cache_prompt` policy is enforced structurally rather than by
/// convention at each call site.
pub struct ManagedInference<'a> {
    pub client: &'a HttpInferenceClient,
    pub worker_count: usize,
}

impl ManagedInference<'_> {
    /// Generate on a worker slot `k ∈ [0, W)`; `cache_prompt=true` unless
    /// this call is itself a retry.
    pub async fn generate_worker(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        worker_index: usize,
    ) -> Result<String, InferenceError> {
        debug_assert!(worker_index < self.worker_count);
        self.client
            .chat_with_slot(messages, temperature, worker_index as i64, false)
            .await
    }

    /// Generate on a management slot (`cache_prompt` always `false`).
    pub async fn generate_management(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        slot_id: i64,
    ) -> Result<String, InferenceError> {
        debug_assert!(slot_id < 0 || slot_id as usize >= self.worker_count);
        self.client.chat_with_slot(messages, temperature, slot_id, true).await
    }

    /// Generate on the slot-agnostic OpenAI-compatible endpoint.
    pub async fn generate_agnostic(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, InferenceError> {
        self.client.chat_openai(messages, temperature).await
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct NativeCompletionResponse {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_strips_v1_suffix_for_native_url() {
        let client = HttpInferenceClient::new("http://localhost:8080/v1", "local-model").unwrap();
        assert_eq!(client.native_url, "http://localhost:8080");
    }

    #[test]
    fn fresh_client_does_not_need_restart() {
        let client = HttpInferenceClient::new("http://localhost:8080/v1", "local-model").unwrap();
        assert!(!client.needs_restart());
    }
}
