//! Completion client with bounded retry.
//!
//! One call to [`CompletionClient::complete`] issues up to
//! `RetryPolicy::max_attempts` requests through a [`CompletionTransport`].
//! Transport failures and retryable statuses are retried after a backoff
//! delay; rejections surface immediately. The whole sequence runs under an
//! overall deadline.

use crate::error::{CompletionError, CompletionErrorKind};
use crate::{EngineError, Result};
use async_trait::async_trait;
use medisage_types::{CompletionRequest, CompletionResponse, MessageContent, Role, WireMessage};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of a single failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Worth trying again (network error, 408, 429, 5xx).
    Retryable(String),
    /// Retrying will not help (bad request, bad credentials).
    Fatal(String),
}

/// Sends one completion request. Implementations do not retry.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn send(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<CompletionResponse, AttemptError>;
}

/// Backoff configuration for the attempt loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            multiplier: 1.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        Duration::from_secs_f64(raw.min(self.max_delay.as_secs_f64()))
    }
}

/// Request parameters shared by every call.
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub retry: RetryPolicy,
    /// Upper bound on the whole retry sequence.
    pub deadline: Duration,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: "google/gemini-2.0-flash-thinking-exp-1219:free".to_string(),
            temperature: Some(0.7),
            max_tokens: Some(1000),
            retry: RetryPolicy::default(),
            deadline: Duration::from_secs(60),
        }
    }
}

/// Client for the completion endpoint.
pub struct CompletionClient {
    transport: Arc<dyn CompletionTransport>,
    settings: CompletionSettings,
}

impl CompletionClient {
    pub fn new(transport: Arc<dyn CompletionTransport>, settings: CompletionSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &CompletionSettings {
        &self.settings
    }

    /// Send the formatted turns and return the first assistant message's text.
    pub async fn complete(
        &self,
        system_prompt: Option<&str>,
        turns: Vec<WireMessage>,
    ) -> std::result::Result<String, CompletionError> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
            messages.push(WireMessage {
                role: Role::System,
                content: MessageContent::Text(prompt.to_string()),
            });
        }
        messages.extend(turns);

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        match tokio::time::timeout(self.settings.deadline, self.run_attempts(&request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    target: "medisage::completion",
                    "Completion deadline of {:?} exceeded", self.settings.deadline
                );
                Err(CompletionError::new(
                    CompletionErrorKind::Timeout,
                    format!("no reply within {:?}", self.settings.deadline),
                ))
            }
        }
    }

    async fn run_attempts(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<String, CompletionError> {
        let policy = self.settings.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(target: "medisage::completion", "Completion attempt {}/{}", attempt, max_attempts);

            match self.transport.send(request).await {
                Ok(response) => {
                    return match response.first_text() {
                        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
                        _ => Err(CompletionError::new(
                            CompletionErrorKind::EmptyResponse,
                            "provider payload has no assistant message content",
                        )),
                    };
                }
                Err(AttemptError::Fatal(message)) => {
                    warn!(target: "medisage::completion", "Completion rejected: {}", message);
                    return Err(CompletionError::new(CompletionErrorKind::Rejected, message));
                }
                Err(AttemptError::Retryable(message)) => {
                    if attempt >= max_attempts {
                        warn!(
                            target: "medisage::completion",
                            "Completion unavailable after {} attempts: {}", attempt, message
                        );
                        return Err(CompletionError::new(
                            CompletionErrorKind::Unavailable,
                            format!("{} (after {} attempts)", message, attempt),
                        ));
                    }
                    let delay = policy.delay_after(attempt);
                    warn!(
                        target: "medisage::completion",
                        "Completion attempt {} failed: {}; retrying in {:?}", attempt, message, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Connection settings for [`HttpTransport`].
#[derive(Clone)]
pub struct HttpTransportConfig {
    pub endpoint: String,
    pub api_key: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Sent as `HTTP-Referer`.
    pub referer: Option<String>,
    /// Sent as `X-Title`.
    pub title: Option<String>,
}

impl std::fmt::Debug for HttpTransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransportConfig")
            .field("endpoint", &self.endpoint)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .finish()
    }
}

/// Bearer-authenticated JSON transport over HTTPS.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", config.api_key), "API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(referer) = &config.referer {
            headers.insert("HTTP-Referer", header_value(referer, "referer")?);
        }
        if let Some(title) = &config.title {
            headers.insert("X-Title", header_value(title, "title")?);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EngineError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
        })
    }
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| EngineError::Configuration(format!("invalid {} header: {}", what, e)))
}

/// Whether a failure status is worth retrying.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429) || (500..=599).contains(&status)
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn send(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<CompletionResponse, AttemptError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(format!("transport error: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Retryable(format!("failed to read body: {}", e)))?;

        if status.is_success() {
            return Ok(serde_json::from_str(&body).unwrap_or_else(|e| {
                warn!(target: "medisage::completion", "Unparseable completion payload: {}", e);
                CompletionResponse::default()
            }));
        }

        let detail = serde_json::from_str::<CompletionResponse>(&body)
            .ok()
            .and_then(|r| r.error)
            .and_then(|e| e.message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        let message = format!("HTTP {}: {}", status.as_u16(), detail);

        if is_retryable_status(status.as_u16()) {
            Err(AttemptError::Retryable(message))
        } else {
            Err(AttemptError::Fatal(message))
        }
    }
}
