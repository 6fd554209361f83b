//! HTTP transport for OpenAI-compatible chat completion services (Groq, vLLM, etc.)

use super::{classify_status, ChatMessage, GenerationRequest, GenerationTransport, TransportError};
use crate::config::{Credential, LLMServiceConfig};
use crate::error::{ClinragError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// API metrics for monitoring
#[derive(Debug, Default)]
pub struct TransportMetrics {
    pub total_requests: AtomicU64,
    pub quota_errors: AtomicU64,
    pub transient_errors: AtomicU64,
    pub permanent_errors: AtomicU64,
    pub total_latency_ms: AtomicU64,
}

/// Snapshot of transport metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub quota_errors: u64,
    pub transient_errors: u64,
    pub permanent_errors: u64,
    pub avg_latency_ms: f64,
}

/// Chat-completions client speaking the OpenAI wire format
pub struct HttpTransport {
    http_client: reqwest::Client,
    config: LLMServiceConfig,
    metrics: Arc<TransportMetrics>,
}

impl HttpTransport {
    /// Create new transport from configuration
    pub fn new(config: LLMServiceConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ClinragError::Http)?;

        Ok(Self {
            http_client,
            config,
            metrics: Arc::new(TransportMetrics::default()),
        })
    }

    /// Get current transport metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        let total = self.metrics.total_requests.load(Ordering::Relaxed);
        MetricsSnapshot {
            total_requests: total,
            quota_errors: self.metrics.quota_errors.load(Ordering::Relaxed),
            transient_errors: self.metrics.transient_errors.load(Ordering::Relaxed),
            permanent_errors: self.metrics.permanent_errors.load(Ordering::Relaxed),
            avg_latency_ms: if total > 0 {
                self.metrics.total_latency_ms.load(Ordering::Relaxed) as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    /// Count a failed request by class
    fn record(&self, error: TransportError) -> TransportError {
        let counter = match error {
            TransportError::QuotaExceeded(_) => &self.metrics.quota_errors,
            TransportError::Transient(_) => &self.metrics.transient_errors,
            TransportError::Permanent(_) => &self.metrics.permanent_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        error
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Classify a reqwest failure that happened before a status was received
fn classify_request_error(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        TransportError::Transient(format!("request failed: {}", e))
    } else if e.is_builder() {
        TransportError::Permanent(format!("invalid request: {}", e))
    } else {
        TransportError::Transient(e.to_string())
    }
}

#[async_trait]
impl GenerationTransport for HttpTransport {
    async fn generate(
        &self,
        request: &GenerationRequest,
        model: &str,
        credential: &Credential,
    ) -> std::result::Result<String, TransportError> {
        let start = Instant::now();
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        let result = self.complete(request, model, credential).await;

        // Failed requests count toward latency as well
        let elapsed = start.elapsed().as_millis() as u64;
        self.metrics
            .total_latency_ms
            .fetch_add(elapsed, Ordering::Relaxed);

        result.map_err(|e| self.record(e))
    }
}

impl HttpTransport {
    async fn complete(
        &self,
        request: &GenerationRequest,
        model: &str,
        credential: &Credential,
    ) -> std::result::Result<String, TransportError> {
        let api_key = credential.api_key.as_deref().ok_or_else(|| {
            TransportError::Permanent(format!("credential {} has no API key", credential.id))
        })?;

        let body = ChatRequest {
            model,
            messages: request.messages(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/v1/chat/completions", self.config.url.trim_end_matches('/'));

        tracing::debug!("POST {} model={} credential={}", url, model, credential.id);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &text));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            TransportError::Transient(format!("undecodable completion body: {}", e))
        })?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                TransportError::Transient("completion contained no content".to_string())
            })?;

        Ok(content)
    }
}
