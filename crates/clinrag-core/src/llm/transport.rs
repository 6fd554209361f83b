//! Generation request and classified transport failures

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chat message for completion requests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Fully rendered generation request, independent of model and credential
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(self.user.clone()),
        ]
    }
}

/// Outcome class of a failed generation call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Provider reports the credential's quota is used up
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Timeout, rate limit without quota signal, 5xx
    #[error("Transient API error: {0}")]
    Transient(String),

    /// Bad credential or request the provider will never accept
    #[error("Permanent API error: {0}")]
    Permanent(String),
}

const QUOTA_MARKERS: &[&str] = &["RESOURCE_EXHAUSTED", "QUOTA", "TOKENS PER DAY", "REQUESTS PER DAY"];

/// Classify a non-success HTTP response
pub fn classify_status(status: u16, body: &str) -> TransportError {
    let message = format!("HTTP {}: {}", status, truncate(body, 300));
    let upper = body.to_uppercase();

    match status {
        429 if QUOTA_MARKERS.iter().any(|m| upper.contains(m)) => {
            TransportError::QuotaExceeded(message)
        }
        408 | 425 | 429 => TransportError::Transient(message),
        500..=599 => TransportError::Transient(message),
        _ => TransportError::Permanent(message),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
