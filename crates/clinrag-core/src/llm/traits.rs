//! LLM trait definitions

use super::{GenerationRequest, TransportError};
use crate::config::Credential;
use crate::error::{ClinragError, Result};
use async_trait::async_trait;

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for batch of texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Outbound generation call against one (model, credential) pair.
///
/// Implementations must classify every failure so the cascade can decide
/// between retrying, skipping and giving up.
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        model: &str,
        credential: &Credential,
    ) -> std::result::Result<String, TransportError>;
}

/// Reject input an encoder cannot represent
pub(crate) fn ensure_encodable(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(ClinragError::Encoding("empty input".to_string()));
    }
    Ok(())
}
