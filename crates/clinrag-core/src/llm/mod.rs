//! LLM integration
//!
//! Provides traits and implementations for:
//! - Embedding generation (local feature hashing, local MiniLM through ONNX
//!   Runtime, or an external service)
//! - Chat-completion transport with classified failures

mod cache;
mod hash_embedder;
mod http_embedder;
mod http_transport;
#[cfg(feature = "onnx-embeddings")]
mod onnx_embedder;
mod traits;
mod transport;

pub use cache::EmbeddingCache;
pub use hash_embedder::{HashEmbedder, DEFAULT_HASH_DIMENSIONS, HASH_EMBED_MODEL};
pub use http_embedder::HttpEmbedder;
pub use http_transport::{HttpTransport, MetricsSnapshot};
#[cfg(feature = "onnx-embeddings")]
pub use onnx_embedder::{OnnxEmbedder, MINILM_DIMENSIONS, ONNX_EMBED_MODEL};
pub use traits::*;
pub use transport::{classify_status, ChatMessage, GenerationRequest, TransportError};

use crate::config::{EmbedderConfig, EmbedderProvider};
use crate::error::Result;
use std::sync::Arc;

/// Build the configured encoder
pub fn embedder_from_config(config: &EmbedderConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider {
        EmbedderProvider::Hash => Ok(Arc::new(HashEmbedder::new(config.dimensions)?)),
        EmbedderProvider::Http => Ok(Arc::new(HttpEmbedder::from_config(config)?)),
        EmbedderProvider::Onnx => onnx_from_config(config),
    }
}

#[cfg(feature = "onnx-embeddings")]
fn onnx_from_config(config: &EmbedderConfig) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(OnnxEmbedder::load(&config.onnx_model_dir())?))
}

#[cfg(not(feature = "onnx-embeddings"))]
fn onnx_from_config(_config: &EmbedderConfig) -> Result<Arc<dyn Embedder>> {
    Err(crate::error::ClinragError::Config(
        "the onnx embedder needs clinrag built with the onnx-embeddings feature".to_string(),
    ))
}
