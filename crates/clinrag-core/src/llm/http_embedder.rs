//! HTTP-based embedder using an external embeddings service

use super::cache::EmbeddingCache;
use super::traits::ensure_encodable;
use super::Embedder;
use crate::config::EmbedderConfig;
use crate::error::{ClinragError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Embedder that uses an OpenAI-compatible `/v1/embeddings` endpoint
pub struct HttpEmbedder {
    http_client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
    cache: EmbeddingCache,
}

impl HttpEmbedder {
    /// Create from configuration
    pub fn from_config(config: &EmbedderConfig) -> Result<Self> {
        let url = config.url.clone().ok_or_else(|| {
            ClinragError::Config("embedder.url is required for the http provider".to_string())
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let api_key = config
            .api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok());

        Ok(Self {
            http_client,
            url,
            model: config.model.clone(),
            api_key,
            dimensions: config.dimensions,
            cache: EmbeddingCache::new(),
        })
    }

    async fn fetch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        #[derive(Serialize)]
        struct EmbedRequest<'a> {
            model: &'a str,
            input: &'a [String],
        }

        #[derive(Deserialize)]
        struct EmbedResponse {
            data: Vec<EmbedData>,
        }

        #[derive(Deserialize)]
        struct EmbedData {
            embedding: Vec<f32>,
        }

        let url = format!("{}/v1/embeddings", self.url.trim_end_matches('/'));
        let mut req = self.http_client.post(&url).json(&EmbedRequest {
            model: &self.model,
            input: texts,
        });

        if let Some(ref api_key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req
            .send()
            .await
            .map_err(|e| ClinragError::Encoding(format!("embedding service unavailable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClinragError::Encoding(format!(
                "Embedding service error (HTTP {}): {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ClinragError::Encoding(format!("bad embedding response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(ClinragError::Encoding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed
            .data
            .into_iter()
            .map(|d| {
                if d.embedding.len() != self.dimensions {
                    Err(ClinragError::Encoding(format!(
                        "embedding has {} dimensions, expected {}",
                        d.embedding.len(),
                        self.dimensions
                    )))
                } else {
                    Ok(d.embedding)
                }
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| ClinragError::Encoding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        for text in texts {
            ensure_encodable(text)?;
        }

        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut uncached_texts = Vec::new();
        let mut uncached_indices = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            match self.cache.get(&self.model, text) {
                Some(hit) => results.push(Some(hit)),
                None => {
                    results.push(None);
                    uncached_texts.push(text.clone());
                    uncached_indices.push(i);
                }
            }
        }

        if !uncached_texts.is_empty() {
            tracing::debug!(
                "Embedding batch: {} cached, {} to fetch",
                texts.len() - uncached_texts.len(),
                uncached_texts.len()
            );

            let fetched = self.fetch(&uncached_texts).await?;
            for ((idx, text), embedding) in uncached_indices
                .into_iter()
                .zip(uncached_texts.iter())
                .zip(fetched)
            {
                self.cache.insert(&self.model, text, embedding.clone());
                results[idx] = Some(embedding);
            }
        }

        results
            .into_iter()
            .map(|r| r.ok_or_else(|| ClinragError::Encoding("missing embedding".to_string())))
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
