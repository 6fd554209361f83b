//! FNV-1a feature-hashing embedder
//!
//! Maps lowercase word unigrams and bigrams into a fixed number of signed
//! buckets and L2-normalizes the result. Needs no model files or network,
//! and the same text always produces a bit-identical vector.

use super::traits::ensure_encodable;
use super::Embedder;
use crate::error::{ClinragError, Result};
use async_trait::async_trait;

pub const DEFAULT_HASH_DIMENSIONS: usize = 384;
pub const HASH_EMBED_MODEL: &str = "fnv1a-hash";

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;
const BIGRAM_WEIGHT: f32 = 0.5;

pub struct HashEmbedder {
    dimensions: usize,
    model_name: String,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(ClinragError::Config(
                "hash embedder dimensions must be positive".to_string(),
            ));
        }
        Ok(Self {
            dimensions,
            model_name: format!("{}-{}", HASH_EMBED_MODEL, dimensions),
        })
    }

    /// Synchronous encode used by both trait methods
    pub fn encode(&self, text: &str) -> Result<Vec<f32>> {
        ensure_encodable(text)?;

        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(ClinragError::Encoding(
                "input has no encodable tokens".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for token in &tokens {
            self.accumulate(&mut vector, fnv1a(token.as_bytes()), 1.0);
        }
        for pair in tokens.windows(2) {
            let mut hash = fnv1a(pair[0].as_bytes());
            hash = fnv1a_continue(hash, b" ");
            hash = fnv1a_continue(hash, pair[1].as_bytes());
            self.accumulate(&mut vector, hash, BIGRAM_WEIGHT);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(ClinragError::Encoding(
                "input hashed to a zero vector".to_string(),
            ));
        }
        for x in &mut vector {
            *x /= norm;
        }
        Ok(vector)
    }

    fn accumulate(&self, vector: &mut [f32], hash: u64, weight: f32) {
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_HASH_DIMENSIONS,
            model_name: format!("{}-{}", HASH_EMBED_MODEL, DEFAULT_HASH_DIMENSIONS),
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    fnv1a_continue(FNV_OFFSET, bytes)
}

fn fnv1a_continue(mut hash: u64, bytes: &[u8]) -> u64 {
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.encode(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
