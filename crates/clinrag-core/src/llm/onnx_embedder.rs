//! all-MiniLM-L6-v2 sentence encoder on ONNX Runtime
//!
//! Mean-pools the last hidden state over the attention mask and
//! L2-normalizes it, which reproduces sentence-transformers output for this
//! model. Needs `model.onnx` and `tokenizer.json` in the model directory.

use super::traits::ensure_encodable;
use super::Embedder;
use crate::db::vectors::normalize;
use crate::error::{ClinragError, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::{Tokenizer, TruncationParams};

pub const ONNX_EMBED_MODEL: &str = "all-MiniLM-L6-v2";
pub const MINILM_DIMENSIONS: usize = 384;

/// sentence-transformers max_seq_length for MiniLM-L6-v2
const MAX_TOKENS: usize = 256;

pub struct OnnxEmbedder {
    // Session::run takes &mut self
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl OnnxEmbedder {
    /// Load the model and tokenizer from `model_dir`
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        for path in [&model_path, &tokenizer_path] {
            if !path.exists() {
                return Err(ClinragError::Config(format!(
                    "embedding model file not found: {}",
                    path.display()
                )));
            }
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| ClinragError::Config(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e: ort::Error| ClinragError::Config(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| {
                ClinragError::Config(format!("failed to load ONNX model: {}", e))
            })?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ClinragError::Config(format!("failed to load tokenizer: {}", e)))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| ClinragError::Config(format!("invalid tokenizer truncation: {}", e)))?;

        tracing::info!("ONNX embedder loaded from {}", model_dir.display());

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn infer(&self, text: &str) -> Result<Vec<f32>> {
        ensure_encodable(text)?;

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ClinragError::Encoding(format!("tokenization failed: {}", e)))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();
        let seq_len = input_ids.len();

        let ids = ndarray::Array2::from_shape_vec((1, seq_len), input_ids).map_err(encoding_err)?;
        let mask = ndarray::Array2::from_shape_vec((1, seq_len), attention_mask.clone())
            .map_err(encoding_err)?;
        let types =
            ndarray::Array2::from_shape_vec((1, seq_len), token_type_ids).map_err(encoding_err)?;

        let ids = TensorRef::from_array_view(&ids).map_err(encoding_err)?;
        let mask = TensorRef::from_array_view(&mask).map_err(encoding_err)?;
        let types = TensorRef::from_array_view(&types).map_err(encoding_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClinragError::Encoding("ONNX session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![ids, mask, types])
            .map_err(|e| ClinragError::Encoding(format!("ONNX inference failed: {}", e)))?;

        // [1, seq_len, 384]
        let (shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(encoding_err)?;
        if shape.len() != 3 || shape[2] as usize != MINILM_DIMENSIONS {
            return Err(ClinragError::Encoding(format!(
                "unexpected ONNX output shape {:?}",
                shape
            )));
        }

        mean_pool(hidden, &attention_mask, MINILM_DIMENSIONS)
    }
}

fn encoding_err(e: impl std::fmt::Display) -> ClinragError {
    ClinragError::Encoding(e.to_string())
}

/// Attention-masked mean over token vectors, then L2 normalization
fn mean_pool(hidden: &[f32], mask: &[i64], dims: usize) -> Result<Vec<f32>> {
    if hidden.len() < mask.len() * dims {
        return Err(ClinragError::Encoding(format!(
            "hidden state has {} values for {} tokens",
            hidden.len(),
            mask.len()
        )));
    }

    let mut pooled = vec![0.0f32; dims];
    let mut mask_sum = 0.0f32;
    for (token, &m) in mask.iter().enumerate() {
        let weight = m as f32;
        mask_sum += weight;
        let row = &hidden[token * dims..(token + 1) * dims];
        for (p, h) in pooled.iter_mut().zip(row) {
            *p += h * weight;
        }
    }
    if mask_sum > 0.0 {
        pooled.iter_mut().for_each(|p| *p /= mask_sum);
    }

    normalize(&pooled)
        .ok_or_else(|| ClinragError::Encoding("model produced a zero vector".to_string()))
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // CPU-bound; short clinical texts keep this cheap
        self.infer(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.infer(t)).collect()
    }

    fn dimensions(&self) -> usize {
        MINILM_DIMENSIONS
    }

    fn model_name(&self) -> &str {
        ONNX_EMBED_MODEL
    }
}
