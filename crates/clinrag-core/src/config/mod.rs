//! Configuration management

pub mod credentials;

use crate::cascade::{CascadeEntry, CascadePlan, RetryPolicy};
use crate::error::{ClinragError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use credentials::{Credential, CredentialConfig};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Embedding encoder used for cases and summaries
    #[serde(default)]
    pub embedder: EmbedderConfig,

    /// Generation service configuration
    #[serde(default)]
    pub llm: LLMServiceConfig,

    /// Credentials available to the cascade, by identifier
    #[serde(default = "default_credentials")]
    pub credentials: Vec<CredentialConfig>,

    /// Fallback order across models and credentials
    #[serde(default)]
    pub cascade: CascadeConfig,

    /// Per-entry retry budget and backoff
    #[serde(default)]
    pub retry: RetryConfig,

    /// Evidence retrieval parameters
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// End-to-end deadline for one diagnosis request
    #[serde(default)]
    pub deadline_secs: Option<u64>,

    /// Skipped cascade entries after which a result is flagged degraded
    #[serde(default = "default_degraded_skip_threshold")]
    pub degraded_skip_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedder: EmbedderConfig::default(),
            llm: LLMServiceConfig::default(),
            credentials: default_credentials(),
            cascade: CascadeConfig::default(),
            retry: RetryConfig::default(),
            retrieval: RetrievalConfig::default(),
            deadline_secs: None,
            degraded_skip_threshold: default_degraded_skip_threshold(),
        }
    }
}

fn default_degraded_skip_threshold() -> usize {
    2
}

fn default_credentials() -> Vec<CredentialConfig> {
    vec![CredentialConfig {
        id: "default".to_string(),
        api_key_env: "CLINRAG_LLM_API_KEY".to_string(),
    }]
}

/// Which encoder implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderProvider {
    /// Local feature-hashing encoder (offline, deterministic)
    #[default]
    Hash,
    /// OpenAI-compatible embeddings endpoint
    Http,
    /// Local all-MiniLM-L6-v2 through ONNX Runtime (`onnx-embeddings` feature)
    Onnx,
}

/// Embedding encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    #[serde(default)]
    pub provider: EmbedderProvider,

    /// Vector dimension produced by the encoder
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Base URL of the embeddings service (http provider only)
    #[serde(default)]
    pub url: Option<String>,

    /// Model name reported by the encoder and sent to the service
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Environment variable holding the embeddings API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,

    /// Directory with `model.onnx` and `tokenizer.json` (onnx provider only)
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderProvider::default(),
            dimensions: default_dimensions(),
            url: std::env::var("CLINRAG_EMBEDDING_URL").ok(),
            model: default_embedding_model(),
            api_key_env: None,
            timeout_secs: default_embed_timeout(),
            model_dir: None,
        }
    }
}

impl EmbedderConfig {
    /// Configured ONNX model directory, or the one under the data dir
    pub fn onnx_model_dir(&self) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(crate::CACHE_DIR_NAME)
                .join("models")
                .join("all-MiniLM-L6-v2")
        })
    }
}

fn default_dimensions() -> usize {
    384
}

fn default_embedding_model() -> String {
    std::env::var("CLINRAG_EMBEDDING_MODEL")
        .unwrap_or_else(|_| "sentence-transformers/all-MiniLM-L6-v2".to_string())
}

fn default_embed_timeout() -> u64 {
    30
}

/// Generation service configuration for external inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMServiceConfig {
    /// Base URL of the OpenAI-compatible service
    #[serde(default = "default_llm_url")]
    pub url: String,

    /// Per-attempt request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl LLMServiceConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LLMServiceConfig {
    fn default() -> Self {
        Self {
            url: default_llm_url(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_llm_url() -> String {
    std::env::var("CLINRAG_LLM_URL").unwrap_or_else(|_| "https://api.groq.com/openai".to_string())
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

/// Model with its per-credential daily limit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelLimit {
    pub model: String,
    pub daily_limit: u32,
}

/// Cascade order, either explicit or expanded from models x credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Explicit ordered entries; takes precedence when non-empty
    #[serde(default)]
    pub entries: Vec<CascadeEntry>,

    /// Models tried in order, each across every listed credential
    #[serde(default = "default_models")]
    pub models: Vec<ModelLimit>,

    /// Credential ids used for expansion; all configured credentials when empty
    #[serde(default)]
    pub credentials: Vec<String>,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            models: default_models(),
            credentials: Vec::new(),
        }
    }
}

fn default_models() -> Vec<ModelLimit> {
    vec![
        ModelLimit {
            model: "llama-3.3-70b-versatile".to_string(),
            daily_limit: 1000,
        },
        ModelLimit {
            model: "qwen/qwen3-32b".to_string(),
            daily_limit: 1000,
        },
        ModelLimit {
            model: "llama-3.1-8b-instant".to_string(),
            daily_limit: 14400,
        },
    ]
}

impl CascadeConfig {
    /// Resolve the ordered entry list.
    ///
    /// Expansion is model-major: every credential is tried for the first
    /// model before moving to the next model.
    pub fn resolve(&self, credentials: &[CredentialConfig]) -> Result<Vec<CascadeEntry>> {
        if !self.entries.is_empty() {
            for entry in &self.entries {
                if !credentials.iter().any(|c| c.id == entry.credential) {
                    return Err(ClinragError::Config(format!(
                        "Cascade entry {}/{} references unknown credential",
                        entry.model, entry.credential
                    )));
                }
            }
            return Ok(self.entries.clone());
        }

        let credential_ids: Vec<&str> = if self.credentials.is_empty() {
            credentials.iter().map(|c| c.id.as_str()).collect()
        } else {
            for id in &self.credentials {
                if !credentials.iter().any(|c| &c.id == id) {
                    return Err(ClinragError::Config(format!(
                        "Cascade references unknown credential: {}",
                        id
                    )));
                }
            }
            self.credentials.iter().map(String::as_str).collect()
        };

        let entries = self
            .models
            .iter()
            .flat_map(|m| {
                credential_ids.iter().map(move |cred| CascadeEntry {
                    model: m.model.clone(),
                    credential: cred.to_string(),
                    daily_limit: m.daily_limit,
                })
            })
            .collect();

        Ok(entries)
    }
}

/// Retry budget per cascade entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per entry, first call included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    8000
}

/// Evidence retrieval parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,

    #[serde(default)]
    pub min_similarity: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            min_similarity: 0.0,
        }
    }
}

fn default_k() -> usize {
    5
}

impl Config {
    /// Load config from default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load config from a path, falling back to defaults when absent
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Validated cascade plan built from credentials and cascade sections
    pub fn cascade_plan(&self) -> Result<CascadePlan> {
        let entries = self.cascade.resolve(&self.credentials)?;
        CascadePlan::new(entries)
    }

    /// Credentials with secrets resolved from the environment
    pub fn resolve_credentials(&self) -> Vec<Credential> {
        self.credentials.iter().map(CredentialConfig::resolve).collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}
