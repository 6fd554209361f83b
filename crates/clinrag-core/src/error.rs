//! Error types for clinrag

use crate::cascade::EntryOutcome;
use crate::llm::TransportError;
use thiserror::Error;

/// Result type alias using ClinragError
pub type Result<T> = std::result::Result<T, ClinragError>;

/// Error type alias for convenience
pub type Error = ClinragError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
    pub const DIAGNOSIS_UNAVAILABLE: i32 = 4;
}

/// Main error type for clinrag
#[derive(Debug, Error)]
pub enum ClinragError {
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Vector index has not been built")]
    IndexEmpty,

    #[error("Index error: {0}")]
    Index(String),

    #[error("Quota blocked for {model} ({credential})")]
    QuotaBlocked { model: String, credential: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Cascade exhausted after {} entries", outcomes.len())]
    CascadeExhausted { outcomes: Vec<EntryOutcome> },

    #[error("Deadline exceeded after {} entries", outcomes.len())]
    DeadlineExceeded { outcomes: Vec<EntryOutcome> },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Case not found: {0}")]
    CaseNotFound(String),

    #[error("Diagnosis not found: {0}")]
    DiagnosisNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ClinragError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CaseNotFound(_) | Self::DiagnosisNotFound(_) | Self::JobNotFound(_) => {
                exit_codes::NOT_FOUND
            }
            Self::InvalidInput(_) | Self::Config(_) => exit_codes::INVALID_INPUT,
            Self::CascadeExhausted { .. } | Self::DeadlineExceeded { .. } | Self::IndexEmpty => {
                exit_codes::DIAGNOSIS_UNAVAILABLE
            }
            _ => exit_codes::GENERAL_ERROR,
        }
    }

    /// Reason shown when a diagnosis cannot be produced, if this error
    /// means "diagnosis unavailable" rather than a local fault.
    pub fn unavailable_reason(&self) -> Option<String> {
        match self {
            Self::CascadeExhausted { outcomes } => Some(format!(
                "all {} cascade entries failed ({})",
                outcomes.len(),
                summarize_outcomes(outcomes)
            )),
            Self::DeadlineExceeded { outcomes } => Some(format!(
                "request deadline exceeded after {} entries ({})",
                outcomes.len(),
                summarize_outcomes(outcomes)
            )),
            Self::IndexEmpty => Some("knowledge base index has not been built".to_string()),
            Self::Encoding(msg) => Some(format!("summary could not be encoded: {}", msg)),
            _ => None,
        }
    }

    /// Per-entry cascade log carried by cascade failures
    pub fn outcomes(&self) -> &[EntryOutcome] {
        match self {
            Self::CascadeExhausted { outcomes } | Self::DeadlineExceeded { outcomes } => outcomes,
            _ => &[],
        }
    }
}

fn summarize_outcomes(outcomes: &[EntryOutcome]) -> String {
    if outcomes.is_empty() {
        return "no entries attempted".to_string();
    }
    outcomes
        .iter()
        .map(|o| format!("{}/{}: {}", o.model, o.credential, o.state))
        .collect::<Vec<_>>()
        .join(", ")
}
