//! Clinrag Core Library
//!
//! Retrieval-augmented diagnosis suggestions for clinical decision support.
//!
//! # Features
//! - Deterministic embedding of clinical summaries and knowledge cases
//! - Snapshot-swapped cosine similarity index with optional HNSW candidates
//! - Per-(model, credential) daily quota tracking backed by SQLite
//! - Cascading fallback across models and credentials with retry and backoff
//! - Strict validation of generated differential diagnoses

pub mod cascade;
pub mod clock;
pub mod config;
pub mod db;
pub mod diagnosis;
pub mod error;
pub mod index;
pub mod knowledge;
pub mod llm;
pub mod parser;
pub mod prompt;
pub mod quota;
pub mod retrieval;
pub mod service;
pub mod summary;

pub use cascade::{
    AttemptState, CascadeController, CascadeEntry, CascadeMetadata, CascadePlan, CascadeSuccess,
    EntryOutcome, RetryPolicy,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Config, Credential, CredentialConfig, LLMServiceConfig};
pub use db::{Database, DiagnosisJob, JobStatus};
pub use diagnosis::{DegradedReason, DiagnosisAssembler, DiagnosisResult, EvidenceRef};
pub use error::{ClinragError, Error, Result};
pub use index::{IndexHit, VectorIndex};
pub use knowledge::{CaseRecord, KnowledgeCase, LoadStats};
pub use llm::{
    ChatMessage, Embedder, GenerationRequest, GenerationTransport, HashEmbedder, HttpEmbedder,
    HttpTransport, TransportError,
};
pub use parser::{Differential, ParsedDiagnosis, ResponseParser, TriageLevel};
pub use prompt::PromptBuilder;
pub use quota::{MemoryQuotaStore, QuotaRecord, QuotaStore, QuotaTracker, SqliteQuotaStore};
pub use retrieval::{CaseRetriever, RetrievalResult, RetrievedCase};
pub use service::{DiagnosisOutcome, DiagnosisReport, DiagnosisService, RetrievalParams};
pub use summary::{ClinicalSummary, PatientSnapshot, Vitals};

/// Default cache directory name
pub const CACHE_DIR_NAME: &str = "clinrag";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "clinrag";
