//! Database layer for clinrag
//!
//! SQLite storage for:
//! - Encoded knowledge base cases
//! - Daily generation quota counters
//! - Produced diagnosis results
//! - Queued diagnosis jobs

mod cases;
mod jobs;
mod quota;
mod results;
mod schema;
pub mod vectors;

pub use cases::CaseStoreInfo;
pub use jobs::{DiagnosisJob, JobStatus};
pub use results::StoredDiagnosis;
pub use schema::Database;
use std::path::PathBuf;

impl Database {
    /// Get the default database path
    pub fn default_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CACHE_DIR_NAME)
            .join("clinrag.sqlite")
    }
}
