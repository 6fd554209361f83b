//! Shared command setup: configuration, database and index restore

use crate::app::OutputFormat;
use anyhow::{Context, Result};
use clinrag_core::knowledge::restore_knowledge_base;
use clinrag_core::llm::embedder_from_config;
use clinrag_core::{ClinragError, Config, Database, Embedder, PatientSnapshot, VectorIndex};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct AppContext {
    pub config: Config,
    pub format: OutputFormat,
    pub db_path: PathBuf,
}

impl AppContext {
    pub fn load(config_path: Option<&Path>, format: OutputFormat) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("config file not found: {}", path.display());
                }
                Config::load_from(path)
                    .with_context(|| format!("failed to load config {}", path.display()))?
            }
            None => Config::load()?,
        };

        // Use CLINRAG_DB env var if set, otherwise use default
        let db_path = std::env::var("CLINRAG_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Database::default_path());

        Ok(Self {
            config,
            format,
            db_path,
        })
    }

    pub fn open_db(&self) -> Result<Database> {
        let db = Database::open(&self.db_path)?;
        db.initialize()?;
        Ok(db)
    }

    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        Ok(embedder_from_config(&self.config.embedder)?)
    }

    /// Index over the stored knowledge base; unbuilt when nothing was loaded
    pub async fn restore_index(
        &self,
        db: &Database,
        embedder: &dyn Embedder,
    ) -> Result<Arc<VectorIndex>> {
        let index = Arc::new(VectorIndex::new());
        let stats = restore_knowledge_base(db, embedder, &index).await?;
        if stats.reencoded {
            tracing::info!(
                "Re-encoded {} stored cases with {}",
                stats.cases,
                stats.model
            );
        }
        Ok(index)
    }
}

/// Read a patient snapshot from YAML or JSON
pub fn read_patient(path: &Path) -> Result<PatientSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read patient file {}", path.display()))?;
    let patient = serde_yaml::from_str(&content).map_err(|e| {
        ClinragError::InvalidInput(format!("invalid patient file {}: {}", path.display(), e))
    })?;
    Ok(patient)
}
