//! Knowledge base cases and their sources
//!
//! A knowledge base is an ordered list of historical cases. Order matters:
//! it is the insertion order the vector index uses to break similarity ties.

mod loader;

pub use loader::{add_case, load_knowledge_base, restore_knowledge_base, LoadStats};

use crate::error::{ClinragError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

const SAMPLE_CASES: &str = include_str!("../../data/sample_cases.yaml");

/// Case as authored in a knowledge-base file, before encoding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseRecord {
    #[serde(alias = "case_id")]
    pub id: String,
    #[serde(alias = "summary_text")]
    pub narrative: String,
    pub diagnosis: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub outcome: Option<String>,
}

/// Encoded, read-only knowledge case
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeCase {
    pub id: String,
    pub narrative: String,
    pub diagnosis: String,
    pub outcome: Option<String>,
    pub embedding: Vec<f32>,
}

impl KnowledgeCase {
    pub fn from_record(record: CaseRecord, embedding: Vec<f32>) -> Self {
        Self {
            id: record.id,
            narrative: record.narrative,
            diagnosis: record.diagnosis,
            outcome: record.outcome,
            embedding,
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Bundled sample cases
pub fn sample_cases() -> Result<Vec<CaseRecord>> {
    parse_yaml(SAMPLE_CASES)
}

/// Read case records from a YAML, JSON or CSV file (by extension)
pub fn read_case_file(path: impl AsRef<Path>) -> Result<Vec<CaseRecord>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let content = std::fs::read_to_string(path).map_err(|e| {
        ClinragError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read knowledge base {:?}: {}", path, e),
        ))
    })?;

    let records = match extension.as_str() {
        "yml" | "yaml" => parse_yaml(&content)?,
        "json" => serde_json::from_str(&content)?,
        "csv" => parse_csv(&content)?,
        other => {
            return Err(ClinragError::InvalidInput(format!(
                "Unsupported knowledge base format: {:?}",
                other
            )))
        }
    };

    validate_records(&records)?;
    Ok(records)
}

fn parse_yaml(content: &str) -> Result<Vec<CaseRecord>> {
    Ok(serde_yaml::from_str(content)?)
}

fn parse_csv(content: &str) -> Result<Vec<CaseRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for (row_num, row) in reader.deserialize::<CaseRecord>().enumerate() {
        let record = row.map_err(|e| {
            ClinragError::InvalidInput(format!("Failed to parse CSV row {}: {}", row_num + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Reject duplicate ids and empty narratives
pub fn validate_records(records: &[CaseRecord]) -> Result<()> {
    let mut seen = HashSet::new();
    for record in records {
        if record.id.trim().is_empty() {
            return Err(ClinragError::InvalidInput("case with empty id".to_string()));
        }
        if record.narrative.trim().is_empty() {
            return Err(ClinragError::InvalidInput(format!(
                "case {} has an empty narrative",
                record.id
            )));
        }
        if !seen.insert(record.id.as_str()) {
            return Err(ClinragError::InvalidInput(format!(
                "duplicate case id: {}",
                record.id
            )));
        }
    }
    Ok(())
}
