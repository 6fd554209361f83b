//! Final diagnosis result assembly

use crate::cascade::CascadeMetadata;
use crate::parser::{Differential, ParsedDiagnosis, TriageLevel};
use crate::retrieval::RetrievalResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_DISCLAIMER: &str = "This is clinical decision support only. Final diagnosis and treatment decisions must be made by qualified healthcare professionals based on complete clinical assessment.";

/// Why a result should be read with extra care
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DegradedReason {
    /// Generated without any retrieved evidence
    NoEvidence,
    /// Answer came after this many cascade entries were passed over
    CascadeFallback { skipped_entries: usize },
}

/// Evidence case the result was generated from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub case_id: String,
    pub diagnosis: String,
    pub similarity: f32,
    /// Case id appears in the explanation or a rationale
    pub cited: bool,
}

/// Immutable diagnosis suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub id: String,
    pub fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub differentials: Vec<Differential>,
    pub triage_level: TriageLevel,
    pub explanation: String,
    pub confidence_score: f64,
    pub disclaimer: String,
    pub evidence: Vec<EvidenceRef>,
    pub generation: CascadeMetadata,
    #[serde(default)]
    pub degraded: Vec<DegradedReason>,
    /// Stored result this one was copied from for an identical presentation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_result: Option<String>,
}

impl DiagnosisResult {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    pub fn is_reused(&self) -> bool {
        self.source_result.is_some()
    }
}

/// Combines parsed output, evidence and cascade metadata
#[derive(Debug, Clone)]
pub struct DiagnosisAssembler {
    degraded_skip_threshold: usize,
}

impl DiagnosisAssembler {
    pub fn new(degraded_skip_threshold: usize) -> Self {
        Self {
            degraded_skip_threshold,
        }
    }

    pub fn assemble(
        &self,
        parsed: ParsedDiagnosis,
        retrieval: &RetrievalResult,
        generation: CascadeMetadata,
        fingerprint: Option<String>,
    ) -> DiagnosisResult {
        let mut degraded = Vec::new();
        if retrieval.is_empty() {
            degraded.push(DegradedReason::NoEvidence);
        }
        if self.degraded_skip_threshold > 0
            && generation.skipped_entries >= self.degraded_skip_threshold
        {
            degraded.push(DegradedReason::CascadeFallback {
                skipped_entries: generation.skipped_entries,
            });
        }

        let evidence = retrieval
            .iter()
            .map(|case| EvidenceRef {
                case_id: case.case_id.clone(),
                diagnosis: case.diagnosis.clone(),
                similarity: case.similarity,
                cited: parsed.explanation.contains(&case.case_id)
                    || parsed
                        .differentials
                        .iter()
                        .any(|d| d.rationale.contains(&case.case_id)),
            })
            .collect();

        let created_at = Utc::now();
        let id = result_id(fingerprint.as_deref(), &created_at, &generation.model);

        DiagnosisResult {
            id,
            fingerprint,
            created_at,
            differentials: parsed.differentials,
            triage_level: parsed.triage_level,
            explanation: parsed.explanation,
            confidence_score: parsed.confidence_score,
            disclaimer: parsed
                .disclaimer
                .unwrap_or_else(|| DEFAULT_DISCLAIMER.to_string()),
            evidence,
            generation,
            degraded,
            source_result: None,
        }
    }

    /// New result with its own id and timestamp, pointing back at `source`
    pub fn reuse(&self, source: &DiagnosisResult) -> DiagnosisResult {
        let created_at = Utc::now();
        // Chains point at the original, not at an earlier copy
        let origin = source.source_result.as_deref().unwrap_or(&source.id);

        DiagnosisResult {
            id: result_id(source.fingerprint.as_deref(), &created_at, origin),
            created_at,
            source_result: Some(origin.to_string()),
            ..source.clone()
        }
    }
}

impl Default for DiagnosisAssembler {
    fn default() -> Self {
        Self::new(2)
    }
}

fn result_id(fingerprint: Option<&str>, created_at: &DateTime<Utc>, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.unwrap_or("").as_bytes());
    hasher.update(created_at.to_rfc3339().as_bytes());
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();
    let short: String = digest[..6].iter().map(|b| format!("{:02x}", b)).collect();
    format!("dx-{}-{}", created_at.format("%Y%m%d%H%M%S"), short)
}
