//! Evidence retrieval: summary vector to ranked, de-duplicated cases

use crate::error::Result;
use crate::index::VectorIndex;
use crate::knowledge::KnowledgeCase;
use crate::llm::Embedder;
use crate::summary::ClinicalSummary;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// One evidence case with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedCase {
    pub case_id: String,
    pub narrative: String,
    pub diagnosis: String,
    pub outcome: Option<String>,
    pub similarity: f32,
}

impl RetrievedCase {
    fn from_case(case: &KnowledgeCase, similarity: f32) -> Self {
        Self {
            case_id: case.id.clone(),
            narrative: case.narrative.clone(),
            diagnosis: case.diagnosis.clone(),
            outcome: case.outcome.clone(),
            similarity,
        }
    }
}

/// Evidence for one request, highest similarity first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub cases: Vec<RetrievedCase>,
    /// Version of the index snapshot that answered
    pub index_version: u64,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetrievedCase> {
        self.cases.iter()
    }
}

/// Encoder plus index
pub struct CaseRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
}

impl CaseRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Evidence for an already-encoded summary
    pub fn retrieve(
        &self,
        summary: &ClinicalSummary,
        k: usize,
        min_similarity: f32,
    ) -> Result<RetrievalResult> {
        self.retrieve_vector(&summary.embedding, k, min_similarity)
    }

    /// Encode free text, then retrieve
    pub async fn retrieve_text(
        &self,
        text: &str,
        k: usize,
        min_similarity: f32,
    ) -> Result<RetrievalResult> {
        let embedding = self.embedder.embed(text).await?;
        self.retrieve_vector(&embedding, k, min_similarity)
    }

    fn retrieve_vector(
        &self,
        embedding: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> Result<RetrievalResult> {
        let snapshot = self.index.snapshot()?;
        if k == 0 {
            return Ok(RetrievalResult {
                cases: Vec::new(),
                index_version: snapshot.version(),
            });
        }

        // Over-fetch so duplicates and filtered hits don't starve the result
        let hits = snapshot.search(embedding, k.saturating_mul(2).min(snapshot.len()).max(k))?;

        let mut seen = HashSet::new();
        let cases: Vec<RetrievedCase> = hits
            .into_iter()
            .filter(|hit| hit.similarity >= min_similarity)
            .filter(|hit| seen.insert(hit.case.id.clone()))
            .take(k)
            .map(|hit| RetrievedCase::from_case(&hit.case, hit.similarity))
            .collect();

        tracing::debug!(
            "Retrieved {} cases (k={}, min_similarity={}) from index v{}",
            cases.len(),
            k,
            min_similarity,
            snapshot.version()
        );

        Ok(RetrievalResult {
            cases,
            index_version: snapshot.version(),
        })
    }
}
