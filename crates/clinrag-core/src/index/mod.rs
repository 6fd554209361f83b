//! In-memory similarity index over knowledge case embeddings
//!
//! Readers take an `Arc` of the current snapshot and search it without
//! holding a lock; [`VectorIndex::build`] and [`VectorIndex::add`] publish a
//! fresh snapshot, so a search sees either the old or the new case set.

mod ann;

pub use ann::ANN_THRESHOLD;

use crate::db::vectors::{dot, normalize};
use crate::error::{ClinragError, Result};
use crate::knowledge::KnowledgeCase;
use ann::AnnGraph;
use std::sync::{Arc, Mutex, RwLock};

/// One scored case
#[derive(Debug, Clone)]
pub struct IndexHit {
    /// Insertion position, the tie-breaker for equal similarity
    pub position: usize,
    pub similarity: f32,
    pub case: Arc<KnowledgeCase>,
}

/// Immutable view of the indexed cases
pub struct IndexSnapshot {
    version: u64,
    dimensions: usize,
    cases: Vec<Arc<KnowledgeCase>>,
    unit_vectors: Vec<Vec<f32>>,
    ann: Option<AnnGraph>,
}

impl IndexSnapshot {
    fn new(version: u64, cases: Vec<Arc<KnowledgeCase>>, ann_threshold: usize) -> Result<Self> {
        let dimensions = cases.first().map(|c| c.embedding.len()).unwrap_or(0);
        let mut unit_vectors = Vec::with_capacity(cases.len());

        for case in &cases {
            if case.embedding.len() != dimensions {
                return Err(ClinragError::Index(format!(
                    "case {} has {} dimensions, expected {}",
                    case.id,
                    case.embedding.len(),
                    dimensions
                )));
            }
            unit_vectors.push(unit(&case.embedding, &case.id)?);
        }

        let ann = (cases.len() >= ann_threshold).then(|| AnnGraph::build(&unit_vectors));

        Ok(Self {
            version,
            dimensions,
            cases,
            unit_vectors,
            ann,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn cases(&self) -> &[Arc<KnowledgeCase>] {
        &self.cases
    }

    /// Top `k` cases by cosine similarity, highest first, ties by position
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        if k == 0 || self.cases.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            return Err(ClinragError::Index(format!(
                "query has {} dimensions, index has {}",
                query.len(),
                self.dimensions
            )));
        }
        let query = unit(query, "query")?;

        let positions: Vec<usize> = match &self.ann {
            Some(graph) => graph.candidates(&query, k),
            None => (0..self.cases.len()).collect(),
        };

        let mut hits: Vec<IndexHit> = positions
            .into_iter()
            .map(|position| IndexHit {
                position,
                similarity: dot(&query, &self.unit_vectors[position]).clamp(-1.0, 1.0),
                case: Arc::clone(&self.cases[position]),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

/// Unit vector, or the zero vector unchanged; non-finite input is rejected
fn unit(v: &[f32], label: &str) -> Result<Vec<f32>> {
    if v.iter().any(|x| !x.is_finite()) {
        return Err(ClinragError::Index(format!(
            "{} embedding contains non-finite values",
            label
        )));
    }
    Ok(normalize(v).unwrap_or_else(|| v.to_vec()))
}

/// Thread-safe, snapshot-swapping vector index
pub struct VectorIndex {
    current: RwLock<Option<Arc<IndexSnapshot>>>,
    writer: Mutex<()>,
    ann_threshold: usize,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::with_ann_threshold(ANN_THRESHOLD)
    }

    /// Index that switches to HNSW candidates at `threshold` cases
    pub fn with_ann_threshold(threshold: usize) -> Self {
        Self {
            current: RwLock::new(None),
            writer: Mutex::new(()),
            ann_threshold: threshold.max(1),
        }
    }

    /// Current snapshot; `IndexEmpty` if nothing was ever built
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        self.current
            .read()
            .map_err(|e| ClinragError::Index(format!("index lock poisoned: {}", e)))?
            .clone()
            .ok_or(ClinragError::IndexEmpty)
    }

    /// Replace the indexed cases. Input order becomes insertion order.
    pub fn build(&self, cases: Vec<KnowledgeCase>) -> Result<()> {
        let _writer = self.lock_writer()?;
        let version = self.next_version()?;
        let cases = cases.into_iter().map(Arc::new).collect();
        let snapshot = IndexSnapshot::new(version, cases, self.ann_threshold)?;
        tracing::debug!(
            "Publishing index v{} with {} cases",
            version,
            snapshot.len()
        );
        self.publish(snapshot)
    }

    /// Append one case after the existing ones
    pub fn add(&self, case: KnowledgeCase) -> Result<()> {
        let _writer = self.lock_writer()?;
        let version = self.next_version()?;

        let mut cases = match self.snapshot() {
            Ok(current) => {
                if !current.is_empty() && case.embedding.len() != current.dimensions() {
                    return Err(ClinragError::Index(format!(
                        "case {} has {} dimensions, index has {}",
                        case.id,
                        case.embedding.len(),
                        current.dimensions()
                    )));
                }
                current.cases.clone()
            }
            Err(ClinragError::IndexEmpty) => Vec::new(),
            Err(e) => return Err(e),
        };
        cases.push(Arc::new(case));

        self.publish(IndexSnapshot::new(version, cases, self.ann_threshold)?)
    }

    /// Search the current snapshot
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        self.snapshot()?.search(query, k)
    }

    pub fn is_built(&self) -> bool {
        self.current.read().map(|g| g.is_some()).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.snapshot().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Version of the published snapshot, 0 before the first build
    pub fn version(&self) -> u64 {
        self.snapshot().map(|s| s.version()).unwrap_or(0)
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.writer
            .lock()
            .map_err(|e| ClinragError::Index(format!("index writer lock poisoned: {}", e)))
    }

    fn next_version(&self) -> Result<u64> {
        match self.snapshot() {
            Ok(s) => Ok(s.version() + 1),
            Err(ClinragError::IndexEmpty) => Ok(1),
            Err(e) => Err(e),
        }
    }

    fn publish(&self, snapshot: IndexSnapshot) -> Result<()> {
        *self
            .current
            .write()
            .map_err(|e| ClinragError::Index(format!("index lock poisoned: {}", e)))? =
            Some(Arc::new(snapshot));
        Ok(())
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}
