//! HNSW candidate generation for large knowledge bases

use crate::db::vectors::dot;
use instant_distance::{Builder, HnswMap, Search};

/// Case count from which an HNSW graph is built alongside the exact vectors.
/// Below it, brute-force is fast enough.
pub const ANN_THRESHOLD: usize = 1000;

/// Candidates fetched per requested hit before exact re-scoring
const CANDIDATE_FACTOR: usize = 3;

/// Fixed so rebuilding from the same cases yields the same graph
const HNSW_SEED: u64 = 0x5eed_c1a5;

/// Unit-length vector implementing instant_distance::Point
#[derive(Clone)]
struct UnitPoint {
    values: Vec<f32>,
}

impl instant_distance::Point for UnitPoint {
    fn distance(&self, other: &Self) -> f32 {
        // Inputs are normalized, so cosine distance is 1 - dot
        1.0 - dot(&self.values, &other.values)
    }
}

/// HNSW graph mapping to case positions
pub(super) struct AnnGraph {
    map: HnswMap<UnitPoint, usize>,
}

impl AnnGraph {
    pub(super) fn build(vectors: &[Vec<f32>]) -> Self {
        let points: Vec<UnitPoint> = vectors
            .iter()
            .map(|v| UnitPoint { values: v.clone() })
            .collect();
        let positions: Vec<usize> = (0..vectors.len()).collect();

        let map = Builder::default().seed(HNSW_SEED).build(points, positions);
        tracing::info!("Built ANN index with {} cases", vectors.len());
        Self { map }
    }

    /// Candidate positions for a normalized query, nearest first
    pub(super) fn candidates(&self, query: &[f32], k: usize) -> Vec<usize> {
        let point = UnitPoint {
            values: query.to_vec(),
        };
        let mut search = Search::default();

        self.map
            .search(&point, &mut search)
            .take(k.saturating_mul(CANDIDATE_FACTOR))
            .map(|item| *item.value)
            .collect()
    }
}
