//! In-memory vector index backend.
//!
//! Vectors live in a `RwLock<HashMap>` and search is a linear scan. Many
//! readers may query concurrently; upserts take the write lock briefly.
//! Persistence is handled by the record log, which replays vectors into this
//! index on startup.

use super::config::VectorIndexConfig;
use super::traits::{VectorId, VectorIndexBackend, VectorInsert, VectorMetric, VectorSearchResult};
use crate::error::{DbError, DbResult};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, trace};

/// Exact in-memory vector index.
pub struct MemoryVectorIndex {
    dimension: usize,
    metric: VectorMetric,
    vectors: RwLock<HashMap<VectorId, Vec<f32>>>,
}

impl MemoryVectorIndex {
    /// Create an empty index.
    pub fn new(config: &VectorIndexConfig) -> Self {
        Self {
            dimension: config.dimension,
            metric: config.metric,
            vectors: RwLock::new(HashMap::new()),
        }
    }

    fn compute_similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.metric {
            VectorMetric::Cosine => cosine_similarity(a, b),
            VectorMetric::Dot => dot_product(a, b),
            VectorMetric::L2 => -euclidean_distance(a, b), // Negate so higher is better
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> DbResult<()> {
        if vector.len() != self.dimension {
            return Err(DbError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl VectorIndexBackend for MemoryVectorIndex {
    fn query(&self, embedding: &[f32], limit: usize) -> DbResult<Vec<VectorSearchResult>> {
        trace!("Querying MemoryVectorIndex, limit={}", limit);
        self.check_dimension(embedding)?;

        let vectors = self
            .vectors
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))?;

        let mut scored: Vec<(f32, &VectorId)> = vectors
            .iter()
            .map(|(id, v)| (self.compute_similarity(embedding, v), id))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(b.1))
        });

        let results: Vec<VectorSearchResult> = scored
            .into_iter()
            .take(limit)
            .map(|(score, id)| VectorSearchResult::new(id.clone(), score))
            .collect();

        trace!("Found {} results", results.len());
        Ok(results)
    }

    fn upsert(&self, inserts: &[VectorInsert]) -> DbResult<()> {
        debug!("Upserting {} vectors", inserts.len());

        for insert in inserts {
            self.check_dimension(&insert.vector)?;
        }

        let mut stored = self
            .vectors
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))?;

        for insert in inserts {
            stored.insert(insert.id.clone(), insert.vector.clone());
        }
        Ok(())
    }

    fn delete(&self, ids: &[VectorId]) -> DbResult<()> {
        debug!("Deleting {} vectors", ids.len());

        let mut stored = self
            .vectors
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))?;

        for id in ids {
            stored.remove(id);
        }
        Ok(())
    }

    fn contains(&self, id: &VectorId) -> DbResult<bool> {
        let stored = self
            .vectors
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))?;
        Ok(stored.contains_key(id))
    }

    fn len(&self) -> DbResult<usize> {
        let stored = self
            .vectors
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))?;
        Ok(stored.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> VectorMetric {
        self.metric
    }
}

// ============================================================================
// Similarity Functions
// ============================================================================

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

// ============================================================================
// Tests
// ============================================================================
