//! Vector index traits and core types.

use crate::error::DbResult;
use serde::{Deserialize, Serialize};

// ============================================================================
// VectorId
// ============================================================================

/// Identifier of a vector in the index.
///
/// VRD keys vectors by the report's content-hash identifier, so this wraps the
/// hex string rather than a numeric row id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorId(pub String);

impl VectorId {
    /// Create a new vector ID.
    pub fn new(id: impl Into<String>) -> Self {
        VectorId(id.into())
    }

    /// Borrow the underlying identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VectorId {
    fn from(id: &str) -> Self {
        VectorId(id.to_string())
    }
}

impl From<String> for VectorId {
    fn from(id: String) -> Self {
        VectorId(id)
    }
}

impl std::fmt::Display for VectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// VectorMetric
// ============================================================================

/// Distance metric for vector similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorMetric {
    /// Cosine similarity (default).
    #[default]
    Cosine,
    /// Dot product.
    Dot,
    /// Euclidean (L2) distance.
    L2,
}

impl VectorMetric {
    /// Get the metric name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorMetric::Cosine => "cosine",
            VectorMetric::Dot => "dot",
            VectorMetric::L2 => "l2",
        }
    }
}

impl std::fmt::Display for VectorMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// VectorInsert / VectorSearchResult
// ============================================================================

/// A vector to insert or update in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorInsert {
    /// Identifier for this vector.
    pub id: VectorId,

    /// The embedding vector.
    pub vector: Vec<f32>,
}

impl VectorInsert {
    pub fn new(id: impl Into<VectorId>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
        }
    }
}

/// A single result from a vector similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchResult {
    /// Identifier of the matched vector.
    pub id: VectorId,

    /// Similarity score (higher is better; L2 distances are negated).
    pub score: f32,
}

impl VectorSearchResult {
    pub fn new(id: impl Into<VectorId>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

// ============================================================================
// VectorIndexBackend Trait
// ============================================================================

/// Core trait for dense vector index backends.
///
/// ## Implementation Notes
///
/// - Backends must be thread-safe (`Send + Sync`); queries run from many
///   decision sessions at once.
/// - `query` returns results sorted by score descending, ties broken by id
///   ascending.
/// - Upsert semantics: a vector with an existing id replaces the old one.
pub trait VectorIndexBackend: Send + Sync {
    /// Query the index for the `limit` nearest vectors.
    fn query(&self, embedding: &[f32], limit: usize) -> DbResult<Vec<VectorSearchResult>>;

    /// Insert or update vectors in the index.
    fn upsert(&self, vectors: &[VectorInsert]) -> DbResult<()>;

    /// Delete vectors by their IDs.
    fn delete(&self, ids: &[VectorId]) -> DbResult<()>;

    /// Check whether a vector with this id is present.
    fn contains(&self, id: &VectorId) -> DbResult<bool>;

    /// Get the number of vectors in the index.
    fn len(&self) -> DbResult<usize>;

    /// Check if the index is empty.
    fn is_empty(&self) -> DbResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Get the dimension of vectors in this index.
    fn dimension(&self) -> usize;

    /// Get the distance metric used by this index.
    fn metric(&self) -> VectorMetric;
}
