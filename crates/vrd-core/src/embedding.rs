//! Embedder abstraction for VRD.
//!
//! This module provides:
//! - [`SparseVector`] - term → weight map used by the lexical index
//! - [`EmbeddingPair`] - dense + sparse representation of one text
//! - [`Embedder`] - trait implemented by embedding providers
//! - [`SparseEncoder`] - BM25-tokenizer based sparse encoding
//! - [`HashingEmbedder`] - deterministic feature-hashing embedder
//!
//! The engine never generates embeddings itself: callers plug in an
//! [`Embedder`]. The same embedder must be used for ingestion and scanning,
//! otherwise dense scores are meaningless.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bm25::{Tokenizer, TokenizerConfig};
use crate::errors::{VrdError, VrdResult};

// ============================================================================
// SparseVector
// ============================================================================

/// Sparse term-weight vector. Ordered by term, so iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SparseVector(BTreeMap<String, f32>);

impl SparseVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from (term, weight) pairs. Repeated terms accumulate; non-positive
    /// weights are dropped.
    pub fn from_weights<I, S>(weights: I) -> Self
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (term, weight) in weights {
            if weight > 0.0 {
                *map.entry(term.into()).or_insert(0.0) += weight;
            }
        }
        Self(map)
    }

    pub fn get(&self, term: &str) -> Option<f32> {
        self.0.get(term).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(t, w)| (t.as_str(), *w))
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Sum of weights; the document length seen by BM25.
    pub fn total_weight(&self) -> f32 {
        self.0.values().sum()
    }
}

// ============================================================================
// EmbeddingPair
// ============================================================================

/// Dense and sparse representation of one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingPair {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
}

impl EmbeddingPair {
    pub fn new(dense: Vec<f32>, sparse: SparseVector) -> Self {
        Self { dense, sparse }
    }
}

// ============================================================================
// Embedder Trait
// ============================================================================

/// Trait for embedding providers. Must be deterministic for a given text.
pub trait Embedder: Send + Sync {
    /// Identifier of the underlying model, recorded in logs.
    fn model_id(&self) -> &str;

    /// Dense vector dimension.
    fn dimension(&self) -> usize;

    /// Embed a single text.
    fn embed(&self, text: &str) -> VrdResult<EmbeddingPair>;

    /// Embed several texts. The default calls [`Embedder::embed`] in order.
    fn embed_batch(&self, texts: &[String]) -> VrdResult<Vec<EmbeddingPair>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Check an embedder's output against its declared dimension.
pub(crate) fn checked_embed(embedder: &dyn Embedder, text: &str) -> VrdResult<EmbeddingPair> {
    let pair = embedder.embed(text).map_err(|e| match e {
        e @ VrdError::EmbeddingFailed { .. } => e,
        other => VrdError::embedding_failed(other.to_string()),
    })?;
    if pair.dense.len() != embedder.dimension() {
        return Err(VrdError::embedding_failed(format!(
            "embedder `{}` returned {} dimensions, expected {}",
            embedder.model_id(),
            pair.dense.len(),
            embedder.dimension()
        )));
    }
    if pair.dense.iter().any(|v| !v.is_finite()) {
        return Err(VrdError::embedding_failed(format!(
            "embedder `{}` returned a non-finite value",
            embedder.model_id()
        )));
    }
    Ok(pair)
}

// ============================================================================
// SparseEncoder
// ============================================================================

/// Sparse encoding by term counts over the BM25 tokenizer.
#[derive(Debug)]
pub struct SparseEncoder {
    tokenizer: Tokenizer,
}

impl SparseEncoder {
    pub fn new(config: TokenizerConfig) -> Self {
        Self {
            tokenizer: Tokenizer::new(config),
        }
    }

    pub fn encode(&self, text: &str) -> SparseVector {
        SparseVector::from_weights(
            self.tokenizer
                .term_counts(text)
                .into_iter()
                .map(|(term, count)| (term, count as f32)),
        )
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }
}

impl Default for SparseEncoder {
    fn default() -> Self {
        Self::new(TokenizerConfig::default())
    }
}

// ============================================================================
// HashingEmbedder
// ============================================================================

/// Deterministic embedder based on signed feature hashing of tokens.
///
/// No model files required. Texts sharing vocabulary get high cosine
/// similarity, which is enough for offline use and tests; it has no notion of
/// synonyms.
#[derive(Debug)]
pub struct HashingEmbedder {
    dimension: usize,
    encoder: SparseEncoder,
}

impl HashingEmbedder {
    pub const MODEL_ID: &'static str = "vrd/feature-hashing";

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            encoder: SparseEncoder::default(),
        }
    }

    fn bucket(&self, term: &str) -> (usize, f32) {
        let hash = blake3::hash(term.as_bytes());
        let bytes = hash.as_bytes();
        let mut idx = [0u8; 8];
        idx.copy_from_slice(&bytes[..8]);
        let slot = (u64::from_le_bytes(idx) % self.dimension as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        (slot, sign)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        Self::MODEL_ID
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> VrdResult<EmbeddingPair> {
        let sparse = self.encoder.encode(text);
        let mut dense = vec![0.0f32; self.dimension];
        for (term, weight) in sparse.iter() {
            let (slot, sign) = self.bucket(term);
            dense[slot] += sign * weight;
        }

        let norm = dense.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut dense {
                *v /= norm;
            }
        }

        Ok(EmbeddingPair::new(dense, sparse))
    }
}
