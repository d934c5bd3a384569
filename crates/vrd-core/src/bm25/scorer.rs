//! Okapi BM25 scoring.
//!
//! ```text
//! score(D, Q) = Σ IDF(q_i) * (f(q_i, D) * (k1 + 1)) / (f(q_i, D) + k1 * (1 - b + b * |D| / avgdl))
//! ```
//!
//! `f(q_i, D)` is the weight of the term in the document's sparse vector;
//! for the bundled sparse encoder that is the raw term count.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// BM25 scoring parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Bm25Params {
    /// Term frequency saturation.
    pub k1: f32,
    /// Document length normalization, 0 (none) to 1 (full).
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Smoothed inverse document frequency, always positive:
///
/// ```text
/// IDF(t) = ln((N - df(t) + 0.5) / (df(t) + 0.5) + 1)
/// ```
#[inline]
pub fn idf(num_docs: usize, doc_freq: usize) -> f32 {
    let n = num_docs as f32;
    let df = doc_freq as f32;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Score contribution of one query term to one document.
#[inline]
pub fn bm25_term_score(
    term_weight: f32,
    doc_len: f32,
    avg_doc_len: f32,
    idf_value: f32,
    params: &Bm25Params,
) -> f32 {
    if term_weight <= 0.0 {
        return 0.0;
    }
    let length_ratio = if avg_doc_len > 0.0 {
        doc_len / avg_doc_len
    } else {
        1.0
    };
    let numerator = term_weight * (params.k1 + 1.0);
    let denominator = term_weight + params.k1 * (1.0 - params.b + params.b * length_ratio);

    idf_value * numerator / denominator
}
