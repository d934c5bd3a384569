//! BM25 sparse retrieval for hybrid search.
//!
//! Lexical retrieval that complements dense semantic retrieval. Exact tokens
//! matter in vulnerability reports (endpoint paths, parameter names, payload
//! keywords), and BM25 catches those where embeddings blur them.
//!
//! ## Architecture
//!
//! ```text
//! Query
//!   │
//!   ├──► Dense search (embedding + cosine)
//!   │
//!   └──► Sparse search (BM25 over sparse term vectors)
//!                      │
//!                      ▼
//!          Reciprocal Rank Fusion (crate::fusion)
//!                      │
//!                      ▼
//!               Cross-encoder rerank
//! ```
//!
//! ## Key Components
//!
//! - [`tokenizer`]: Unicode-aware tokenization with English stemmer
//! - [`index`]: inverted index and scoring
//! - [`scorer`]: BM25 formula (k1=1.2, b=0.75)
//! - [`storage`]: bincode snapshots

mod index;
mod scorer;
mod storage;
mod tokenizer;

pub use index::{Bm25Index, Bm25IndexStats, DocumentStats};
pub use scorer::{bm25_term_score, idf, Bm25Params};
pub use storage::{
    bm25_dir, load_bm25_index, load_bm25_meta, save_bm25_index, Bm25IndexMeta, BM25_DIR_NAME,
};
pub use tokenizer::{Tokenizer, TokenizerConfig};

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_RRF_K;
use crate::errors::VrdError;

// ============================================================================
// Configuration
// ============================================================================

/// BM25 configuration: scoring parameters and tokenization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bm25Config {
    /// Term frequency saturation. Default: 1.2
    #[serde(default = "default_k1")]
    pub k1: f32,

    /// Document length normalization, 0 to 1. Default: 0.75
    #[serde(default = "default_b")]
    pub b: f32,

    /// Apply English stemming. Default: true
    #[serde(default = "default_true")]
    pub stemming: bool,

    /// Remove stop words. Default: true
    #[serde(default = "default_true")]
    pub remove_stopwords: bool,

    /// Minimum token length. Default: 2
    #[serde(default = "default_min_token_length")]
    pub min_token_length: usize,
}

fn default_k1() -> f32 {
    1.2
}

fn default_b() -> f32 {
    0.75
}

fn default_true() -> bool {
    true
}

fn default_min_token_length() -> usize {
    2
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
            stemming: true,
            remove_stopwords: true,
            min_token_length: default_min_token_length(),
        }
    }
}

impl Bm25Config {
    pub fn tokenizer_config(&self) -> TokenizerConfig {
        TokenizerConfig {
            stemming: self.stemming,
            remove_stopwords: self.remove_stopwords,
            min_token_length: self.min_token_length,
        }
    }

    /// Validates BM25 parameters, returning warnings for questionable values.
    pub fn validate(&self) -> Result<Vec<String>, VrdError> {
        let mut warnings = Vec::new();

        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(VrdError::InvalidConfiguration {
                message: "retrieval.hybrid.bm25.k1 must be a non-negative number".to_string(),
                hint: "Set k1 between 1.2 and 2.0 (recommended: 1.2)".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(VrdError::InvalidConfiguration {
                message: "retrieval.hybrid.bm25.b must be within [0, 1]".to_string(),
                hint: "Set b to 0.75 for standard length normalization".to_string(),
            });
        }
        if self.min_token_length == 0 {
            warnings.push(
                "retrieval.hybrid.bm25.minTokenLength=0 indexes single characters; \
                 payload punctuation noise will dominate (recommended: 2)"
                    .to_string(),
            );
        }
        if self.k1 > 3.0 {
            warnings.push(format!(
                "retrieval.hybrid.bm25.k1={} barely saturates term frequency (recommended: 1.2)",
                self.k1
            ));
        }

        Ok(warnings)
    }
}

// ============================================================================
// Hybrid Search Configuration
// ============================================================================

/// Hybrid search configuration combining dense and sparse retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridSearchConfig {
    /// RRF k parameter. Formula: RRF(d) = Σ 1/(k + rank). Default: 60
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    /// BM25 configuration.
    #[serde(default)]
    pub bm25: Bm25Config,
}

fn default_rrf_k() -> f32 {
    DEFAULT_RRF_K
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            bm25: Bm25Config::default(),
        }
    }
}

impl HybridSearchConfig {
    /// Validates the hybrid search configuration.
    ///
    /// # Errors
    /// - `rrf_k` is 0, negative or not finite
    /// - BM25 parameters are out of range
    ///
    /// # Warnings
    /// - Very large rrf_k (> 100) which over-smooths rankings
    pub fn validate(&self) -> Result<Vec<String>, VrdError> {
        let mut warnings = Vec::new();

        if !self.rrf_k.is_finite() || self.rrf_k <= 0.0 {
            return Err(VrdError::InvalidConfiguration {
                message: "retrieval.hybrid.rrfK must be positive".to_string(),
                hint: "Set rrfK to a positive value (recommended: 60)".to_string(),
            });
        }

        if self.rrf_k > 100.0 {
            warnings.push(format!(
                "retrieval.hybrid.rrfK={} is very large; rankings will be heavily smoothed (recommended: 60)",
                self.rrf_k
            ));
        }

        warnings.extend(self.bm25.validate()?);
        Ok(warnings)
    }
}

/// Result from BM25 search.
#[derive(Debug, Clone, PartialEq)]
pub struct Bm25SearchResult {
    /// Document id (report id).
    pub doc_id: String,
    pub score: f32,
    /// 1-based rank.
    pub rank: usize,
}
