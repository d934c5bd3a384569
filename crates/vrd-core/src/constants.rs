//! Common constants used throughout vrd-core.
//!
//! Tuning knobs live here as defaults; the values actually used at runtime
//! come from [`crate::config::EngineConfig`].

// ============================================================================
// Directory Names
// ============================================================================

/// The name of the global VRD configuration directory (`~/.vrd/`).
pub const VRD_HOME_DIR: &str = ".vrd";

/// Global configuration filename inside [`VRD_HOME_DIR`].
pub const CONFIG_FILENAME: &str = "config.yaml";

/// Subdirectory of the data dir holding the report store.
pub const STORE_DIR: &str = "store";

// ============================================================================
// Classifier Thresholds
// ============================================================================

/// Lower bound of the high-confidence duplicate band.
pub const DEFAULT_DUPLICATE_HIGH_THRESHOLD: f32 = 0.90;

/// Lower bound of the probable (medium-confidence) duplicate band.
pub const DEFAULT_DUPLICATE_PROBABLE_THRESHOLD: f32 = 0.70;

/// Lower bound of the similar band.
pub const DEFAULT_SIMILAR_THRESHOLD: f32 = 0.50;

/// Lower bound of the weakly related band; anything below is new.
pub const DEFAULT_WEAKLY_RELATED_THRESHOLD: f32 = 0.30;

// ============================================================================
// Retrieval
// ============================================================================

/// Reciprocal-rank fusion damping constant.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Results requested from each index per query.
pub const DEFAULT_CANDIDATE_LIMIT: usize = 20;

/// Fused candidates passed to the reranker.
pub const DEFAULT_RERANK_TOP_K: usize = 10;

/// Reproduction steps included in a reranker passage.
pub const PASSAGE_MAX_STEPS: usize = 3;

// ============================================================================
// Decision Loop
// ============================================================================

/// Iteration cap for one decision session.
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Consecutive failed iterations before a session aborts.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: usize = 3;

/// Per-call timeout for the query reasoner, in milliseconds.
pub const DEFAULT_REASONER_TIMEOUT_MS: u64 = 30_000;

/// Shortest reformulated query accepted from the reasoner.
pub const DEFAULT_MIN_QUERY_LENGTH: usize = 5;

/// Concurrent sessions in `scan_batch`.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 3;
