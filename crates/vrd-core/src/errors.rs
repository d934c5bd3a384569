//! Error types for vrd-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout vrd-core.
pub type VrdResult<T> = Result<T, VrdError>;

/// Domain-specific errors for report ingestion and duplicate scanning.
///
/// A weakly related match is not an error: it is reported as a `similar`
/// verdict with `low` confidence.
#[derive(Error, Debug)]
pub enum VrdError {
    // ========================================================================
    // Input and integrity errors (never retried)
    // ========================================================================
    /// The report is structurally invalid.
    #[error("Malformed report: {reason}")]
    MalformedInput {
        /// What is wrong with the report.
        reason: String,
    },

    /// An identifier already exists in the index with different content.
    #[error("Index write rejected for report `{report_id}`: {reason}")]
    IndexWriteError {
        /// The colliding report identifier.
        report_id: String,
        /// Why the write was rejected.
        reason: String,
    },

    /// Persisted state could not be reconciled on startup.
    #[error("Report store at {path} is corrupted: {reason}")]
    StoreCorrupted { path: PathBuf, reason: String },

    // ========================================================================
    // Transient external-call failures
    // ========================================================================
    /// Retrieval failed repeatedly and the session was aborted.
    #[error("Retrieval unavailable: {reason}")]
    RetrievalUnavailable {
        /// The last underlying failure.
        reason: String,
    },

    /// The query reasoner did not answer within its timeout, repeatedly.
    #[error("Query reasoner timed out after {timeout_ms}ms")]
    ReasonerTimeout {
        /// Per-call timeout that was exceeded.
        timeout_ms: u64,
    },

    /// The query reasoner returned an error.
    #[error("Query reasoner failed: {reason}")]
    ReasonerFailed { reason: String },

    /// The embedder could not produce vectors for a text.
    #[error("Embedding failed: {reason}")]
    EmbeddingFailed { reason: String },

    /// A search backend could not answer a query.
    #[error("{index} search failed: {reason}")]
    SearchFailed {
        /// Which index failed (`dense` or `sparse`).
        index: String,
        reason: String,
    },

    /// The reranker model could not be loaded.
    #[error("Reranker `{model_id}` unavailable: {reason}")]
    RerankerUnavailable { model_id: String, reason: String },

    /// The reranker model failed during inference.
    #[error("Reranker inference failed for model `{model_id}`: {reason}")]
    RerankerInferenceFailed { model_id: String, reason: String },

    /// The normalizer could not turn raw text into a report.
    #[error("Normalization failed: {reason}")]
    NormalizationFailed { reason: String },

    // ========================================================================
    // Control flow
    // ========================================================================
    /// The session was cancelled by the caller.
    #[error("Decision session cancelled")]
    Cancelled,

    // ========================================================================
    // Configuration
    // ========================================================================
    /// A configuration value is invalid.
    #[error("Invalid configuration: {message}. {hint}")]
    InvalidConfiguration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    /// Configuration file could not be read or parsed.
    #[error("Config invalid at {path}: {reason}")]
    InvalidConfigFile { path: PathBuf, reason: String },

    // ========================================================================
    // Wrapped errors
    // ========================================================================
    /// Storage layer error.
    #[error(transparent)]
    Db(#[from] vrd_db::DbError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Catch-all for context-wrapped errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VrdError {
    /// Create a malformed-input error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            reason: reason.into(),
        }
    }

    /// Create an index-write error.
    pub fn index_write(report_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IndexWriteError {
            report_id: report_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a search failure for one index.
    pub fn search_failed(index: impl ToString, reason: impl Into<String>) -> Self {
        Self::SearchFailed {
            index: index.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an embedding failure.
    pub fn embedding_failed(reason: impl Into<String>) -> Self {
        Self::EmbeddingFailed {
            reason: reason.into(),
        }
    }

    /// Structural and data-integrity errors are surfaced immediately and
    /// never retried within a session.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::MalformedInput { .. }
                | Self::IndexWriteError { .. }
                | Self::StoreCorrupted { .. }
                | Self::InvalidConfiguration { .. }
                | Self::InvalidConfigFile { .. }
                | Self::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_classification() {
        assert!(VrdError::malformed("no title").is_permanent());
        assert!(VrdError::index_write("abc", "content differs").is_permanent());
        assert!(VrdError::Cancelled.is_permanent());
        assert!(!VrdError::RetrievalUnavailable {
            reason: "down".into()
        }
        .is_permanent());
        assert!(!VrdError::ReasonerTimeout { timeout_ms: 10 }.is_permanent());
    }

    #[test]
    fn test_display_carries_kind() {
        let err = VrdError::index_write("deadbeef", "content differs");
        assert_eq!(
            err.to_string(),
            "Index write rejected for report `deadbeef`: content differs"
        );
        let err = VrdError::search_failed("sparse", "lock poisoned");
        assert_eq!(err.to_string(), "sparse search failed: lock poisoned");
    }
}
