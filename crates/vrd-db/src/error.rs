//! Error types for vrd-db.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vrd-db operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in vrd-db operations.
#[derive(Debug, Error)]
pub enum DbError {
    // ========================================================================
    // Vector index errors
    // ========================================================================
    /// Vector dimension mismatch.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Stored index metadata does not match the requested configuration.
    #[error("Store at {path} is incompatible: {reason}")]
    Incompatible { path: PathBuf, reason: String },

    // ========================================================================
    // Record log errors
    // ========================================================================
    /// Record log I/O error.
    #[error("Record log I/O error at {path}: {message}")]
    RecordIo { path: PathBuf, message: String },

    /// Record log parse error.
    #[error("Record log parse error at {path}:{line}: {message}")]
    RecordParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    // ========================================================================
    // General errors
    // ========================================================================
    /// IO error wrapper.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error wrapper.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create an incompatible-store error.
    pub fn incompatible(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Incompatible {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a record log I/O error.
    pub fn record_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::RecordIo {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the error is a poisoned lock or other internal fault.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}
