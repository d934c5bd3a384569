//! Error types for vrd-model.
//!
//! Errors that concern model installation say where the weights were
//! expected and which files are missing.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vrd-model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur in vrd-model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    // ========================================================================
    // Model discovery errors
    // ========================================================================
    /// No models directory found in any search location.
    #[error("{}", format_models_dir_not_found(.searched))]
    ModelsDirectoryNotFound { searched: Vec<PathBuf> },

    /// Model files not found at expected location.
    #[error("Reranker model not found: {model_id}\n\nExpected at: {}", .path.display())]
    ModelNotFound { model_id: String, path: PathBuf },

    /// Model directory exists but is missing required files.
    #[error("Incomplete model installation at {}: missing {}", .path.display(), .missing.join(", "))]
    IncompleteModelFiles {
        path: PathBuf,
        missing: Vec<&'static str>,
    },

    // ========================================================================
    // Loading and inference errors
    // ========================================================================
    /// Failed to load model.
    #[error("Failed to load model '{model_id}': {message}")]
    ModelLoad { model_id: String, message: String },

    /// Tokenization failed.
    #[error("Tokenization failed: {message}")]
    Tokenization { message: String },

    /// Scoring failed.
    #[error("Reranking failed for model '{model_id}': {message}")]
    RerankingFailed { model_id: String, message: String },

    // ========================================================================
    // Provider errors
    // ========================================================================
    /// Provider not compiled in.
    #[error("Provider '{provider}' not available: {reason}")]
    ProviderNotAvailable { provider: String, reason: String },

    /// Requested compute device is not available.
    #[error("Compute device not available: {reason}\n\nSet the reranker device to 'cpu' in ~/.vrd/config.yaml.")]
    DeviceNotAvailable { reason: String },

    // ========================================================================
    // I/O errors
    // ========================================================================
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_models_dir_not_found(searched: &[PathBuf]) -> String {
    let list = searched
        .iter()
        .enumerate()
        .map(|(i, p)| format!("  {}. {}", i + 1, p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Models directory not found.\n\n\
        Searched:\n\
        {list}\n\n\
        Set $VRD_MODELS_DIR or install the reranker under ~/.vrd/models/rerankers/."
    )
}

impl ModelError {
    /// Create a model load error.
    pub fn model_load(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    /// Create a reranking failed error.
    pub fn reranking_failed(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RerankingFailed {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    /// Create a tokenization error.
    pub fn tokenization(message: impl Into<String>) -> Self {
        Self::Tokenization {
            message: message.into(),
        }
    }

    /// Whether the error means the model is absent rather than broken.
    pub fn is_not_installed(&self) -> bool {
        matches!(
            self,
            Self::ModelsDirectoryNotFound { .. }
                | Self::ModelNotFound { .. }
                | Self::IncompleteModelFiles { .. }
                | Self::ProviderNotAvailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_installed_classification() {
        let missing = ModelError::ModelNotFound {
            model_id: "x".into(),
            path: PathBuf::from("/tmp/x"),
        };
        assert!(missing.is_not_installed());
        assert!(!ModelError::tokenization("bad").is_not_installed());
    }

    #[test]
    fn test_incomplete_message_lists_files() {
        let err = ModelError::IncompleteModelFiles {
            path: PathBuf::from("/m"),
            missing: vec!["model.safetensors", "tokenizer.json"],
        };
        let msg = err.to_string();
        assert!(msg.contains("model.safetensors, tokenizer.json"));
    }
}
