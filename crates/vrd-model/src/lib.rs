//! # vrd-model
//!
//! ML inference layer for VRD - pairwise relevance scoring.
//!
//! This crate owns the cross-encoder used to rerank fused duplicate candidates.
//! Embedding generation is an external collaborator and lives outside this
//! workspace; only the reranker runs locally.
//!
//! - **Reranker model**: BERT cross-encoder scoring (query, passage) pairs
//! - **Model locator**: runtime path resolution for installed model weights
//! - **Config**: device preference and model location
//!
//! ## Model Location
//!
//! Models are searched in this order:
//! 1. `$VRD_MODELS_DIR` environment variable
//! 2. `~/.vrd/models` user directory
//! 3. `{exe_dir}/models` next to the binary
//!
//! ## Features
//!
//! - `embedded` (default): Local Candle inference with disk-based weights
//! - `metal` / `cuda`: GPU acceleration for Candle
//!
//! ## Usage
//!
//! ```ignore
//! use vrd_model::{create_reranker_model, RerankerModelConfig};
//!
//! let model = create_reranker_model(&RerankerModelConfig::default())?;
//! let scores = model.score_batch("race condition /oauth/token", &passages)?;
//! ```

pub mod config;
pub mod error;
pub mod model_locator;

#[cfg(feature = "embedded")]
mod reranker;

pub use error::{ModelError, ModelResult};

pub use config::{DevicePreference, RerankerModelConfig};

pub use model_locator::{
    default_locator, ModelLocator, DEFAULT_RERANKER_MODEL_NAME, REQUIRED_MODEL_FILES,
    RERANKERS_SUBDIR, VRD_MODELS_DIR_ENV,
};

/// Default reranker model (full HuggingFace identifier).
pub const DEFAULT_RERANKER_MODEL_ID: &str = "cross-encoder/ms-marco-MiniLM-L6-v2";

// ============================================================================
// Reranker Model Trait
// ============================================================================

/// Trait for reranker models (cross-encoders).
///
/// Scores query-passage pairs jointly. Scores are raw logits: higher means
/// more relevant, but they are not bounded to [0, 1].
pub trait RerankerModel: Send + Sync + std::fmt::Debug {
    /// Score a batch of passages against a query.
    ///
    /// Returns one score per passage, in input order.
    fn score_batch(&self, query: &str, passages: &[String]) -> ModelResult<Vec<f32>>;

    /// Warm up the model.
    fn warm_up(&self) -> ModelResult<()> {
        let _ = self.score_batch("warmup", &["warmup passage".to_string()])?;
        Ok(())
    }

    /// Get the model ID.
    fn model_id(&self) -> &str;
}

// ============================================================================
// Factory Functions
// ============================================================================

/// Create a reranker model from configuration.
///
/// # Errors
///
/// Returns `ModelError` if the weights cannot be located or loaded.
#[cfg(feature = "embedded")]
pub fn create_reranker_model(config: &RerankerModelConfig) -> ModelResult<Box<dyn RerankerModel>> {
    let model = reranker::CandleRerankerModel::new(config)?;
    Ok(Box::new(model))
}

#[cfg(not(feature = "embedded"))]
pub fn create_reranker_model(_config: &RerankerModelConfig) -> ModelResult<Box<dyn RerankerModel>> {
    Err(ModelError::ProviderNotAvailable {
        provider: "candle".to_string(),
        reason: "No reranker providers available. Enable the 'embedded' feature.".to_string(),
    })
}

#[cfg(feature = "embedded")]
pub use reranker::CandleRerankerModel;
