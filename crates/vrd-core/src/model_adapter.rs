//! Adapter layer for vrd-model infrastructure.
//!
//! Bridges the `vrd-model` cross-encoder into vrd-core's domain types:
//!
//! - Error conversion from `ModelError` to `VrdError`
//! - Config conversion from [`RerankerConfig`] to `RerankerModelConfig`
//! - [`ModelRerankerBackend`], a [`RerankerBackend`] over a `RerankerModel`
//!
//! ```text
//! vrd-core session (rerank step)
//!        ↓
//!   model_adapter (this module)
//!        ↓
//!     vrd-model (Candle cross-encoder)
//! ```

use std::sync::Arc;

use tracing::{info, warn};
use vrd_model::{ModelError, RerankerModel, RerankerModelConfig};

use crate::config::RerankerConfig;
use crate::errors::{VrdError, VrdResult};
use crate::reranker::{Reranker, RerankerBackend};

// ============================================================================
// Error Conversion
// ============================================================================

/// Convert a vrd-model error to a vrd-core error.
pub fn from_model_error(err: ModelError) -> VrdError {
    match err {
        ModelError::ModelsDirectoryNotFound { searched } => {
            let paths = searched
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            VrdError::RerankerUnavailable {
                model_id: "model-locator".to_string(),
                reason: format!("Models directory not found. Searched: {}", paths),
            }
        }

        ModelError::ModelNotFound { model_id, path } => VrdError::RerankerUnavailable {
            model_id,
            reason: format!("Model not found at {:?}", path),
        },

        ModelError::IncompleteModelFiles { path, missing } => VrdError::RerankerUnavailable {
            model_id: path.display().to_string(),
            reason: format!("Missing model files: {}", missing.join(", ")),
        },

        ModelError::ModelLoad { model_id, message } => VrdError::RerankerUnavailable {
            model_id,
            reason: message,
        },

        ModelError::ProviderNotAvailable { provider, reason } => VrdError::RerankerUnavailable {
            model_id: provider,
            reason,
        },

        ModelError::DeviceNotAvailable { reason } => VrdError::InvalidConfiguration {
            message: format!("reranker device not available: {}", reason),
            hint: "Set retrieval.reranker.device to 'cpu'".to_string(),
        },

        ModelError::Tokenization { message } => VrdError::RerankerInferenceFailed {
            model_id: "tokenizer".to_string(),
            reason: message,
        },

        ModelError::RerankingFailed { model_id, message } => VrdError::RerankerInferenceFailed {
            model_id,
            reason: message,
        },

        ModelError::Io(io_err) => VrdError::Io(io_err),

        ModelError::Json(json_err) => VrdError::Json(json_err),
    }
}

/// Extension trait to convert a vrd-model result into a [`VrdResult`].
pub trait IntoVrdResult<T> {
    fn into_vrd_result(self) -> VrdResult<T>;
}

impl<T> IntoVrdResult<T> for Result<T, ModelError> {
    fn into_vrd_result(self) -> VrdResult<T> {
        self.map_err(from_model_error)
    }
}

// ============================================================================
// Config Conversion
// ============================================================================

pub fn to_model_reranker_config(config: &RerankerConfig) -> RerankerModelConfig {
    let mut model_config = RerankerModelConfig::default()
        .with_model_id(config.model_id.clone())
        .with_device(config.device);
    if let Some(path) = &config.local_path {
        model_config = model_config.with_local_path(path.clone());
    }
    model_config
}

// ============================================================================
// ModelRerankerBackend
// ============================================================================

/// [`RerankerBackend`] over a `vrd-model` cross-encoder.
pub struct ModelRerankerBackend {
    inner: Box<dyn RerankerModel>,
    model_id: String,
}

impl std::fmt::Debug for ModelRerankerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRerankerBackend")
            .field("model_id", &self.model_id)
            .finish()
    }
}

impl ModelRerankerBackend {
    /// Wrap an already loaded model.
    pub fn new(inner: Box<dyn RerankerModel>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }

    /// Load the model described by `config`.
    pub fn from_config(config: &RerankerConfig) -> VrdResult<Self> {
        let model = vrd_model::create_reranker_model(&to_model_reranker_config(config))
            .into_vrd_result()?;
        Ok(Self::new(model))
    }
}

impl RerankerBackend for ModelRerankerBackend {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn score_batch(&self, query: &str, passages: &[String]) -> VrdResult<Vec<f32>> {
        self.inner.score_batch(query, passages).into_vrd_result()
    }

    fn warm_up(&self) -> VrdResult<()> {
        self.inner.warm_up().into_vrd_result()
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Build the [`Reranker`] described by `config`.
///
/// A disabled or uninstalled model does not fail engine startup: the
/// reranker is returned without a backend and every scan runs degraded.
pub fn create_reranker(config: &RerankerConfig) -> Reranker {
    if !config.enabled {
        info!("Reranker disabled by configuration, verdicts will be degraded");
        return Reranker::new(None, config.top_k, config.normalization);
    }

    match ModelRerankerBackend::from_config(config) {
        Ok(backend) => {
            if let Err(e) = backend.warm_up() {
                warn!("Reranker warm-up failed: {}", e);
            }
            info!("Reranker model loaded: {}", backend.model_id());
            let backend: Arc<dyn RerankerBackend> = Arc::new(backend);
            Reranker::new(Some(backend), config.top_k, config.normalization)
        }
        Err(e) => {
            warn!(
                "Failed to load reranker '{}': {}. Scans will run degraded.",
                config.model_id, e
            );
            Reranker::new(None, config.top_k, config.normalization)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use vrd_model::ModelResult;

    #[derive(Debug)]
    struct LengthModel;

    impl RerankerModel for LengthModel {
        fn score_batch(&self, _query: &str, passages: &[String]) -> ModelResult<Vec<f32>> {
            Ok(passages.iter().map(|p| p.len() as f32).collect())
        }

        fn model_id(&self) -> &str {
            "length"
        }
    }

    #[derive(Debug)]
    struct FailingModel;

    impl RerankerModel for FailingModel {
        fn score_batch(&self, _query: &str, _passages: &[String]) -> ModelResult<Vec<f32>> {
            Err(ModelError::reranking_failed("failing", "out of memory"))
        }

        fn model_id(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_error_mapping() {
        let err = from_model_error(ModelError::ModelNotFound {
            model_id: "cross-encoder/x".into(),
            path: PathBuf::from("/nowhere"),
        });
        assert!(matches!(err, VrdError::RerankerUnavailable { .. }));

        let err = from_model_error(ModelError::reranking_failed("m", "boom"));
        assert!(matches!(err, VrdError::RerankerInferenceFailed { .. }));

        let err = from_model_error(ModelError::DeviceNotAvailable {
            reason: "no metal".into(),
        });
        assert!(matches!(err, VrdError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_backend_delegates_to_model() {
        let backend = ModelRerankerBackend::new(Box::new(LengthModel));
        assert_eq!(backend.model_id(), "length");
        let scores = backend
            .score_batch("q", &["ab".to_string(), "abcd".to_string()])
            .unwrap();
        assert_eq!(scores, vec![2.0, 4.0]);
        assert!(backend.warm_up().is_ok());
    }

    #[test]
    fn test_backend_maps_inference_errors() {
        let backend = ModelRerankerBackend::new(Box::new(FailingModel));
        let err = backend.score_batch("q", &["p".to_string()]).unwrap_err();
        assert!(err.to_string().contains("out of memory"));
    }

    #[test]
    fn test_config_conversion() {
        let config = RerankerConfig {
            local_path: Some(PathBuf::from("/models/minilm")),
            ..Default::default()
        };
        let model_config = to_model_reranker_config(&config);
        assert_eq!(model_config.model_id, config.model_id);
        assert_eq!(model_config.local_path, Some(PathBuf::from("/models/minilm")));
    }

    #[test]
    fn test_disabled_config_creates_backendless_reranker() {
        let config = RerankerConfig {
            enabled: false,
            top_k: 7,
            ..Default::default()
        };
        let reranker = create_reranker(&config);
        assert!(!reranker.is_available());
        assert_eq!(reranker.top_k(), 7);
    }

    #[test]
    fn test_missing_model_degrades_instead_of_failing() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = RerankerConfig {
            local_path: Some(temp.path().join("absent-model")),
            ..Default::default()
        };
        assert!(!create_reranker(&config).is_available());
    }
}
