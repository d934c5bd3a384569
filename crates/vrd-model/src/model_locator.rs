//! Model locator for runtime path resolution.
//!
//! Reranker weights are disk assets installed next to the binary or in the
//! user's home directory; nothing is downloaded at runtime.
//!
//! # Search Order
//!
//! 1. **Environment override**: `$VRD_MODELS_DIR`
//! 2. **User directory**: `~/.vrd/models`
//! 3. **Binary-relative**: `{exe_dir}/models`
//!
//! # Model Layout
//!
//! ```text
//! {models_dir}/
//!   rerankers/
//!     ms-marco-MiniLM-L6-v2/
//!       config.json
//!       model.safetensors
//!       tokenizer.json
//! ```

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{ModelError, ModelResult};

/// Environment variable for overriding the models directory.
pub const VRD_MODELS_DIR_ENV: &str = "VRD_MODELS_DIR";

/// Reranker model subdirectory.
pub const RERANKERS_SUBDIR: &str = "rerankers";

/// Default reranker model name (short form).
pub const DEFAULT_RERANKER_MODEL_NAME: &str = "ms-marco-MiniLM-L6-v2";

/// Required files for a valid model directory.
pub const REQUIRED_MODEL_FILES: &[&str] = &["config.json", "model.safetensors", "tokenizer.json"];

/// Locates model files at runtime using a fixed search order.
#[derive(Debug, Clone, Default)]
pub struct ModelLocator {
    base_dir: Option<PathBuf>,
}

impl ModelLocator {
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Create a locator pinned to one base directory.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    /// Resolve the base models directory.
    ///
    /// Returns the first existing directory in the search order.
    pub fn resolve_base_dir(&self) -> ModelResult<PathBuf> {
        if let Some(ref base) = self.base_dir {
            if base.is_dir() {
                return Ok(base.clone());
            }
            return Err(ModelError::ModelsDirectoryNotFound {
                searched: vec![base.clone()],
            });
        }

        let mut candidates = Vec::new();
        if let Ok(env_path) = env::var(VRD_MODELS_DIR_ENV) {
            candidates.push(PathBuf::from(env_path));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".vrd").join("models"));
        }
        if let Some(exe_dir) = env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
        {
            candidates.push(exe_dir.join("models"));
        }

        match candidates.iter().find(|p| p.is_dir()) {
            Some(found) => Ok(found.clone()),
            None => Err(ModelError::ModelsDirectoryNotFound {
                searched: candidates,
            }),
        }
    }

    /// Resolve the path to a reranker model.
    ///
    /// Accepts a full model ID ("cross-encoder/ms-marco-MiniLM-L6-v2") or the
    /// short name. Tries `{base}/rerankers/{name}`, `{base}/{full_id}`, then
    /// `{base}/{name}`.
    pub fn reranker_model_path(&self, model_id: &str) -> ModelResult<PathBuf> {
        let base = self.resolve_base_dir()?;
        let model_name = extract_model_name(model_id);

        let candidates = [
            base.join(RERANKERS_SUBDIR).join(model_name),
            base.join(model_id),
            base.join(model_name),
        ];

        candidates
            .iter()
            .find(|p| is_valid_model_dir(p))
            .cloned()
            .ok_or_else(|| ModelError::ModelNotFound {
                model_id: model_id.to_string(),
                path: candidates[0].clone(),
            })
    }

    /// Check if the default reranker model is available.
    pub fn has_default_reranker_model(&self) -> bool {
        self.reranker_model_path(DEFAULT_RERANKER_MODEL_NAME).is_ok()
    }

    /// Validate that a model directory contains all required files.
    pub fn validate_model_dir(&self, path: &Path) -> ModelResult<()> {
        if !path.exists() {
            return Err(ModelError::ModelNotFound {
                model_id: path.display().to_string(),
                path: path.to_path_buf(),
            });
        }

        let missing: Vec<&'static str> = REQUIRED_MODEL_FILES
            .iter()
            .copied()
            .filter(|file| !path.join(file).exists())
            .collect();

        if !missing.is_empty() {
            return Err(ModelError::IncompleteModelFiles {
                path: path.to_path_buf(),
                missing,
            });
        }

        Ok(())
    }
}

/// "cross-encoder/ms-marco-MiniLM-L6-v2" → "ms-marco-MiniLM-L6-v2"
pub(crate) fn extract_model_name(model_id: &str) -> &str {
    model_id.rsplit('/').next().unwrap_or(model_id)
}

fn is_valid_model_dir(path: &Path) -> bool {
    path.is_dir() && path.join("config.json").exists()
}

/// Get a default model locator.
pub fn default_locator() -> ModelLocator {
    ModelLocator::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn install(temp: &TempDir, model_name: &str) -> PathBuf {
        let model_path = temp.path().join(RERANKERS_SUBDIR).join(model_name);
        fs::create_dir_all(&model_path).unwrap();
        for file in REQUIRED_MODEL_FILES {
            fs::write(model_path.join(file), "{}").unwrap();
        }
        model_path
    }

    #[test]
    fn test_extract_model_name() {
        assert_eq!(
            extract_model_name("cross-encoder/ms-marco-MiniLM-L6-v2"),
            "ms-marco-MiniLM-L6-v2"
        );
        assert_eq!(extract_model_name("plain"), "plain");
    }

    #[test]
    fn test_reranker_model_path_full_and_short() {
        let temp = TempDir::new().unwrap();
        let installed = install(&temp, DEFAULT_RERANKER_MODEL_NAME);
        let locator = ModelLocator::with_base_dir(temp.path());

        assert_eq!(
            locator
                .reranker_model_path("cross-encoder/ms-marco-MiniLM-L6-v2")
                .unwrap(),
            installed
        );
        assert_eq!(
            locator.reranker_model_path(DEFAULT_RERANKER_MODEL_NAME).unwrap(),
            installed
        );
        assert!(locator.has_default_reranker_model());
    }

    #[test]
    fn test_model_not_found_reports_first_candidate() {
        let temp = TempDir::new().unwrap();
        let locator = ModelLocator::with_base_dir(temp.path());

        match locator.reranker_model_path("org/missing").unwrap_err() {
            ModelError::ModelNotFound { model_id, path } => {
                assert_eq!(model_id, "org/missing");
                assert!(path.ends_with("rerankers/missing"));
            }
            other => panic!("Expected ModelNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_model_dir_incomplete() {
        let temp = TempDir::new().unwrap();
        let model_path = temp.path().join("partial");
        fs::create_dir_all(&model_path).unwrap();
        fs::write(model_path.join("config.json"), "{}").unwrap();

        let locator = ModelLocator::with_base_dir(temp.path());
        match locator.validate_model_dir(&model_path).unwrap_err() {
            ModelError::IncompleteModelFiles { missing, .. } => {
                assert_eq!(missing, vec!["model.safetensors", "tokenizer.json"]);
            }
            other => panic!("Expected IncompleteModelFiles, got {:?}", other),
        }
    }
}
