//! Integration tests for ModelLocator and reranker config resolution.

use vrd_model::{
    ModelError, ModelLocator, RerankerModelConfig, DEFAULT_RERANKER_MODEL_NAME,
    REQUIRED_MODEL_FILES, RERANKERS_SUBDIR, VRD_MODELS_DIR_ENV,
};
use std::env;
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;

// Serializes env var mutation across tests in this binary
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn install_reranker(temp: &TempDir, model_name: &str) -> std::path::PathBuf {
    let model_path = temp.path().join(RERANKERS_SUBDIR).join(model_name);
    fs::create_dir_all(&model_path).expect("create model dir");
    for file in REQUIRED_MODEL_FILES {
        let content = match *file {
            "config.json" => r#"{"hidden_size": 384, "max_position_embeddings": 512}"#,
            _ => "{}",
        };
        fs::write(model_path.join(file), content).expect("write model file");
    }
    model_path
}

#[test]
fn test_locator_with_nonexistent_base_dir() {
    let locator = ModelLocator::with_base_dir("/nonexistent/vrd/models");
    match locator.resolve_base_dir().unwrap_err() {
        ModelError::ModelsDirectoryNotFound { searched } => {
            assert_eq!(searched.len(), 1);
            assert!(searched[0].to_string_lossy().contains("nonexistent"));
        }
        other => panic!("Expected ModelsDirectoryNotFound, got {:?}", other),
    }
}

#[test]
fn test_env_var_takes_precedence() {
    let _guard = ENV_MUTEX.lock().unwrap();

    let temp = TempDir::new().unwrap();
    let installed = install_reranker(&temp, DEFAULT_RERANKER_MODEL_NAME);
    env::set_var(VRD_MODELS_DIR_ENV, temp.path());

    let locator = ModelLocator::new();
    assert_eq!(locator.resolve_base_dir().unwrap(), temp.path());
    assert_eq!(
        locator.reranker_model_path(DEFAULT_RERANKER_MODEL_NAME).unwrap(),
        installed
    );

    let config = RerankerModelConfig::default();
    assert_eq!(config.effective_model_path(), installed);

    env::remove_var(VRD_MODELS_DIR_ENV);
}

#[test]
fn test_flat_layout_is_found() {
    let temp = TempDir::new().unwrap();
    let flat = temp.path().join("tiny-ce");
    fs::create_dir_all(&flat).unwrap();
    fs::write(flat.join("config.json"), "{}").unwrap();

    let locator = ModelLocator::with_base_dir(temp.path());
    assert_eq!(locator.reranker_model_path("org/tiny-ce").unwrap(), flat);
}

#[cfg(feature = "embedded")]
#[test]
fn test_create_reranker_with_missing_weights_fails_cleanly() {
    let temp = TempDir::new().unwrap();
    let config = RerankerModelConfig::default().with_local_path(temp.path().join("absent"));

    let err = vrd_model::create_reranker_model(&config).unwrap_err();
    assert!(err.is_not_installed(), "unexpected error: {err}");
}
