//! Model configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model_locator::{extract_model_name, ModelLocator, RERANKERS_SUBDIR};
use crate::DEFAULT_RERANKER_MODEL_ID;

// ============================================================================
// DevicePreference
// ============================================================================

/// Preference for compute device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// CPU unless a GPU is explicitly requested.
    #[default]
    Auto,
    /// Force GPU (Metal on macOS, CUDA on Linux).
    Gpu,
    /// Force CPU only.
    Cpu,
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gpu" | "metal" | "cuda" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            _ => Err(format!(
                "Unknown device: '{}'. Use 'auto', 'gpu', or 'cpu'.",
                s
            )),
        }
    }
}

// ============================================================================
// RerankerModelConfig
// ============================================================================

/// Configuration for loading the cross-encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankerModelConfig {
    /// Model ID (e.g., "cross-encoder/ms-marco-MiniLM-L6-v2").
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Device preference.
    #[serde(default)]
    pub device: DevicePreference,

    /// Explicit path to the model directory, bypassing the locator.
    #[serde(default)]
    pub local_path: Option<PathBuf>,

    /// Maximum tokens per (query, passage) pair.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

fn default_model_id() -> String {
    DEFAULT_RERANKER_MODEL_ID.to_string()
}

fn default_max_length() -> usize {
    512
}

impl Default for RerankerModelConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            device: DevicePreference::default(),
            local_path: None,
            max_length: default_max_length(),
        }
    }
}

impl RerankerModelConfig {
    /// Resolve the model directory.
    ///
    /// `local_path` wins; otherwise the locator search order is used, and if
    /// that fails the conventional `~/.vrd/models/rerankers/{name}` path is
    /// returned so the caller can report where it looked.
    pub fn effective_model_path(&self) -> PathBuf {
        if let Some(ref path) = self.local_path {
            return path.clone();
        }

        match ModelLocator::new().reranker_model_path(&self.model_id) {
            Ok(path) => path,
            Err(_) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".vrd")
                .join("models")
                .join(RERANKERS_SUBDIR)
                .join(extract_model_name(&self.model_id)),
        }
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_preference_parse() {
        assert_eq!("CUDA".parse::<DevicePreference>(), Ok(DevicePreference::Gpu));
        assert_eq!("cpu".parse::<DevicePreference>(), Ok(DevicePreference::Cpu));
        assert!("tpu".parse::<DevicePreference>().is_err());
        assert_eq!(DevicePreference::Auto.to_string(), "auto");
    }

    #[test]
    fn test_default_config() {
        let config = RerankerModelConfig::default();
        assert_eq!(config.model_id, DEFAULT_RERANKER_MODEL_ID);
        assert_eq!(config.max_length, 512);
        assert_eq!(config.device, DevicePreference::Auto);
    }

    #[test]
    fn test_local_path_wins() {
        let config = RerankerModelConfig::default().with_local_path("/opt/models/ce");
        assert_eq!(config.effective_model_path(), PathBuf::from("/opt/models/ce"));
    }

    #[test]
    fn test_config_deserialize_camel_case() {
        let config: RerankerModelConfig =
            serde_json::from_str(r#"{"modelId":"org/custom","device":"cpu","maxLength":256}"#)
                .unwrap();
        assert_eq!(config.model_id, "org/custom");
        assert_eq!(config.device, DevicePreference::Cpu);
        assert_eq!(config.max_length, 256);
        assert!(config.local_path.is_none());
    }
}
