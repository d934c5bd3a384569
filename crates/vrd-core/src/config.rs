//! Engine configuration.
//!
//! Loaded from `~/.vrd/config.yaml` or an explicit path. A missing file means
//! defaults, so the engine works without any configuration.
//!
//! # Example YAML
//!
//! ```yaml
//! retrieval:
//!   candidateLimit: 20
//!   hybrid:
//!     rrfK: 60
//!     bm25:
//!       k1: 1.2
//!       b: 0.75
//!   reranker:
//!     enabled: true
//!     modelId: cross-encoder/ms-marco-MiniLM-L6-v2
//!     topK: 10
//!     normalization: sigmoid
//! classifier:
//!   duplicateHigh: 0.90
//!   duplicateProbable: 0.70
//!   similar: 0.50
//!   weaklyRelated: 0.30
//! decision:
//!   maxIterations: 5
//!   maxConsecutiveFailures: 3
//!   reasonerTimeoutMs: 30000
//!   minQueryLength: 5
//! storage:
//!   dataDir: /var/lib/vrd
//! batchConcurrency: 3
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vrd_model::DevicePreference;

use crate::bm25::HybridSearchConfig;
use crate::classifier::ClassifierThresholds;
use crate::constants::{
    CONFIG_FILENAME, DEFAULT_BATCH_CONCURRENCY, DEFAULT_CANDIDATE_LIMIT,
    DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_MAX_ITERATIONS, DEFAULT_MIN_QUERY_LENGTH,
    DEFAULT_REASONER_TIMEOUT_MS, DEFAULT_RERANK_TOP_K, STORE_DIR, VRD_HOME_DIR,
};
use crate::errors::{VrdError, VrdResult};
use crate::reranker::ScoreNormalization;

// ============================================================================
// EngineConfig
// ============================================================================

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub classifier: ClassifierThresholds,

    #[serde(default)]
    pub decision: DecisionConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Sessions run concurrently by `scan_batch`.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

fn default_batch_concurrency() -> usize {
    DEFAULT_BATCH_CONCURRENCY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retrieval: RetrievalConfig::default(),
            classifier: ClassifierThresholds::default(),
            decision: DecisionConfig::default(),
            storage: StorageConfig::default(),
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

impl EngineConfig {
    /// Load from `~/.vrd/config.yaml`, or defaults when there is no home
    /// directory or no file.
    ///
    /// # Errors
    ///
    /// [`VrdError::InvalidConfigFile`] if the file exists but cannot be read
    /// or parsed, [`VrdError::InvalidConfiguration`] if validation fails.
    pub fn load_default() -> VrdResult<Self> {
        match Self::default_path() {
            Some(path) => Self::from_path(&path),
            None => {
                tracing::debug!("Could not determine home directory, using default config");
                Ok(Self::default())
            }
        }
    }

    /// Load from a specific path. A missing file yields defaults.
    pub fn from_path(path: &Path) -> VrdResult<Self> {
        if !path.exists() {
            tracing::debug!("Config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| VrdError::InvalidConfigFile {
            path: path.to_path_buf(),
            reason: format!("failed to read: {}", e),
        })?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            VrdError::Yaml(e) => VrdError::InvalidConfigFile {
                path: path.to_path_buf(),
                reason: format!("failed to parse: {}", e),
            },
            other => other,
        })
    }

    /// Parse and validate YAML, logging warnings.
    pub fn from_yaml_str(content: &str) -> VrdResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        for warning in config.validate()? {
            tracing::warn!("Config warning: {}", warning);
        }
        Ok(config)
    }

    /// `~/.vrd`
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(VRD_HOME_DIR))
    }

    /// `~/.vrd/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|d| d.join(CONFIG_FILENAME))
    }

    /// Directory of the persistent report store, if one is configured.
    pub fn store_dir(&self) -> Option<PathBuf> {
        self.storage.data_dir.as_ref().map(|d| d.join(STORE_DIR))
    }

    /// Validate every section.
    ///
    /// Returns the first critical error, otherwise the collected warnings.
    pub fn validate(&self) -> VrdResult<Vec<String>> {
        let mut warnings = Vec::new();
        warnings.extend(self.retrieval.validate()?);
        warnings.extend(self.classifier.validate()?);
        warnings.extend(self.decision.validate()?);

        if self.batch_concurrency == 0 {
            return Err(VrdError::InvalidConfiguration {
                message: "batchConcurrency cannot be 0".to_string(),
                hint: "Set batchConcurrency to at least 1 (default: 3)".to_string(),
            });
        }
        if self.batch_concurrency > 64 {
            warnings.push(format!(
                "batchConcurrency={} is very large; sessions compete for the same indexes",
                self.batch_concurrency
            ));
        }
        Ok(warnings)
    }
}

// ============================================================================
// RetrievalConfig
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    /// Results requested from each index per query.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,

    #[serde(default)]
    pub hybrid: HybridSearchConfig,

    #[serde(default)]
    pub reranker: RerankerConfig,
}

fn default_candidate_limit() -> usize {
    DEFAULT_CANDIDATE_LIMIT
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            hybrid: HybridSearchConfig::default(),
            reranker: RerankerConfig::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> VrdResult<Vec<String>> {
        if self.candidate_limit == 0 {
            return Err(VrdError::InvalidConfiguration {
                message: "retrieval.candidateLimit cannot be 0".to_string(),
                hint: "Set candidateLimit to at least 1 (recommended: 20)".to_string(),
            });
        }

        let mut warnings = self.hybrid.validate()?;
        warnings.extend(self.reranker.validate()?);
        if self.reranker.enabled && self.reranker.top_k > self.candidate_limit * 2 {
            warnings.push(format!(
                "retrieval.reranker.topK ({}) exceeds the most candidates fusion can produce ({})",
                self.reranker.top_k,
                self.candidate_limit * 2
            ));
        }
        Ok(warnings)
    }
}

// ============================================================================
// RerankerConfig
// ============================================================================

/// Cross-encoder reranker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankerConfig {
    #[serde(default = "default_reranker_enabled")]
    pub enabled: bool,

    #[serde(default = "default_reranker_model_id")]
    pub model_id: String,

    /// Explicit model directory. If not set, the model locator searches
    /// `$VRD_MODELS_DIR` and `~/.vrd/models/rerankers/<model_name>`.
    #[serde(default)]
    pub local_path: Option<PathBuf>,

    #[serde(default)]
    pub device: DevicePreference,

    /// Fused candidates passed to the model.
    #[serde(default = "default_reranker_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub normalization: ScoreNormalization,
}

fn default_reranker_enabled() -> bool {
    true
}

fn default_reranker_model_id() -> String {
    vrd_model::DEFAULT_RERANKER_MODEL_ID.to_string()
}

fn default_reranker_top_k() -> usize {
    DEFAULT_RERANK_TOP_K
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: default_reranker_enabled(),
            model_id: default_reranker_model_id(),
            local_path: None,
            device: DevicePreference::default(),
            top_k: default_reranker_top_k(),
            normalization: ScoreNormalization::default(),
        }
    }
}

impl RerankerConfig {
    pub fn validate(&self) -> VrdResult<Vec<String>> {
        let mut warnings = Vec::new();

        if self.top_k == 0 {
            return Err(VrdError::InvalidConfiguration {
                message: "retrieval.reranker.topK cannot be 0".to_string(),
                hint: "Set topK to at least 1 (recommended: 10)".to_string(),
            });
        }
        if self.model_id.trim().is_empty() {
            return Err(VrdError::InvalidConfiguration {
                message: "retrieval.reranker.modelId is empty".to_string(),
                hint: format!(
                    "Remove the key to use the default ({})",
                    vrd_model::DEFAULT_RERANKER_MODEL_ID
                ),
            });
        }

        if self.top_k > 100 {
            warnings.push(format!(
                "retrieval.reranker.topK ({}) is very large; every scan iteration scores this many passages",
                self.top_k
            ));
        }
        if !self.enabled {
            warnings.push(
                "retrieval.reranker.enabled is false; every verdict will be degraded".to_string(),
            );
        }
        Ok(warnings)
    }
}

// ============================================================================
// DecisionConfig
// ============================================================================

/// Bounds of one decision session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,

    #[serde(default = "default_reasoner_timeout_ms")]
    pub reasoner_timeout_ms: u64,

    /// Reasoner queries shorter than this (in chars) are replaced by the
    /// fallback query.
    #[serde(default = "default_min_query_length")]
    pub min_query_length: usize,
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_max_consecutive_failures() -> usize {
    DEFAULT_MAX_CONSECUTIVE_FAILURES
}

fn default_reasoner_timeout_ms() -> u64 {
    DEFAULT_REASONER_TIMEOUT_MS
}

fn default_min_query_length() -> usize {
    DEFAULT_MIN_QUERY_LENGTH
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_consecutive_failures: default_max_consecutive_failures(),
            reasoner_timeout_ms: default_reasoner_timeout_ms(),
            min_query_length: default_min_query_length(),
        }
    }
}

impl DecisionConfig {
    pub fn reasoner_timeout(&self) -> Duration {
        Duration::from_millis(self.reasoner_timeout_ms)
    }

    pub fn validate(&self) -> VrdResult<Vec<String>> {
        let mut warnings = Vec::new();

        if self.max_iterations == 0 {
            return Err(VrdError::InvalidConfiguration {
                message: "decision.maxIterations cannot be 0".to_string(),
                hint: "Set maxIterations to at least 1 (default: 5)".to_string(),
            });
        }
        if self.max_consecutive_failures == 0 {
            return Err(VrdError::InvalidConfiguration {
                message: "decision.maxConsecutiveFailures cannot be 0".to_string(),
                hint: "Set maxConsecutiveFailures to at least 1 (default: 3)".to_string(),
            });
        }
        if self.reasoner_timeout_ms == 0 {
            return Err(VrdError::InvalidConfiguration {
                message: "decision.reasonerTimeoutMs cannot be 0".to_string(),
                hint: "Set reasonerTimeoutMs to a positive value (default: 30000)".to_string(),
            });
        }

        if self.max_iterations > 20 {
            warnings.push(format!(
                "decision.maxIterations={} is very large; scans will be slow",
                self.max_iterations
            ));
        }
        if self.max_consecutive_failures > self.max_iterations {
            warnings.push(format!(
                "decision.maxConsecutiveFailures ({}) > maxIterations ({}); sessions can never abort on failures",
                self.max_consecutive_failures, self.max_iterations
            ));
        }
        if self.reasoner_timeout_ms < 100 {
            warnings.push(format!(
                "decision.reasonerTimeoutMs={} is very short; most reasoner calls will time out",
                self.reasoner_timeout_ms
            ));
        }
        Ok(warnings)
    }
}

// ============================================================================
// StorageConfig
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Root directory for persistent state. `None` keeps everything in
    /// memory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_validate_cleanly() {
        let config = EngineConfig::default();
        assert!(config.validate().unwrap().is_empty());
        assert_eq!(config.retrieval.candidate_limit, 20);
        assert_eq!(config.retrieval.hybrid.rrf_k, 60.0);
        assert_eq!(config.retrieval.reranker.top_k, 10);
        assert_eq!(config.decision.max_iterations, 5);
        assert_eq!(config.decision.max_consecutive_failures, 3);
        assert_eq!(config.decision.reasoner_timeout(), Duration::from_secs(30));
        assert_eq!(config.batch_concurrency, 3);
        assert!(config.store_dir().is_none());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
retrieval:
  reranker:
    topK: 5
    normalization: clamp
classifier:
  duplicateHigh: 0.95
decision:
  maxIterations: 3
"#;
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.retrieval.reranker.top_k, 5);
        assert_eq!(config.retrieval.reranker.normalization, ScoreNormalization::Clamp);
        assert!(config.retrieval.reranker.enabled);
        assert_eq!(config.retrieval.candidate_limit, 20);
        assert_eq!(config.classifier.duplicate_high, 0.95);
        assert_eq!(config.classifier.weakly_related, 0.30);
        assert_eq!(config.decision.max_iterations, 3);
        assert_eq!(config.decision.min_query_length, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_yaml_str("decision:\n  maxIterations: 0\n").is_err());
        assert!(EngineConfig::from_yaml_str("batchConcurrency: 0\n").is_err());
        assert!(EngineConfig::from_yaml_str("retrieval:\n  hybrid:\n    rrfK: 0\n").is_err());
        assert!(
            EngineConfig::from_yaml_str("classifier:\n  similar: 0.8\n").is_err(),
            "non-decreasing thresholds must fail"
        );
    }

    #[test]
    fn test_warnings_collected() {
        let config = EngineConfig {
            decision: DecisionConfig {
                max_iterations: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.contains("maxConsecutiveFailures")));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = EngineConfig::from_path(&temp.path().join("absent.yaml")).unwrap();
        assert_eq!(config.decision.max_iterations, 5);
    }

    #[test]
    fn test_unparsable_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "retrieval: [not, a, map]\n").unwrap();
        let err = EngineConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, VrdError::InvalidConfigFile { .. }));
    }

    #[test]
    fn test_store_dir_under_data_dir() {
        let yaml = "storage:\n  dataDir: /srv/vrd\n";
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.store_dir(), Some(PathBuf::from("/srv/vrd/store")));
    }
}
