//! Vector index configuration and on-disk store metadata.

use super::traits::VectorMetric;
use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Filename for store metadata.
pub const STORE_META_FILENAME: &str = "store.meta.json";

/// Current store schema version.
const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// VectorIndexConfig
// ============================================================================

/// Configuration for creating a vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorIndexConfig {
    /// Dimension of vectors in the index.
    pub dimension: usize,

    /// Distance metric for similarity search.
    #[serde(default)]
    pub metric: VectorMetric,
}

impl VectorIndexConfig {
    /// Create a new config with cosine similarity.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            metric: VectorMetric::Cosine,
        }
    }

    /// Set the distance metric.
    pub fn with_metric(mut self, metric: VectorMetric) -> Self {
        self.metric = metric;
        self
    }
}

// ============================================================================
// VectorStoreMeta
// ============================================================================

/// Metadata for a persisted report store.
///
/// Stored in `store.meta.json` next to the record log so a reopened store can
/// refuse vectors of a different dimensionality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorStoreMeta {
    /// Dimension of dense vectors.
    pub dimension: usize,

    /// Distance metric.
    pub metric: VectorMetric,

    /// Number of records (approximate, may be stale).
    #[serde(default)]
    pub count: usize,

    /// Schema version for future migrations.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Creation timestamp (ISO 8601).
    #[serde(default)]
    pub created_at: Option<String>,

    /// Last update timestamp (ISO 8601).
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl VectorStoreMeta {
    pub fn new(dimension: usize, metric: VectorMetric) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            dimension,
            metric,
            count: 0,
            schema_version: SCHEMA_VERSION,
            created_at: Some(now.clone()),
            updated_at: Some(now),
        }
    }

    /// Update the count and timestamp.
    pub fn update_count(&mut self, count: usize) {
        self.count = count;
        self.updated_at = Some(chrono::Utc::now().to_rfc3339());
    }
}

// ============================================================================
// StoreCompatibility
// ============================================================================

/// Result of checking an on-disk store against a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCompatibility {
    /// Store is compatible and can be opened.
    Compatible,

    /// No store metadata exists yet.
    NotFound,

    /// Store exists with a different vector dimension.
    IncompatibleDimension { expected: usize, actual: usize },

    /// Store exists with a different metric.
    IncompatibleMetric {
        expected: VectorMetric,
        actual: VectorMetric,
    },

    /// Store metadata is unreadable.
    Corrupted(String),
}

impl StoreCompatibility {
    pub fn is_compatible(&self) -> bool {
        matches!(self, StoreCompatibility::Compatible)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreCompatibility::NotFound)
    }
}

/// Check whether the store under `dir` matches `config`.
pub fn check_store_compatibility(dir: &Path, config: &VectorIndexConfig) -> StoreCompatibility {
    if !dir.join(STORE_META_FILENAME).exists() {
        return StoreCompatibility::NotFound;
    }

    match load_store_meta(dir) {
        Ok(meta) => {
            if meta.dimension != config.dimension {
                return StoreCompatibility::IncompatibleDimension {
                    expected: config.dimension,
                    actual: meta.dimension,
                };
            }
            if meta.metric != config.metric {
                return StoreCompatibility::IncompatibleMetric {
                    expected: config.metric,
                    actual: meta.metric,
                };
            }
            StoreCompatibility::Compatible
        }
        Err(e) => StoreCompatibility::Corrupted(e.to_string()),
    }
}

/// Load store metadata from a directory.
pub fn load_store_meta(dir: &Path) -> DbResult<VectorStoreMeta> {
    let meta_path = dir.join(STORE_META_FILENAME);
    debug!("Loading store metadata from {:?}", meta_path);

    let content = fs::read_to_string(&meta_path)
        .map_err(|e| DbError::record_io(&meta_path, format!("Failed to read metadata: {}", e)))?;

    let meta: VectorStoreMeta = serde_json::from_str(&content).map_err(|e| DbError::RecordParse {
        path: meta_path,
        line: e.line(),
        message: format!("Failed to parse metadata: {}", e),
    })?;

    Ok(meta)
}

/// Write store metadata to a directory, creating it if needed.
pub fn write_store_meta(dir: &Path, meta: &VectorStoreMeta) -> DbResult<()> {
    let meta_path = dir.join(STORE_META_FILENAME);
    debug!("Writing store metadata to {:?}", meta_path);

    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }

    let content = serde_json::to_string_pretty(meta)?;
    fs::write(&meta_path, content)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_builder() {
        let config = VectorIndexConfig::new(384).with_metric(VectorMetric::L2);
        assert_eq!(config.dimension, 384);
        assert_eq!(config.metric, VectorMetric::L2);
    }

    #[test]
    fn test_meta_serialization() {
        let meta = VectorStoreMeta::new(1024, VectorMetric::Cosine);

        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"dimension\":1024"));
        assert!(json.contains("\"metric\":\"cosine\""));
        assert!(json.contains("\"schemaVersion\":1"));
    }

    #[test]
    fn test_compatibility_not_found() {
        let temp = TempDir::new().unwrap();
        let compat = check_store_compatibility(temp.path(), &VectorIndexConfig::new(8));
        assert!(compat.is_not_found());
    }

    #[test]
    fn test_compatibility_dimension_mismatch() {
        let temp = TempDir::new().unwrap();
        write_store_meta(temp.path(), &VectorStoreMeta::new(8, VectorMetric::Cosine)).unwrap();

        assert!(check_store_compatibility(temp.path(), &VectorIndexConfig::new(8)).is_compatible());
        assert_eq!(
            check_store_compatibility(temp.path(), &VectorIndexConfig::new(16)),
            StoreCompatibility::IncompatibleDimension {
                expected: 16,
                actual: 8
            }
        );
    }

    #[test]
    fn test_compatibility_corrupted() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(STORE_META_FILENAME), "not json").unwrap();
        let compat = check_store_compatibility(temp.path(), &VectorIndexConfig::new(8));
        assert!(matches!(compat, StoreCompatibility::Corrupted(_)));
    }
}
