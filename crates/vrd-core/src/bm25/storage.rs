//! BM25 index snapshots.
//!
//! bincode v2 binary snapshot plus a JSON sidecar:
//!
//! ```text
//! <data_dir>/store/bm25/
//! ├── index.bin         # Serialized Bm25Index
//! └── meta.json         # Version and statistics
//! ```
//!
//! The snapshot is a cache. The record log stays the source of truth, so a
//! missing, stale or unreadable snapshot only costs a rebuild.

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use bincode::config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::index::{Bm25Index, Bm25IndexStats};
use crate::errors::{VrdError, VrdResult};

/// Directory name for BM25 snapshots inside the store directory.
pub const BM25_DIR_NAME: &str = "bm25";

const INDEX_FILENAME: &str = "index.bin";
const META_FILENAME: &str = "meta.json";

/// Snapshot metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bm25IndexMeta {
    pub version: u32,
    pub stats: Bm25IndexStats,
    pub built_at: DateTime<Utc>,
}

impl Bm25IndexMeta {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(stats: Bm25IndexStats) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            stats,
            built_at: Utc::now(),
        }
    }
}

pub fn bm25_dir(store_dir: &Path) -> PathBuf {
    store_dir.join(BM25_DIR_NAME)
}

fn corrupted(path: &Path, reason: impl std::fmt::Display) -> VrdError {
    VrdError::StoreCorrupted {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Write a snapshot of `index` under `store_dir/bm25/`.
///
/// The index file is written to a temporary name and renamed into place, so
/// a crash never leaves a half-written `index.bin`.
pub fn save_bm25_index(index: &Bm25Index, store_dir: &Path) -> VrdResult<()> {
    let dir = bm25_dir(store_dir);
    fs::create_dir_all(&dir)?;

    let index_file = dir.join(INDEX_FILENAME);
    let tmp_file = dir.join(format!("{}.tmp", INDEX_FILENAME));
    {
        let file = fs::File::create(&tmp_file)?;
        let mut writer = BufWriter::new(file);
        bincode::encode_into_std_write(index, &mut writer, config::standard())
            .map_err(|e| corrupted(&tmp_file, format!("failed to encode BM25 index: {}", e)))?;
        writer.flush()?;
    }
    fs::rename(&tmp_file, &index_file)?;

    let meta = Bm25IndexMeta::new(index.stats());
    fs::write(dir.join(META_FILENAME), serde_json::to_string_pretty(&meta)?)?;

    debug!(
        "Saved BM25 snapshot to {}: {} docs, {} terms",
        dir.display(),
        index.num_documents(),
        index.vocabulary_size()
    );
    Ok(())
}

/// Read snapshot metadata without decoding the index.
pub fn load_bm25_meta(store_dir: &Path) -> VrdResult<Option<Bm25IndexMeta>> {
    let meta_file = bm25_dir(store_dir).join(META_FILENAME);
    if !meta_file.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&meta_file)?;
    let meta = serde_json::from_str(&content)
        .map_err(|e| corrupted(&meta_file, format!("failed to parse BM25 metadata: {}", e)))?;
    Ok(Some(meta))
}

/// Load a snapshot.
///
/// `Ok(None)` when there is no snapshot or its version is unknown; callers
/// rebuild from the record log in that case.
pub fn load_bm25_index(store_dir: &Path) -> VrdResult<Option<Bm25Index>> {
    let dir = bm25_dir(store_dir);
    let index_file = dir.join(INDEX_FILENAME);

    if !index_file.exists() {
        debug!("No BM25 snapshot at {}", index_file.display());
        return Ok(None);
    }

    if let Some(meta) = load_bm25_meta(store_dir)? {
        if meta.version != Bm25IndexMeta::CURRENT_VERSION {
            warn!(
                "BM25 snapshot version mismatch: found {}, expected {}. Index will be rebuilt.",
                meta.version,
                Bm25IndexMeta::CURRENT_VERSION
            );
            return Ok(None);
        }
    }

    let file = fs::File::open(&index_file)?;
    let mut reader = BufReader::new(file);
    let index: Bm25Index = bincode::decode_from_std_read(&mut reader, config::standard())
        .map_err(|e| corrupted(&index_file, format!("failed to decode BM25 index: {}", e)))?;

    debug!(
        "Loaded BM25 snapshot from {}: {} docs, {} terms",
        dir.display(),
        index.num_documents(),
        index.vocabulary_size()
    );
    Ok(Some(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bm25::Bm25Config;
    use crate::embedding::SparseEncoder;
    use tempfile::TempDir;

    fn create_test_index() -> Bm25Index {
        let encoder = SparseEncoder::default();
        let mut index = Bm25Index::new(&Bm25Config::default());
        index.add_document("r1", &encoder.encode("jwt signature not verified"));
        index.add_document("r2", &encoder.encode("jwt none algorithm accepted"));
        index.add_document("r3", &encoder.encode("path traversal in download"));
        index
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let original = create_test_index();

        save_bm25_index(&original, temp_dir.path()).unwrap();
        let loaded = load_bm25_index(temp_dir.path()).unwrap().unwrap();

        assert_eq!(loaded.num_documents(), original.num_documents());
        assert_eq!(loaded.vocabulary_size(), original.vocabulary_size());
        assert!(loaded.contains("r2"));
    }

    #[test]
    fn test_load_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_bm25_index(temp_dir.path()).unwrap().is_none());
        assert!(load_bm25_meta(temp_dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_metadata() {
        let temp_dir = TempDir::new().unwrap();
        save_bm25_index(&create_test_index(), temp_dir.path()).unwrap();

        let meta = load_bm25_meta(temp_dir.path()).unwrap().unwrap();
        assert_eq!(meta.version, Bm25IndexMeta::CURRENT_VERSION);
        assert_eq!(meta.stats.num_documents, 3);
    }

    #[test]
    fn test_version_mismatch_requests_rebuild() {
        let temp_dir = TempDir::new().unwrap();
        save_bm25_index(&create_test_index(), temp_dir.path()).unwrap();

        let meta_file = bm25_dir(temp_dir.path()).join(META_FILENAME);
        let mut meta = load_bm25_meta(temp_dir.path()).unwrap().unwrap();
        meta.version = 99;
        fs::write(&meta_file, serde_json::to_string(&meta).unwrap()).unwrap();

        assert!(load_bm25_index(temp_dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_garbage_snapshot_is_store_corrupted() {
        let temp_dir = TempDir::new().unwrap();
        let dir = bm25_dir(temp_dir.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(INDEX_FILENAME), b"\xff\xff\xff").unwrap();

        let err = load_bm25_index(temp_dir.path()).unwrap_err();
        assert!(matches!(err, VrdError::StoreCorrupted { .. }));
    }

    #[test]
    fn test_search_after_reload() {
        let temp_dir = TempDir::new().unwrap();
        save_bm25_index(&create_test_index(), temp_dir.path()).unwrap();
        let loaded = load_bm25_index(temp_dir.path()).unwrap().unwrap();

        let query = SparseEncoder::default().encode("jwt");
        let ids: Vec<_> = loaded
            .search(&query, 10)
            .into_iter()
            .map(|r| r.doc_id)
            .collect();
        assert_eq!(ids, vec!["r1".to_string(), "r2".to_string()]);
    }
}
