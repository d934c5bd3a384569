//! Dual index: dense and sparse retrieval over one report store.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   insert ─────► │ ReportStore  │  (source of truth, record log)
//!                 └──────┬───────┘
//!                        │
//!            ┌───────────┴───────────┐
//!            ▼                       ▼
//!     ┌─────────────┐         ┌─────────────┐
//!     │ DenseIndex  │         │ SparseIndex │
//!     │ (cosine)    │         │ (BM25)      │
//!     └─────────────┘         └─────────────┘
//! ```
//!
//! Both indexes implement [`SearchBackend`], so fusion never needs to know
//! which retrieval method produced a ranked list.
//!
//! Reads take only backend read locks and run in parallel. Writes are
//! serialized per report id.

mod dense;
mod sparse;

pub use dense::DenseIndex;
pub use sparse::SparseIndex;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vrd_db::vector::{
    check_store_compatibility, write_store_meta, StoreCompatibility, VectorIndexConfig,
    VectorMetric, VectorStoreMeta,
};

use crate::bm25::Bm25Config;
use crate::embedding::EmbeddingPair;
use crate::errors::{VrdError, VrdResult};
use crate::report::{NormalizedReport, ReportId};
use crate::store::{ReportStore, StoredReport};

// ============================================================================
// Search types
// ============================================================================

/// Which retrieval method produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Dense,
    Sparse,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dense => write!(f, "dense"),
            Self::Sparse => write!(f, "sparse"),
        }
    }
}

/// One hit from one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub report_id: ReportId,
    pub source: IndexKind,
    /// 1-based rank within the source list.
    pub rank: usize,
    /// Raw backend score (cosine or BM25).
    pub score: f32,
}

/// A retrieval backend the dual index can search.
pub trait SearchBackend: Send + Sync {
    fn kind(&self) -> IndexKind;

    /// Add a report's vectors. Must be idempotent for an already indexed id.
    fn index(&self, id: &ReportId, embedding: &EmbeddingPair) -> VrdResult<()>;

    /// Highest relevance first, ties broken by id, 1-based ranks.
    fn search(&self, query: &EmbeddingPair, limit: usize) -> VrdResult<Vec<SearchResult>>;

    fn contains(&self, id: &ReportId) -> VrdResult<bool>;

    fn len(&self) -> VrdResult<usize>;

    fn is_empty(&self) -> VrdResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Dense vector dimension, for backends that have one.
    fn dimension(&self) -> Option<usize> {
        None
    }

    /// Vocabulary size, for lexical backends.
    fn vocabulary_size(&self) -> Option<usize> {
        None
    }

    /// Persist derived state under `store_dir`. Default: nothing to persist.
    fn checkpoint(&self, _store_dir: &Path) -> VrdResult<()> {
        Ok(())
    }
}

/// Results of searching both indexes with one query. Each side fails
/// independently.
#[derive(Debug)]
pub struct HybridHits {
    pub dense: VrdResult<Vec<SearchResult>>,
    pub sparse: VrdResult<Vec<SearchResult>>,
}

impl HybridHits {
    pub fn both_failed(&self) -> bool {
        self.dense.is_err() && self.sparse.is_err()
    }

    pub fn any_failed(&self) -> bool {
        self.dense.is_err() || self.sparse.is_err()
    }
}

/// Outcome of [`DualIndex::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Identical content was already indexed; nothing changed.
    AlreadyPresent,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Empty,
    Inconsistent,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Empty => "empty",
            Self::Inconsistent => "inconsistent",
        };
        f.write_str(s)
    }
}

/// Per-index document counts and derived status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexHealth {
    pub status: HealthStatus,
    pub store_count: usize,
    pub dense_count: usize,
    pub sparse_count: usize,
    pub vocabulary_size: Option<usize>,
    pub dimension: Option<usize>,
}

// ============================================================================
// DualIndex
// ============================================================================

/// Report store plus its dense and sparse indexes.
pub struct DualIndex {
    store: ReportStore,
    dense: Arc<dyn SearchBackend>,
    sparse: Arc<dyn SearchBackend>,
    write_locks: Mutex<HashMap<ReportId, Arc<Mutex<()>>>>,
}

impl fmt::Debug for DualIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualIndex")
            .field("store", &self.store.dir())
            .field("dense", &self.dense.kind())
            .field("sparse", &self.sparse.kind())
            .finish()
    }
}

impl DualIndex {
    /// Volatile index with the built-in backends.
    pub fn in_memory(dimension: usize, bm25: &Bm25Config) -> VrdResult<Self> {
        Ok(Self::with_backends(
            ReportStore::in_memory(),
            Arc::new(DenseIndex::new(dimension)?),
            Arc::new(SparseIndex::new(bm25)),
        ))
    }

    /// Assemble from parts. Reports already in `store` are indexed into any
    /// backend that lacks them.
    pub fn with_backends(
        store: ReportStore,
        dense: Arc<dyn SearchBackend>,
        sparse: Arc<dyn SearchBackend>,
    ) -> Self {
        let index = Self {
            store,
            dense,
            sparse,
            write_locks: Mutex::new(HashMap::new()),
        };
        if let Err(e) = index.reconcile() {
            warn!("Could not index stored reports: {}", e);
        }
        index
    }

    /// Open the persistent index under `store_dir`.
    ///
    /// Dense vectors are rebuilt from the record log. The BM25 snapshot is
    /// used when it covers exactly the stored reports, otherwise BM25 is
    /// rebuilt too.
    pub fn open(store_dir: &Path, dimension: usize, bm25: &Bm25Config) -> VrdResult<Self> {
        let vector_config = VectorIndexConfig::new(dimension);
        match check_store_compatibility(store_dir, &vector_config) {
            StoreCompatibility::Compatible => {}
            StoreCompatibility::NotFound => {
                write_store_meta(store_dir, &VectorStoreMeta::new(dimension, VectorMetric::Cosine))?;
            }
            StoreCompatibility::IncompatibleDimension { expected, actual } => {
                return Err(VrdError::StoreCorrupted {
                    path: store_dir.to_path_buf(),
                    reason: format!(
                        "store holds {}-dimensional vectors but the embedder produces {}",
                        actual, expected
                    ),
                });
            }
            StoreCompatibility::IncompatibleMetric { expected, actual } => {
                return Err(VrdError::StoreCorrupted {
                    path: store_dir.to_path_buf(),
                    reason: format!("store uses {} metric, expected {}", actual, expected),
                });
            }
            StoreCompatibility::Corrupted(reason) => {
                return Err(VrdError::StoreCorrupted {
                    path: store_dir.to_path_buf(),
                    reason,
                });
            }
        }

        let store = ReportStore::open(store_dir)?;
        for record in store.all()? {
            if record.embedding.dense.len() != dimension {
                return Err(VrdError::StoreCorrupted {
                    path: store_dir.to_path_buf(),
                    reason: format!(
                        "record `{}` has {} dimensions, expected {}",
                        record.id(),
                        record.embedding.dense.len(),
                        dimension
                    ),
                });
            }
        }

        let stored = store.len()?;
        let sparse = match SparseIndex::load(bm25, store_dir)? {
            Some(snapshot) if snapshot.len()? == stored => {
                debug!("Using BM25 snapshot with {} documents", stored);
                snapshot
            }
            Some(snapshot) => {
                info!(
                    "BM25 snapshot has {} documents but store has {}, rebuilding",
                    snapshot.len()?,
                    stored
                );
                SparseIndex::new(bm25)
            }
            None => SparseIndex::new(bm25),
        };

        let index = Self {
            store,
            dense: Arc::new(DenseIndex::new(dimension)?),
            sparse: Arc::new(sparse),
            write_locks: Mutex::new(HashMap::new()),
        };
        index.reconcile()?;
        info!("Opened dual index at {:?} ({} reports)", store_dir, stored);
        Ok(index)
    }

    /// Index every stored report missing from a backend.
    fn reconcile(&self) -> VrdResult<()> {
        for record in self.store.all()? {
            self.index_missing(&record)?;
        }
        Ok(())
    }

    fn index_missing(&self, record: &StoredReport) -> VrdResult<()> {
        for backend in [&self.dense, &self.sparse] {
            if !backend.contains(record.id())? {
                backend.index(record.id(), &record.embedding)?;
            }
        }
        Ok(())
    }

    /// Add a report to the store and both indexes.
    ///
    /// Re-inserting identical content is a no-op. An id that is already
    /// indexed with different content, or an id that is not the hash of the
    /// report's content, is rejected with `IndexWriteError`.
    pub fn insert(
        &self,
        report: &NormalizedReport,
        embedding: &EmbeddingPair,
    ) -> VrdResult<InsertOutcome> {
        let lock = self.lock_for(&report.id)?;
        let outcome = {
            let _guard = lock.lock().map_err(|e| {
                VrdError::index_write(report.id.as_str(), format!("write lock poisoned: {}", e))
            })?;
            self.insert_locked(report, embedding)
        };
        self.release_lock(&report.id, lock);
        outcome
    }

    fn insert_locked(
        &self,
        report: &NormalizedReport,
        embedding: &EmbeddingPair,
    ) -> VrdResult<InsertOutcome> {
        if let Some(existing) = self.store.get(&report.id)? {
            if !existing.report.same_content(report) {
                return Err(VrdError::index_write(
                    report.id.as_str(),
                    "identifier already indexed with different content",
                ));
            }
            self.index_missing(&existing)?;
            return Ok(InsertOutcome::AlreadyPresent);
        }

        if report.content_hash() != report.id {
            return Err(VrdError::index_write(
                report.id.as_str(),
                "identifier does not match the content hash",
            ));
        }
        if let Some(dimension) = self.dense.dimension() {
            if embedding.dense.len() != dimension {
                return Err(VrdError::index_write(
                    report.id.as_str(),
                    format!(
                        "dense vector has {} dimensions, index expects {}",
                        embedding.dense.len(),
                        dimension
                    ),
                ));
            }
        }

        let record = self
            .store
            .put(StoredReport::new(report.clone(), embedding.clone()))?;
        self.dense.index(record.id(), &record.embedding)?;
        self.sparse.index(record.id(), &record.embedding)?;
        Ok(InsertOutcome::Inserted)
    }

    fn lock_for(&self, id: &ReportId) -> VrdResult<Arc<Mutex<()>>> {
        let mut locks = self.write_locks.lock().map_err(|e| {
            VrdError::index_write(id.as_str(), format!("lock map poisoned: {}", e))
        })?;
        Ok(Arc::clone(locks.entry(id.clone()).or_default()))
    }

    fn release_lock(&self, id: &ReportId, lock: Arc<Mutex<()>>) {
        if let Ok(mut locks) = self.write_locks.lock() {
            // map + ours: nobody else is waiting
            let idle = Arc::strong_count(&lock) == 2;
            drop(lock);
            if idle {
                locks.remove(id);
            }
        }
    }

    /// Search one index.
    pub fn search(
        &self,
        query: &EmbeddingPair,
        kind: IndexKind,
        limit: usize,
    ) -> VrdResult<Vec<SearchResult>> {
        let backend = match kind {
            IndexKind::Dense => &self.dense,
            IndexKind::Sparse => &self.sparse,
        };
        backend.search(query, limit).map_err(|e| match e {
            e @ VrdError::SearchFailed { .. } => e,
            other => VrdError::search_failed(kind, other.to_string()),
        })
    }

    /// Search both indexes with the same query.
    pub fn search_hybrid(&self, query: &EmbeddingPair, limit: usize) -> HybridHits {
        HybridHits {
            dense: self.search(query, IndexKind::Dense, limit),
            sparse: self.search(query, IndexKind::Sparse, limit),
        }
    }

    pub fn get(&self, id: &ReportId) -> VrdResult<Option<Arc<StoredReport>>> {
        self.store.get(id)
    }

    pub fn contains(&self, id: &ReportId) -> VrdResult<bool> {
        self.store.contains(id)
    }

    pub fn len(&self) -> VrdResult<usize> {
        self.store.len()
    }

    pub fn is_empty(&self) -> VrdResult<bool> {
        self.store.is_empty()
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    pub fn health(&self) -> VrdResult<IndexHealth> {
        let store_count = self.store.len()?;
        let dense_count = self.dense.len()?;
        let sparse_count = self.sparse.len()?;

        let status = if store_count == 0 && dense_count == 0 && sparse_count == 0 {
            HealthStatus::Empty
        } else if dense_count == store_count && sparse_count == store_count {
            HealthStatus::Healthy
        } else {
            HealthStatus::Inconsistent
        };

        Ok(IndexHealth {
            status,
            store_count,
            dense_count,
            sparse_count,
            vocabulary_size: self.sparse.vocabulary_size(),
            dimension: self.dense.dimension(),
        })
    }

    /// Snapshot derived state next to the record log. No-op for volatile
    /// stores.
    pub fn checkpoint(&self) -> VrdResult<()> {
        let Some(dir) = self.store.dir() else {
            return Ok(());
        };
        self.dense.checkpoint(dir)?;
        self.sparse.checkpoint(dir)?;
        if let Some(dimension) = self.dense.dimension() {
            let mut meta = VectorStoreMeta::new(dimension, VectorMetric::Cosine);
            if let Ok(existing) = vrd_db::vector::load_store_meta(dir) {
                meta.created_at = existing.created_at;
            }
            meta.update_count(self.store.len()?);
            write_store_meta(dir, &meta)?;
        }
        debug!("Checkpointed dual index at {:?}", dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedder, HashingEmbedder};
    use crate::report::VulnerabilityCategory;
    use tempfile::TempDir;

    const DIM: usize = 64;

    fn report(title: &str, summary: &str) -> NormalizedReport {
        NormalizedReport::builder(
            title,
            summary,
            VulnerabilityCategory::PathTraversal,
            "/files/download",
        )
        .build()
    }

    fn embed(r: &NormalizedReport) -> EmbeddingPair {
        HashingEmbedder::new(DIM).embed(&r.embedding_text()).unwrap()
    }

    fn index() -> DualIndex {
        DualIndex::in_memory(DIM, &Bm25Config::default()).unwrap()
    }

    // ========================================================================
    // Insert
    // ========================================================================

    #[test]
    fn test_insert_and_search_both_kinds() {
        let index = index();
        let r = report("Path traversal in download", "name=../../etc/passwd reads files");
        assert_eq!(index.insert(&r, &embed(&r)).unwrap(), InsertOutcome::Inserted);

        let query = HashingEmbedder::new(DIM).embed("download passwd traversal").unwrap();
        let dense = index.search(&query, IndexKind::Dense, 5).unwrap();
        let sparse = index.search(&query, IndexKind::Sparse, 5).unwrap();
        assert_eq!(dense[0].report_id, r.id);
        assert_eq!(sparse[0].report_id, r.id);
        assert_eq!(dense[0].rank, 1);
    }

    #[test]
    fn test_insert_identical_content_is_noop() {
        let index = index();
        let r = report("Path traversal", "dot-dot-slash in filename");
        index.insert(&r, &embed(&r)).unwrap();
        assert_eq!(
            index.insert(&r.clone(), &embed(&r)).unwrap(),
            InsertOutcome::AlreadyPresent
        );
        let health = index.health().unwrap();
        assert_eq!(health.store_count, 1);
        assert_eq!(health.dense_count, 1);
        assert_eq!(health.sparse_count, 1);
        assert_eq!(health.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_insert_collision_is_index_write_error() {
        let index = index();
        let original = report("Path traversal", "dot-dot-slash in filename");
        index.insert(&original, &embed(&original)).unwrap();

        let mut edited = original.clone();
        edited.summary = "different content, stale id".into();
        let err = index.insert(&edited, &embed(&edited)).unwrap_err();
        assert!(matches!(err, VrdError::IndexWriteError { .. }));

        let stored = index.get(&original.id).unwrap().unwrap();
        assert_eq!(stored.report.summary, original.summary);
    }

    #[test]
    fn test_insert_rejects_id_not_matching_content() {
        let index = index();
        let mut r = report("Path traversal", "dot-dot-slash in filename");
        r.id = ReportId::new("not-a-hash");
        let err = index.insert(&r, &embed(&r)).unwrap_err();
        assert!(matches!(err, VrdError::IndexWriteError { .. }));
        assert!(index.is_empty().unwrap());
    }

    #[test]
    fn test_insert_rejects_wrong_dimension() {
        let index = index();
        let r = report("Path traversal", "dot-dot-slash in filename");
        let pair = HashingEmbedder::new(8).embed(&r.embedding_text()).unwrap();
        assert!(index.insert(&r, &pair).is_err());
    }

    #[test]
    fn test_concurrent_identical_inserts_store_once() {
        let index = Arc::new(index());
        let r = report("Path traversal", "dot-dot-slash in filename");
        let pair = embed(&r);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let (index, r, pair) = (Arc::clone(&index), r.clone(), pair.clone());
                scope.spawn(move || index.insert(&r, &pair).unwrap());
            }
        });

        assert_eq!(index.len().unwrap(), 1);
        assert_eq!(index.health().unwrap().sparse_count, 1);
        assert!(index.write_locks.lock().unwrap().is_empty());
    }

    // ========================================================================
    // Health and persistence
    // ========================================================================

    #[test]
    fn test_empty_health() {
        let health = index().health().unwrap();
        assert_eq!(health.status, HealthStatus::Empty);
        assert_eq!(health.dimension, Some(DIM));
        assert_eq!(health.vocabulary_size, Some(0));
    }

    #[test]
    fn test_open_replays_and_uses_snapshot() {
        let temp = TempDir::new().unwrap();
        let bm25 = Bm25Config::default();
        let a = report("Traversal A", "zip slip in archive extraction");
        let b = report("Traversal B", "absolute path accepted in export");
        {
            let index = DualIndex::open(temp.path(), DIM, &bm25).unwrap();
            index.insert(&a, &embed(&a)).unwrap();
            index.checkpoint().unwrap();
            index.insert(&b, &embed(&b)).unwrap();
        }

        let index = DualIndex::open(temp.path(), DIM, &bm25).unwrap();
        let health = index.health().unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.store_count, 2);
        assert_eq!(health.sparse_count, 2);

        let query = HashingEmbedder::new(DIM).embed("zip slip archive").unwrap();
        let hits = index.search(&query, IndexKind::Sparse, 5).unwrap();
        assert_eq!(hits[0].report_id, a.id);
    }

    #[test]
    fn test_open_with_other_dimension_is_store_corrupted() {
        let temp = TempDir::new().unwrap();
        DualIndex::open(temp.path(), DIM, &Bm25Config::default()).unwrap();
        let err = DualIndex::open(temp.path(), DIM * 2, &Bm25Config::default()).unwrap_err();
        assert!(matches!(err, VrdError::StoreCorrupted { .. }));
    }
}
