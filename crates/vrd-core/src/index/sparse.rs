//! Sparse (lexical) search backend over the BM25 index.

use std::path::Path;
use std::sync::RwLock;

use tracing::{debug, warn};

use super::{IndexKind, SearchBackend, SearchResult};
use crate::bm25::{load_bm25_index, save_bm25_index, Bm25Config, Bm25Index};
use crate::embedding::EmbeddingPair;
use crate::errors::{VrdError, VrdResult};
use crate::report::ReportId;

/// BM25 search over the sparse half of each embedding pair.
#[derive(Debug)]
pub struct SparseIndex {
    inner: RwLock<Bm25Index>,
}

impl SparseIndex {
    pub fn new(config: &Bm25Config) -> Self {
        Self {
            inner: RwLock::new(Bm25Index::new(config)),
        }
    }

    /// Load a snapshot from `store_dir` if it exists and was built with the
    /// same parameters. Returns `None` when the caller must rebuild.
    pub fn load(config: &Bm25Config, store_dir: &Path) -> VrdResult<Option<Self>> {
        let index = match load_bm25_index(store_dir) {
            Ok(Some(index)) => index,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Ignoring unreadable BM25 snapshot: {}", e);
                return Ok(None);
            }
        };

        let fresh = Bm25Index::new(config);
        if index.params() != fresh.params() || index.tokenizer_config() != fresh.tokenizer_config()
        {
            debug!("BM25 snapshot built with different settings, rebuilding");
            return Ok(None);
        }

        Ok(Some(Self {
            inner: RwLock::new(index),
        }))
    }

    fn read(&self) -> VrdResult<std::sync::RwLockReadGuard<'_, Bm25Index>> {
        self.inner
            .read()
            .map_err(|e| VrdError::search_failed(IndexKind::Sparse, format!("lock poisoned: {}", e)))
    }
}

impl SearchBackend for SparseIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Sparse
    }

    fn index(&self, id: &ReportId, embedding: &EmbeddingPair) -> VrdResult<()> {
        let mut index = self.inner.write().map_err(|e| {
            VrdError::index_write(id.as_str(), format!("sparse index lock poisoned: {}", e))
        })?;
        index.add_document(id.as_str(), &embedding.sparse);
        Ok(())
    }

    fn search(&self, query: &EmbeddingPair, limit: usize) -> VrdResult<Vec<SearchResult>> {
        let hits = self.read()?.search(&query.sparse, limit);
        Ok(hits
            .into_iter()
            .map(|hit| SearchResult {
                report_id: ReportId::new(hit.doc_id),
                source: IndexKind::Sparse,
                rank: hit.rank,
                score: hit.score,
            })
            .collect())
    }

    fn contains(&self, id: &ReportId) -> VrdResult<bool> {
        Ok(self.read()?.contains(id.as_str()))
    }

    fn len(&self) -> VrdResult<usize> {
        Ok(self.read()?.num_documents())
    }

    fn vocabulary_size(&self) -> Option<usize> {
        self.read().ok().map(|index| index.vocabulary_size())
    }

    fn checkpoint(&self, store_dir: &Path) -> VrdResult<()> {
        save_bm25_index(&*self.read()?, store_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{SparseEncoder, SparseVector};
    use tempfile::TempDir;

    fn pair(text: &str) -> EmbeddingPair {
        EmbeddingPair::new(Vec::new(), SparseEncoder::default().encode(text))
    }

    #[test]
    fn test_search_returns_ranked_results() {
        let index = SparseIndex::new(&Bm25Config::default());
        index.index(&ReportId::from("a"), &pair("ssrf metadata endpoint")).unwrap();
        index.index(&ReportId::from("b"), &pair("ssrf ssrf webhook url")).unwrap();
        index.index(&ReportId::from("c"), &pair("csrf token missing")).unwrap();

        let results = index.search(&pair("ssrf"), 10).unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.report_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(results[0].rank, 1);
        assert!(results.iter().all(|r| r.source == IndexKind::Sparse));
    }

    #[test]
    fn test_empty_query_matches_nothing() {
        let index = SparseIndex::new(&Bm25Config::default());
        index.index(&ReportId::from("a"), &pair("anything")).unwrap();
        let query = EmbeddingPair::new(Vec::new(), SparseVector::new());
        assert!(index.search(&query, 10).unwrap().is_empty());
    }

    #[test]
    fn test_checkpoint_and_load() {
        let temp = TempDir::new().unwrap();
        let config = Bm25Config::default();
        let index = SparseIndex::new(&config);
        index.index(&ReportId::from("a"), &pair("idor invoice download")).unwrap();
        index.checkpoint(temp.path()).unwrap();

        let loaded = SparseIndex::load(&config, temp.path()).unwrap().unwrap();
        assert!(loaded.contains(&ReportId::from("a")).unwrap());
        assert_eq!(loaded.len().unwrap(), 1);
    }

    #[test]
    fn test_load_with_different_params_requests_rebuild() {
        let temp = TempDir::new().unwrap();
        let index = SparseIndex::new(&Bm25Config::default());
        index.index(&ReportId::from("a"), &pair("idor invoice")).unwrap();
        index.checkpoint(temp.path()).unwrap();

        let other = Bm25Config {
            k1: 2.0,
            ..Default::default()
        };
        assert!(SparseIndex::load(&other, temp.path()).unwrap().is_none());
    }
}
