//! Dense (semantic) search backend over a `vrd-db` vector index.

use std::sync::Arc;

use vrd_db::vector::{
    open_vector_index, VectorId, VectorIndexBackend, VectorIndexConfig, VectorInsert,
};

use super::{IndexKind, SearchBackend, SearchResult};
use crate::embedding::EmbeddingPair;
use crate::errors::{VrdError, VrdResult};
use crate::report::ReportId;

/// Cosine nearest-neighbour search over dense vectors.
pub struct DenseIndex {
    inner: Arc<dyn VectorIndexBackend>,
}

impl DenseIndex {
    pub fn new(dimension: usize) -> VrdResult<Self> {
        let inner = open_vector_index(&VectorIndexConfig::new(dimension))?;
        Ok(Self { inner })
    }

    /// Wrap an existing vector index.
    pub fn from_backend(inner: Arc<dyn VectorIndexBackend>) -> Self {
        Self { inner }
    }
}

impl std::fmt::Debug for DenseIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseIndex")
            .field("dimension", &self.inner.dimension())
            .field("metric", &self.inner.metric())
            .finish()
    }
}

impl SearchBackend for DenseIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Dense
    }

    fn index(&self, id: &ReportId, embedding: &EmbeddingPair) -> VrdResult<()> {
        let insert = VectorInsert::new(id.as_str(), embedding.dense.clone());
        self.inner.upsert(&[insert])?;
        Ok(())
    }

    fn search(&self, query: &EmbeddingPair, limit: usize) -> VrdResult<Vec<SearchResult>> {
        let hits = self
            .inner
            .query(&query.dense, limit)
            .map_err(|e| VrdError::search_failed(IndexKind::Dense, e.to_string()))?;

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| SearchResult {
                report_id: ReportId::from(hit.id),
                source: IndexKind::Dense,
                rank: i + 1,
                score: hit.score,
            })
            .collect())
    }

    fn contains(&self, id: &ReportId) -> VrdResult<bool> {
        Ok(self.inner.contains(&VectorId::new(id.as_str()))?)
    }

    fn len(&self) -> VrdResult<usize> {
        Ok(self.inner.len()?)
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.inner.dimension())
    }
}
