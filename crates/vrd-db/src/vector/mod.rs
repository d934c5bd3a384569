//! Dense vector index for VRD's semantic retrieval.
//!
//! ## Available Backends
//!
//! - `memory`: exact linear-scan index held in memory, ties broken by id
//!
//! ## Usage
//!
//! ```ignore
//! use vrd_db::vector::{open_vector_index, VectorIndexConfig};
//!
//! let index = open_vector_index(&VectorIndexConfig::new(384))?;
//! index.upsert(&inserts)?;
//! let results = index.query(&embedding, 10)?;
//! ```

mod config;
mod memory;
mod traits;

pub use config::{
    check_store_compatibility, load_store_meta, write_store_meta, StoreCompatibility,
    VectorIndexConfig, VectorStoreMeta, STORE_META_FILENAME,
};
pub use memory::{cosine_similarity, MemoryVectorIndex};
pub use traits::{VectorId, VectorIndexBackend, VectorInsert, VectorMetric, VectorSearchResult};

use crate::error::DbResult;
use std::sync::Arc;
use tracing::debug;

/// Open a vector index with the given configuration.
pub fn open_vector_index(config: &VectorIndexConfig) -> DbResult<Arc<dyn VectorIndexBackend>> {
    debug!(
        "Opening in-memory vector index (dim={}, metric={})",
        config.dimension, config.metric
    );
    Ok(Arc::new(MemoryVectorIndex::new(config)))
}
