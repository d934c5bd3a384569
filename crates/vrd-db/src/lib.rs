//! # vrd-db
//!
//! Infrastructure layer for VRD - dense vector storage and report record persistence.
//!
//! This crate keeps the storage mechanics out of `vrd-core`. The core only sees
//! the [`vector::VectorIndexBackend`] trait and the [`records::RecordLog`]
//! append-only log, so storage can be swapped without touching retrieval or the
//! decision loop.
//!
//! ## Architecture
//!
//! ```text
//! caller → vrd-core → (traits)
//!              ↑
//!           vrd-db (dense vectors, record log)
//!           vrd-model (cross-encoder reranker)
//! ```
//!
//! ## Modules
//!
//! - `vector`: In-memory dense vector index with cosine/dot/L2 scoring
//! - `records`: JSONL record log keyed by report identifier
//!
//! ## Usage
//!
//! ```ignore
//! use vrd_db::vector::{open_vector_index, VectorIndexConfig, VectorInsert};
//!
//! let index = open_vector_index(&VectorIndexConfig::new(384))?;
//! index.upsert(&[VectorInsert::new("a1b2", embedding)])?;
//! let hits = index.query(&query_embedding, 10)?;
//! ```

pub mod error;
pub mod records;
pub mod vector;

pub use error::{DbError, DbResult};
