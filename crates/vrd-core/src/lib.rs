//! # vrd-core
//!
//! **Vulnerability Report Dedup** – hybrid retrieval and duplicate
//! classification engine.
//!
//! Incoming vulnerability reports are compared against a corpus of known
//! reports. Retrieval runs over a dense vector index and a BM25 index, the
//! two ranked lists are fused with Reciprocal Rank Fusion, and a
//! cross-encoder reranks the fused candidates. A bounded decision session
//! reformulates the query across several dimensions of the report until the
//! best score is decisive, then classifies it as duplicate, similar or new.
//!
//! ## Main Types
//!
//! - [`Engine`] – the entry point for ingest and scan
//! - [`NormalizedReport`] – the structured report every operation consumes
//! - [`Verdict`] – the outcome of a scan, with its iteration trace
//! - [`VrdError`] – domain-specific error type
//!
//! ## Modules
//!
//! - [`report`] – report model and content hashing
//! - [`store`] – authoritative report store
//! - [`index`] – dense and sparse indexes behind [`DualIndex`]
//! - [`bm25`] – tokenizer, BM25 scoring and snapshots
//! - [`fusion`] – Reciprocal Rank Fusion
//! - [`reranker`] – cross-encoder reranking with degraded fallback
//! - [`classifier`] – score bands to verdict and confidence
//! - [`reasoner`] – query reformulation
//! - [`session`] – the decision loop
//! - [`engine`] – wiring and batch operations
//! - [`config`] – YAML configuration
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vrd_core::{Engine, HashingEmbedder, NormalizedReport, VulnerabilityCategory};
//!
//! let engine = Engine::builder(Arc::new(HashingEmbedder::default())).build()?;
//!
//! let known = NormalizedReport::builder(
//!     "Race condition in token exchange",
//!     "Concurrent requests redeem one authorization code twice",
//!     VulnerabilityCategory::RaceCondition,
//!     "/oauth/token",
//! )
//! .build();
//! engine.ingest(&known)?;
//!
//! let verdict = engine.scan(&incoming).await?;
//! if verdict.is_duplicate() {
//!     println!("duplicate of {:?}", verdict.matched_report_id);
//! }
//! ```

// Modules
pub mod bm25;
pub mod cancellation;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod embedding;
pub mod engine;
pub mod errors;
pub mod fusion;
pub mod index;
pub mod model_adapter;
pub mod reasoner;
pub mod report;
pub mod reranker;
pub mod session;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use bm25::{Bm25Config, Bm25Index, HybridSearchConfig, Tokenizer, TokenizerConfig};
pub use cancellation::CancellationToken;
pub use classifier::{classify, ClassifierThresholds, Confidence, VerdictStatus};
pub use config::{DecisionConfig, EngineConfig, RerankerConfig, RetrievalConfig, StorageConfig};
pub use embedding::{Embedder, EmbeddingPair, HashingEmbedder, SparseEncoder, SparseVector};
pub use engine::{Engine, EngineBuilder, Normalizer};
pub use errors::{VrdError, VrdResult};
pub use fusion::{fuse, FusedCandidate, SourceRank};
pub use index::{
    DualIndex, HealthStatus, HybridHits, IndexHealth, IndexKind, InsertOutcome, SearchBackend,
    SearchResult,
};
pub use model_adapter::{create_reranker, ModelRerankerBackend};
pub use reasoner::{FallbackReasoner, QueryReasoner, ReasonerStep, SearchDimension};
pub use report::{
    ArtifactKind, NormalizedReport, ReportBuilder, ReportId, ReportMetadata, Severity,
    TechnicalArtifact, VulnerabilityCategory,
};
pub use reranker::{
    RerankOutcome, RerankedCandidate, Reranker, RerankerBackend, ScoreNormalization,
};
pub use session::{
    DecisionSession, FailureKind, IterationFailure, IterationRecord, QuerySource, SessionContext,
    SessionState, Verdict,
};
pub use store::{ReportStore, StoredReport};
pub use types::{BatchIngestSummary, BatchItemError, EngineStats, IngestionResult};

// Re-export the model crate's device selection for config consumers
pub use vrd_model::DevicePreference;
