//! VRD Engine: the entry point for ingesting and scanning reports.
//!
//! The [`Engine`] owns the dual index and the collaborators every decision
//! session reads from. It is built once and shared (`Arc<Engine>`);
//! concurrent scans only take index read locks.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vrd_core::{Engine, EngineConfig, HashingEmbedder};
//!
//! let engine = Engine::builder(Arc::new(HashingEmbedder::default()))
//!     .config(EngineConfig::load_default()?)
//!     .build()?;
//! engine.ingest(&known_report)?;
//! let verdict = engine.scan(&incoming_report).await?;
//! println!("{} ({})", verdict.status, verdict.confidence);
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::cancellation::CancellationToken;
use crate::config::EngineConfig;
use crate::embedding::{checked_embed, Embedder};
use crate::errors::{VrdError, VrdResult};
use crate::index::{DualIndex, InsertOutcome};
use crate::model_adapter::create_reranker;
use crate::reasoner::{FallbackReasoner, QueryReasoner};
use crate::report::{NormalizedReport, ReportId};
use crate::reranker::{Reranker, RerankerBackend};
use crate::session::{DecisionSession, SessionContext, Verdict};
use crate::types::{BatchIngestSummary, BatchItemError, EngineStats, IngestionResult};

// ============================================================================
// Normalizer
// ============================================================================

/// Turns free-form report text into a [`NormalizedReport`].
///
/// Implementations live outside this crate (usually a language model).
/// They should fail with `MalformedInput` when the text is not a report.
#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(&self, raw: &str) -> VrdResult<NormalizedReport>;
}

// ============================================================================
// Engine
// ============================================================================

pub struct Engine {
    config: EngineConfig,
    index: DualIndex,
    embedder: Arc<dyn Embedder>,
    reranker: Reranker,
    reasoner: Arc<dyn QueryReasoner>,
    normalizer: Option<Arc<dyn Normalizer>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("index", &self.index)
            .field("embedder", &self.embedder.model_id())
            .field("reranker", &self.reranker)
            .field("reasoner", &self.reasoner.name())
            .field("normalizer", &self.normalizer.is_some())
            .finish()
    }
}

impl Engine {
    pub fn builder(embedder: Arc<dyn Embedder>) -> EngineBuilder {
        EngineBuilder {
            embedder,
            config: EngineConfig::default(),
            index: None,
            reranker: None,
            reasoner: None,
            normalizer: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &DualIndex {
        &self.index
    }

    pub fn reranker(&self) -> &Reranker {
        &self.reranker
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    /// Index a report. Idempotent for identical content.
    ///
    /// # Errors
    ///
    /// - `MalformedInput` if the report fails validation
    /// - `IndexWriteError` if its id is already indexed with other content,
    ///   or is not the hash of its content
    /// - `EmbeddingFailed` if the embedder fails
    pub fn ingest(&self, report: &NormalizedReport) -> VrdResult<IngestionResult> {
        report.validate()?;

        // identical content keeps its stored embedding
        let outcome = match self.index.get(&report.id)? {
            Some(existing) => self.index.insert(report, &existing.embedding)?,
            None => {
                let embedding = checked_embed(self.embedder.as_ref(), &report.embedding_text())?;
                self.index.insert(report, &embedding)?
            }
        };

        match outcome {
            InsertOutcome::Inserted => {
                info!(report = %report.id.short(), "Report ingested: {}", report.title);
                Ok(IngestionResult::inserted(report.id.clone()))
            }
            InsertOutcome::AlreadyPresent => {
                debug!(report = %report.id.short(), "Report already indexed");
                Ok(IngestionResult::existing(report.id.clone()))
            }
        }
    }

    /// Normalize raw text, then [`ingest`](Self::ingest) it.
    pub async fn ingest_raw(&self, raw: &str) -> VrdResult<IngestionResult> {
        let report = self.normalize(raw).await?;
        self.ingest(&report)
    }

    /// Ingest many reports, skipping those already indexed.
    ///
    /// Failures are collected per item; one bad report does not stop the
    /// batch.
    pub fn ingest_batch(&self, reports: &[NormalizedReport]) -> BatchIngestSummary {
        let mut summary = BatchIngestSummary::default();

        for (index, report) in reports.iter().enumerate() {
            match self.index.contains(&report.id) {
                Ok(true) => {
                    summary.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    summary.record_failure(index, report, e);
                    continue;
                }
            }

            match self.ingest(report) {
                Ok(result) if result.already_exists => summary.skipped += 1,
                Ok(_) => summary.ingested += 1,
                Err(e) => summary.record_failure(index, report, e),
            }
        }

        info!(
            ingested = summary.ingested,
            skipped = summary.skipped,
            failed = summary.failed,
            "Batch ingestion complete"
        );
        summary
    }

    // ------------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------------

    /// Decide whether `report` duplicates an indexed report.
    ///
    /// Never writes to the store; call [`ingest`](Self::ingest) afterwards
    /// to keep the report.
    pub async fn scan(&self, report: &NormalizedReport) -> VrdResult<Verdict> {
        self.scan_with_cancel(report, &CancellationToken::new()).await
    }

    /// [`scan`](Self::scan) that aborts with `Cancelled` when `cancel` fires.
    pub async fn scan_with_cancel(
        &self,
        report: &NormalizedReport,
        cancel: &CancellationToken,
    ) -> VrdResult<Verdict> {
        report.validate()?;
        let mut session = DecisionSession::new(self.session_context(), report);
        debug!(session = %session.id(), report = %report.id.short(), "Scan started");
        session.run(cancel).await
    }

    /// Normalize raw text, then [`scan`](Self::scan) it.
    pub async fn scan_raw(&self, raw: &str) -> VrdResult<Verdict> {
        let report = self.normalize(raw).await?;
        self.scan(&report).await
    }

    /// Scan several reports, at most `batchConcurrency` at a time. Results
    /// are in input order.
    pub async fn scan_batch(&self, reports: &[NormalizedReport]) -> Vec<VrdResult<Verdict>> {
        stream::iter(reports)
            .map(|report| self.scan(report))
            .buffered(self.config.batch_concurrency.max(1))
            .collect()
            .await
    }

    fn session_context(&self) -> SessionContext<'_> {
        SessionContext {
            index: &self.index,
            embedder: self.embedder.as_ref(),
            reranker: &self.reranker,
            reasoner: self.reasoner.as_ref(),
            config: &self.config,
        }
    }

    async fn normalize(&self, raw: &str) -> VrdResult<NormalizedReport> {
        let Some(normalizer) = &self.normalizer else {
            return Err(VrdError::InvalidConfiguration {
                message: "no normalizer configured".to_string(),
                hint: "Pass one with EngineBuilder::normalizer, or build NormalizedReport values directly"
                    .to_string(),
            });
        };
        if raw.trim().is_empty() {
            return Err(VrdError::malformed("report text is empty"));
        }
        let report = normalizer.normalize(raw).await.map_err(|e| match e {
            e @ (VrdError::MalformedInput { .. } | VrdError::NormalizationFailed { .. }) => e,
            other => VrdError::NormalizationFailed {
                reason: other.to_string(),
            },
        })?;
        // normalizers are not trusted to hash
        Ok(report.with_recomputed_id())
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn get(&self, id: &ReportId) -> VrdResult<Option<NormalizedReport>> {
        Ok(self.index.get(id)?.map(|stored| stored.report.clone()))
    }

    pub fn stats(&self) -> VrdResult<EngineStats> {
        let index_health = self.index.health()?;
        Ok(EngineStats {
            report_count: index_health.store_count,
            index_health,
        })
    }

    /// Persist derived index state. No-op for in-memory engines.
    pub fn checkpoint(&self) -> VrdResult<()> {
        self.index.checkpoint()
    }
}

impl BatchIngestSummary {
    fn record_failure(&mut self, index: usize, report: &NormalizedReport, error: VrdError) {
        warn!(report = %report.id.short(), "Batch item {} failed: {}", index, error);
        self.failed += 1;
        self.errors.push(BatchItemError {
            index,
            report_id: report.id.clone(),
            error: error.to_string(),
        });
    }
}

// ============================================================================
// EngineBuilder
// ============================================================================

pub struct EngineBuilder {
    embedder: Arc<dyn Embedder>,
    config: EngineConfig,
    index: Option<DualIndex>,
    reranker: Option<Reranker>,
    reasoner: Option<Arc<dyn QueryReasoner>>,
    normalizer: Option<Arc<dyn Normalizer>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a prebuilt index instead of one derived from `storage.dataDir`.
    pub fn index(mut self, index: DualIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Use `backend` with the configured `topK` and normalization.
    pub fn reranker_backend(mut self, backend: Arc<dyn RerankerBackend>) -> Self {
        let settings = &self.config.retrieval.reranker;
        self.reranker = Some(Reranker::new(
            Some(backend),
            settings.top_k,
            settings.normalization,
        ));
        self
    }

    pub fn reasoner(mut self, reasoner: Arc<dyn QueryReasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    pub fn normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Validate the configuration and assemble the engine.
    ///
    /// Without an explicit reranker the configured model is loaded; a
    /// missing model degrades scans instead of failing here.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for invalid settings, `StoreCorrupted` if the
    /// persistent store cannot be replayed.
    pub fn build(self) -> VrdResult<Engine> {
        for warning in self.config.validate()? {
            warn!("Config warning: {}", warning);
        }

        let dimension = self.embedder.dimension();
        if dimension == 0 {
            return Err(VrdError::InvalidConfiguration {
                message: format!("embedder `{}` reports dimension 0", self.embedder.model_id()),
                hint: "Use an embedder that produces non-empty dense vectors".to_string(),
            });
        }

        let bm25 = &self.config.retrieval.hybrid.bm25;
        let index = match self.index {
            Some(index) => index,
            None => match self.config.store_dir() {
                Some(dir) => DualIndex::open(&dir, dimension, bm25)?,
                None => DualIndex::in_memory(dimension, bm25)?,
            },
        };

        let reranker = self
            .reranker
            .unwrap_or_else(|| create_reranker(&self.config.retrieval.reranker));
        let reasoner = self
            .reasoner
            .unwrap_or_else(|| Arc::new(FallbackReasoner) as Arc<dyn QueryReasoner>);

        info!(
            embedder = self.embedder.model_id(),
            reranker = reranker.model_id().unwrap_or("none"),
            reasoner = reasoner.name(),
            reports = index.len()?,
            "Engine ready"
        );

        Ok(Engine {
            config: self.config,
            index,
            embedder: self.embedder,
            reranker,
            reasoner,
            normalizer: self.normalizer,
        })
    }
}
