//! Shared fixtures for vrd-core integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vrd_core::index::{DenseIndex, SparseIndex};
use vrd_core::{
    ArtifactKind, DualIndex, Embedder, EmbeddingPair, Engine, EngineConfig, HashingEmbedder,
    IndexKind, IterationRecord, NormalizedReport, QueryReasoner, ReasonerStep, ReportId,
    ReportStore, Reranker, RerankerBackend, ScoreNormalization, SearchBackend, SearchDimension,
    SearchResult, Severity, TechnicalArtifact, VrdError, VrdResult, VulnerabilityCategory,
};

pub const DIM: usize = 128;

// ============================================================================
// Reports
// ============================================================================

/// Race condition on the OAuth token endpoint.
pub fn oauth_token_race() -> NormalizedReport {
    NormalizedReport::builder(
        "Race condition in OAuth token exchange",
        "Sending many parallel requests with one authorization code returns several valid access tokens",
        VulnerabilityCategory::RaceCondition,
        "/oauth/token",
    )
    .severity(Severity::High)
    .step("Obtain an authorization code through the normal login flow")
    .step("Send 20 parallel POST requests to /oauth/token with the same code")
    .step("Observe several 200 responses, each with a distinct access token")
    .artifact(TechnicalArtifact::new(
        ArtifactKind::Request,
        "POST /oauth/token HTTP/1.1\nContent-Type: application/x-www-form-urlencoded\n\ngrant_type=authorization_code&code=SplxlOBeZQQYbYS6WxSbIA",
    ))
    .technology("Go")
    .technology("PostgreSQL")
    .impact("One authorization code yields multiple valid access tokens")
    .build()
}

/// The same bug as [`oauth_token_race`], reported by someone else.
pub fn oauth_token_race_reworded() -> NormalizedReport {
    NormalizedReport::builder(
        "Authorization code reuse via concurrent token requests",
        "A burst of simultaneous requests against one authorization code issues multiple access tokens",
        VulnerabilityCategory::RaceCondition,
        "/oauth/token",
    )
    .severity(Severity::High)
    .step("Log in and capture the authorization code from the redirect")
    .step("Fire a burst of concurrent requests to /oauth/token using that code")
    .step("Several requests succeed and return different access tokens")
    .artifact(TechnicalArtifact::new(
        ArtifactKind::Request,
        "POST /oauth/token HTTP/1.1\n\ngrant_type=authorization_code&code=4f2a9c",
    ))
    .technology("Go")
    .impact("Multiple valid access tokens from a single code")
    .build()
}

/// Same category as the token race, different endpoint and steps.
pub fn oauth_refresh_race() -> NormalizedReport {
    NormalizedReport::builder(
        "Race condition in refresh token rotation",
        "Concurrent refresh calls with one refresh token both succeed before it is revoked",
        VulnerabilityCategory::RaceCondition,
        "/oauth/refresh",
    )
    .severity(Severity::Medium)
    .step("Wait for the access token to expire")
    .step("Send two refresh calls at the same instant with the same refresh token")
    .technology("Go")
    .impact("A revoked refresh token can mint one extra session")
    .build()
}

/// Unrelated to every OAuth report.
pub fn search_redos() -> NormalizedReport {
    NormalizedReport::builder(
        "Catastrophic backtracking in search filter",
        "A crafted filter string makes the search regex take minutes per request",
        VulnerabilityCategory::Redos,
        "/api/search",
    )
    .severity(Severity::Medium)
    .artifact(TechnicalArtifact::new(
        ArtifactKind::Payload,
        "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa!",
    ))
    .technology("Node.js")
    .build()
}

// ============================================================================
// Rerankers
// ============================================================================

/// Scores a passage by how much of its `"<category> in <component>"`
/// section the query mentions.
///
/// Both parts score 0.95, the component alone 0.75, the category alone
/// 0.55, neither 0.05.
pub struct QueryMatchReranker;

impl QueryMatchReranker {
    fn score(query: &str, passage: &str) -> f32 {
        let section = passage.split(" | ").nth(1).unwrap_or("");
        let (category, component) = section.split_once(" in ").unwrap_or((section, ""));
        let has_category = !category.is_empty() && query.contains(category);
        let has_component = !component.is_empty() && query.contains(component);
        match (has_category, has_component) {
            (true, true) => 0.95,
            (false, true) => 0.75,
            (true, false) => 0.55,
            (false, false) => 0.05,
        }
    }
}

impl RerankerBackend for QueryMatchReranker {
    fn model_id(&self) -> &str {
        "test/query-match"
    }

    fn score_batch(&self, query: &str, passages: &[String]) -> VrdResult<Vec<f32>> {
        Ok(passages.iter().map(|p| Self::score(query, p)).collect())
    }
}

/// Remembers every query it is asked to score against.
pub struct RecordingReranker {
    pub score: f32,
    pub queries: Arc<Mutex<Vec<String>>>,
}

impl RecordingReranker {
    pub fn new(score: f32) -> Self {
        Self {
            score,
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl RerankerBackend for RecordingReranker {
    fn model_id(&self) -> &str {
        "test/recording"
    }

    fn score_batch(&self, query: &str, passages: &[String]) -> VrdResult<Vec<f32>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(vec![self.score; passages.len()])
    }
}

/// Scores every passage of the n-th call with the n-th value; the last
/// value repeats once the list runs out.
pub struct SequenceReranker {
    scores: Vec<f32>,
    calls: AtomicUsize,
}

impl SequenceReranker {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            calls: AtomicUsize::new(0),
        }
    }
}

impl RerankerBackend for SequenceReranker {
    fn model_id(&self) -> &str {
        "test/sequence"
    }

    fn score_batch(&self, _query: &str, passages: &[String]) -> VrdResult<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let score = self.scores[call.min(self.scores.len() - 1)];
        Ok(vec![score; passages.len()])
    }
}

/// Scores every passage with the same value.
pub struct ConstantReranker(pub f32);

impl RerankerBackend for ConstantReranker {
    fn model_id(&self) -> &str {
        "test/constant"
    }

    fn score_batch(&self, _query: &str, passages: &[String]) -> VrdResult<Vec<f32>> {
        Ok(vec![self.0; passages.len()])
    }
}

pub struct FailingReranker;

impl RerankerBackend for FailingReranker {
    fn model_id(&self) -> &str {
        "test/failing"
    }

    fn score_batch(&self, _query: &str, _passages: &[String]) -> VrdResult<Vec<f32>> {
        Err(VrdError::RerankerInferenceFailed {
            model_id: "test/failing".to_string(),
            reason: "device lost".to_string(),
        })
    }
}

pub fn reranker(backend: impl RerankerBackend + 'static) -> Reranker {
    let backend: Arc<dyn RerankerBackend> = Arc::new(backend);
    Reranker::new(Some(backend), 10, ScoreNormalization::Clamp)
}

// ============================================================================
// Reasoners
// ============================================================================

/// Never answers.
pub struct StallingReasoner;

#[async_trait]
impl QueryReasoner for StallingReasoner {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn next_query(
        &self,
        _report: &NormalizedReport,
        _history: &[IterationRecord],
        _next: SearchDimension,
    ) -> VrdResult<ReasonerStep> {
        std::future::pending::<()>().await;
        Ok(ReasonerStep::Stop)
    }
}

/// Answers after a delay.
pub struct SlowReasoner(pub Duration);

#[async_trait]
impl QueryReasoner for SlowReasoner {
    fn name(&self) -> &str {
        "slow"
    }

    async fn next_query(
        &self,
        report: &NormalizedReport,
        _history: &[IterationRecord],
        next: SearchDimension,
    ) -> VrdResult<ReasonerStep> {
        tokio::time::sleep(self.0).await;
        Ok(ReasonerStep::Query(next.fallback_query(report)))
    }
}

// ============================================================================
// Backends
// ============================================================================

/// Accepts writes, fails every search.
pub struct BrokenSearch(pub IndexKind);

impl SearchBackend for BrokenSearch {
    fn kind(&self) -> IndexKind {
        self.0
    }

    fn index(&self, _id: &ReportId, _embedding: &EmbeddingPair) -> VrdResult<()> {
        Ok(())
    }

    fn search(&self, _query: &EmbeddingPair, _limit: usize) -> VrdResult<Vec<SearchResult>> {
        Err(VrdError::search_failed(self.0, "connection reset"))
    }

    fn contains(&self, _id: &ReportId) -> VrdResult<bool> {
        Ok(true)
    }

    fn len(&self) -> VrdResult<usize> {
        Ok(0)
    }
}

// ============================================================================
// Engines
// ============================================================================

pub fn embedder() -> Arc<HashingEmbedder> {
    Arc::new(HashingEmbedder::new(DIM))
}

pub fn engine_with(reranker: Reranker) -> Engine {
    Engine::builder(embedder())
        .reranker(reranker)
        .build()
        .unwrap()
}

pub fn engine_with_config(config: EngineConfig, reranker: Reranker) -> Engine {
    Engine::builder(embedder())
        .config(config)
        .reranker(reranker)
        .build()
        .unwrap()
}

pub fn persistent_config(dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.storage.data_dir = Some(dir.to_path_buf());
    config
}

/// Index whose dense side, sparse side, or both fail every search.
pub fn index_with_broken(dense_broken: bool, sparse_broken: bool) -> DualIndex {
    let config = EngineConfig::default();
    let dense: Arc<dyn SearchBackend> = if dense_broken {
        Arc::new(BrokenSearch(IndexKind::Dense))
    } else {
        Arc::new(DenseIndex::new(DIM).unwrap())
    };
    let sparse: Arc<dyn SearchBackend> = if sparse_broken {
        Arc::new(BrokenSearch(IndexKind::Sparse))
    } else {
        Arc::new(SparseIndex::new(&config.retrieval.hybrid.bm25))
    };
    DualIndex::with_backends(ReportStore::in_memory(), dense, sparse)
}

pub fn embed(report: &NormalizedReport) -> EmbeddingPair {
    HashingEmbedder::new(DIM)
        .embed(&report.embedding_text())
        .unwrap()
}
