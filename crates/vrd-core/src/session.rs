//! Decision sessions: the bounded search loop behind `scan`.
//!
//! ```text
//!  Init ──► Searching ──► Observing ──► Deciding ──► Done
//!               ▲             │
//!               └─────────────┘  (not decisive, budget left)
//! ```
//!
//! - **Searching** embeds the planned query, searches both indexes, fuses
//!   the ranked lists and reranks the fused candidates.
//! - **Observing** tracks the best candidate seen in any iteration, stops
//!   when that score is decisive, when the iteration cap is reached or when
//!   no dimension is left, and otherwise asks the reasoner for the next
//!   query.
//! - **Deciding** classifies the best candidate.
//!
//! Each iteration reranks its candidates against that iteration's query,
//! so a reformulation (an exact payload, a component path) can raise a
//! candidate's relevance as well as change which candidates are found.
//!
//! A session only reads from the index; it never writes the store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::classifier::{Confidence, VerdictStatus};
use crate::config::EngineConfig;
use crate::embedding::{checked_embed, Embedder};
use crate::errors::{VrdError, VrdResult};
use crate::fusion::{fuse, FusedCandidate};
use crate::index::{DualIndex, SearchResult};
use crate::reasoner::{QueryReasoner, ReasonerStep, SearchDimension};
use crate::report::{NormalizedReport, ReportId};
use crate::reranker::{RerankInput, RerankedCandidate, Reranker};

// ============================================================================
// Trace types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Init,
    Searching,
    Observing,
    Deciding,
    Done,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Searching => "searching",
            Self::Observing => "observing",
            Self::Deciding => "deciding",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Where an iteration's query came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuerySource {
    /// Derived directly from the report (first iteration).
    Report,
    Reasoner,
    /// Deterministic fallback after a reasoner timeout, error or rejected
    /// query.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Neither index could be searched.
    Retrieval,
    /// The reasoner did not answer in time.
    Reasoner,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// One search iteration, as recorded in the verdict's reasoning trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    /// 0-based.
    pub iteration: usize,
    pub dimension: SearchDimension,
    pub query: String,
    pub query_source: QuerySource,
    pub candidates: Vec<RerankedCandidate>,
    /// Best candidate of this iteration.
    pub best: Option<RerankedCandidate>,
    /// The relevance model was not used, or one index failed.
    pub degraded: bool,
    /// Set when the iteration counts toward the consecutive-failure limit.
    pub failure: Option<IterationFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl IterationRecord {
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    fn retrieval_failed(&self) -> bool {
        matches!(
            self.failure,
            Some(IterationFailure {
                kind: FailureKind::Retrieval,
                ..
            })
        )
    }
}

/// Final outcome of a decision session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub session_id: Uuid,
    /// The scanned report.
    pub report_id: ReportId,
    pub status: VerdictStatus,
    /// Best relevance score in [0, 1]; 0 when nothing was retrieved.
    pub score: f32,
    pub confidence: Confidence,
    /// Set for `duplicate` and `similar` only.
    pub matched_report_id: Option<ReportId>,
    pub trace: Vec<IterationRecord>,
    pub iterations: usize,
    /// Some iteration ran without the relevance model or with one index down.
    pub degraded: bool,
    pub decided_at: DateTime<Utc>,
}

impl Verdict {
    pub fn is_duplicate(&self) -> bool {
        self.status == VerdictStatus::Duplicate
    }
}

// ============================================================================
// DecisionSession
// ============================================================================

/// Shared collaborators a session reads from.
#[derive(Clone, Copy)]
pub struct SessionContext<'a> {
    pub index: &'a DualIndex,
    pub embedder: &'a dyn Embedder,
    pub reranker: &'a Reranker,
    pub reasoner: &'a dyn QueryReasoner,
    pub config: &'a EngineConfig,
}

#[derive(Debug)]
struct PlannedQuery {
    dimension: SearchDimension,
    query: String,
    source: QuerySource,
    /// The reasoner call timed out; the iteration counts as failed.
    reasoner_timeout: bool,
    note: Option<String>,
}

#[derive(Debug)]
struct Retrieved {
    fused: Vec<FusedCandidate>,
    /// One index failed; the fused list comes from the other alone.
    partial: bool,
}

/// One scan of one report. Owns all of its state.
pub struct DecisionSession<'a> {
    id: Uuid,
    ctx: SessionContext<'a>,
    report: &'a NormalizedReport,
    state: SessionState,
    explored: Vec<SearchDimension>,
    pending: Option<PlannedQuery>,
    trace: Vec<IterationRecord>,
    best: Option<RerankedCandidate>,
    consecutive_failures: usize,
}

impl fmt::Debug for DecisionSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionSession")
            .field("id", &self.id)
            .field("report", &self.report.id)
            .field("state", &self.state)
            .field("iterations", &self.trace.len())
            .finish()
    }
}

impl<'a> DecisionSession<'a> {
    pub fn new(ctx: SessionContext<'a>, report: &'a NormalizedReport) -> Self {
        Self {
            id: Uuid::new_v4(),
            ctx,
            report,
            state: SessionState::Init,
            explored: Vec::new(),
            pending: None,
            trace: Vec::new(),
            best: None,
            consecutive_failures: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn trace(&self) -> &[IterationRecord] {
        &self.trace
    }

    /// Drive the state machine to a verdict.
    ///
    /// `cancel` is checked before every state, and the reasoner call is
    /// abandoned as soon as it fires.
    ///
    /// # Errors
    ///
    /// - `Cancelled` when `cancel` fires
    /// - `RetrievalUnavailable` / `ReasonerTimeout` after too many
    ///   consecutive failed iterations, or when no retrieval ever succeeded
    /// - permanent errors (invalid configuration, store) immediately
    pub async fn run(&mut self, cancel: &CancellationToken) -> VrdResult<Verdict> {
        loop {
            cancel.check()?;
            let next = match self.state {
                SessionState::Init => self.init(),
                SessionState::Searching => self.search()?,
                SessionState::Observing => self.observe(cancel).await?,
                SessionState::Deciding => {
                    let verdict = self.decide()?;
                    self.state = SessionState::Done;
                    return Ok(verdict);
                }
                SessionState::Done => {
                    return Err(VrdError::Other(anyhow::anyhow!(
                        "decision session {} already finished",
                        self.id
                    )))
                }
            };
            debug!(session = %self.id, "{} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn init(&mut self) -> SessionState {
        match self.next_dimension() {
            Some(dimension) => {
                self.explored.push(dimension);
                self.pending = Some(PlannedQuery {
                    dimension,
                    query: dimension.fallback_query(self.report),
                    source: QuerySource::Report,
                    reasoner_timeout: false,
                    note: None,
                });
                SessionState::Searching
            }
            None => SessionState::Deciding,
        }
    }

    fn next_dimension(&self) -> Option<SearchDimension> {
        SearchDimension::EXPLORATION_ORDER
            .into_iter()
            .find(|d| !self.explored.contains(d) && d.has_material(self.report))
    }

    // ------------------------------------------------------------------------
    // Searching
    // ------------------------------------------------------------------------

    fn search(&mut self) -> VrdResult<SessionState> {
        let Some(planned) = self.pending.take() else {
            return Ok(SessionState::Deciding);
        };

        let mut record = IterationRecord {
            iteration: self.trace.len(),
            dimension: planned.dimension,
            query: planned.query,
            query_source: planned.source,
            candidates: Vec::new(),
            best: None,
            degraded: false,
            failure: None,
            notes: planned.note.into_iter().collect(),
            timestamp: Utc::now(),
        };
        if planned.reasoner_timeout {
            record.failure = Some(IterationFailure {
                kind: FailureKind::Reasoner,
                message: format!(
                    "reasoner timed out after {}ms",
                    self.ctx.config.decision.reasoner_timeout_ms
                ),
            });
        }

        match self.retrieve(&record.query, &mut record.notes) {
            Ok(Retrieved { fused, partial }) => {
                let inputs = self.rerank_inputs(fused)?;
                let outcome = self.ctx.reranker.rerank(&record.query, inputs);
                if let Some(reason) = &outcome.failure {
                    record.notes.push(format!("reranker degraded: {}", reason));
                }
                record.degraded =
                    partial || outcome.degraded || !self.ctx.reranker.is_available();
                record.best = outcome.best().cloned();
                record.candidates = outcome.candidates;
            }
            Err(e) if e.is_permanent() => return Err(e),
            Err(e) => {
                warn!(session = %self.id, "Iteration {} retrieval failed: {}", record.iteration, e);
                record.degraded = true;
                record.failure = Some(IterationFailure {
                    kind: FailureKind::Retrieval,
                    message: e.to_string(),
                });
            }
        }
        if record.is_failed() {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }
        if let Some(top) = &record.best {
            let better = match &self.best {
                None => true,
                Some(best) => {
                    top.score > best.score
                        || (top.score == best.score && top.report_id < best.report_id)
                }
            };
            if better {
                self.best = Some(top.clone());
            }
        }

        debug!(
            session = %self.id,
            iteration = record.iteration,
            dimension = %record.dimension,
            candidates = record.candidates.len(),
            best = ?record.best.as_ref().map(|b| b.score),
            degraded = record.degraded,
            "Iteration complete"
        );
        self.trace.push(record);
        Ok(SessionState::Observing)
    }

    /// Embed, search both indexes and fuse. Fails only when neither index
    /// produced a list; one failing side is reported as `partial`.
    fn retrieve(&self, query: &str, notes: &mut Vec<String>) -> VrdResult<Retrieved> {
        let pair = checked_embed(self.ctx.embedder, query)?;
        let limit = self.ctx.config.retrieval.candidate_limit;
        let hits = self.ctx.index.search_hybrid(&pair, limit);

        if hits.both_failed() {
            let reason = [&hits.dense, &hits.sparse]
                .into_iter()
                .filter_map(|r| r.as_ref().err().map(|e| e.to_string()))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(VrdError::RetrievalUnavailable { reason });
        }

        let partial = hits.any_failed();
        let mut lists: Vec<Vec<SearchResult>> = Vec::with_capacity(2);
        for result in [hits.dense, hits.sparse] {
            match result {
                Ok(list) => lists.push(
                    list.into_iter()
                        .filter(|hit| hit.report_id != self.report.id)
                        .collect(),
                ),
                Err(e) => {
                    warn!(session = %self.id, "Continuing with one index: {}", e);
                    notes.push(format!("search failed: {}", e));
                }
            }
        }

        let slices: Vec<&[SearchResult]> = lists.iter().map(Vec::as_slice).collect();
        let fused = fuse(&slices, self.ctx.config.retrieval.hybrid.rrf_k)?;
        Ok(Retrieved { fused, partial })
    }

    fn rerank_inputs(&self, fused: Vec<FusedCandidate>) -> VrdResult<Vec<RerankInput>> {
        let mut inputs = Vec::with_capacity(fused.len());
        for candidate in fused {
            match self.ctx.index.get(&candidate.report_id)? {
                Some(stored) => inputs.push(RerankInput {
                    passage: stored.report.passage_text(),
                    candidate,
                }),
                None => warn!(
                    session = %self.id,
                    "Search returned unknown report {}, skipping",
                    candidate.report_id
                ),
            }
        }
        Ok(inputs)
    }

    // ------------------------------------------------------------------------
    // Observing
    // ------------------------------------------------------------------------

    async fn observe(&mut self, cancel: &CancellationToken) -> VrdResult<SessionState> {
        let decision = &self.ctx.config.decision;
        // a decisive match found by a failed iteration still stands
        if let Some(best) = &self.best {
            if self.ctx.config.classifier.is_decisive(best.score) {
                debug!(session = %self.id, "Best score {:.3} is decisive", best.score);
                return Ok(SessionState::Deciding);
            }
        }
        if self.consecutive_failures >= decision.max_consecutive_failures {
            return Err(self.abort_error());
        }
        if self.trace.len() >= decision.max_iterations {
            debug!(session = %self.id, "Iteration cap {} reached", decision.max_iterations);
            return Ok(SessionState::Deciding);
        }
        let Some(next) = self.next_dimension() else {
            debug!(session = %self.id, "All dimensions explored");
            return Ok(SessionState::Deciding);
        };

        self.explored.push(next);
        match self.plan(next, cancel).await? {
            Some(planned) => {
                self.pending = Some(planned);
                Ok(SessionState::Searching)
            }
            None => {
                debug!(session = %self.id, "Reasoner requested stop");
                Ok(SessionState::Deciding)
            }
        }
    }

    /// Ask the reasoner for the next query. `None` means stop.
    async fn plan(
        &self,
        dimension: SearchDimension,
        cancel: &CancellationToken,
    ) -> VrdResult<Option<PlannedQuery>> {
        let decision = &self.ctx.config.decision;
        let reasoner = self.ctx.reasoner;
        let fallback = |note: String, reasoner_timeout: bool| PlannedQuery {
            dimension,
            query: dimension.fallback_query(self.report),
            source: QuerySource::Fallback,
            reasoner_timeout,
            note: Some(note),
        };

        let call = reasoner.next_query(self.report, &self.trace, dimension);
        let answer = tokio::select! {
            _ = cancel.cancelled() => return Err(VrdError::Cancelled),
            answer = tokio::time::timeout(decision.reasoner_timeout(), call) => answer,
        };

        let planned = match answer {
            Err(_) => {
                warn!(
                    session = %self.id,
                    "Reasoner '{}' timed out after {}ms, using fallback query",
                    reasoner.name(),
                    decision.reasoner_timeout_ms
                );
                fallback(
                    format!("reasoner timed out after {}ms", decision.reasoner_timeout_ms),
                    true,
                )
            }
            Ok(Err(VrdError::Cancelled)) => return Err(VrdError::Cancelled),
            Ok(Err(e)) => {
                warn!(session = %self.id, "Reasoner '{}' failed: {}", reasoner.name(), e);
                fallback(format!("reasoner unavailable: {}", e), false)
            }
            Ok(Ok(ReasonerStep::Stop)) => return Ok(None),
            Ok(Ok(ReasonerStep::Query(query)))
                if query.trim().chars().count() < decision.min_query_length =>
            {
                debug!(session = %self.id, "Rejected short reasoner query '{}'", query);
                fallback(format!("reasoner query '{}' too short", query.trim()), false)
            }
            Ok(Ok(ReasonerStep::Query(query))) => PlannedQuery {
                dimension,
                query,
                source: QuerySource::Reasoner,
                reasoner_timeout: false,
                note: None,
            },
        };
        Ok(Some(planned))
    }

    fn abort_error(&self) -> VrdError {
        let last = self.trace.iter().rev().find_map(|r| r.failure.as_ref());
        match last {
            Some(IterationFailure {
                kind: FailureKind::Reasoner,
                ..
            }) => VrdError::ReasonerTimeout {
                timeout_ms: self.ctx.config.decision.reasoner_timeout_ms,
            },
            Some(failure) => VrdError::RetrievalUnavailable {
                reason: format!(
                    "{} consecutive failed iterations, last: {}",
                    self.consecutive_failures, failure.message
                ),
            },
            None => VrdError::RetrievalUnavailable {
                reason: format!("{} consecutive failed iterations", self.consecutive_failures),
            },
        }
    }

    // ------------------------------------------------------------------------
    // Deciding
    // ------------------------------------------------------------------------

    fn decide(&self) -> VrdResult<Verdict> {
        if !self.trace.is_empty() && self.trace.iter().all(IterationRecord::retrieval_failed) {
            return Err(self.abort_error());
        }

        let thresholds = &self.ctx.config.classifier;
        let (status, confidence, score, matched) = match &self.best {
            Some(best) if best.score >= thresholds.weakly_related => {
                let (status, confidence) = thresholds.classify(best.score);
                (status, confidence, best.score, Some(best.report_id.clone()))
            }
            Some(best) => (VerdictStatus::New, Confidence::High, best.score, None),
            None => (VerdictStatus::New, Confidence::High, 0.0, None),
        };

        let verdict = Verdict {
            session_id: self.id,
            report_id: self.report.id.clone(),
            status,
            score,
            confidence,
            matched_report_id: matched,
            iterations: self.trace.len(),
            degraded: self.trace.iter().any(|r| r.degraded),
            trace: self.trace.clone(),
            decided_at: Utc::now(),
        };
        info!(
            session = %self.id,
            report = %self.report.id.short(),
            "Verdict: {} ({} confidence, score {:.3}, {} iterations{})",
            verdict.status,
            verdict.confidence,
            verdict.score,
            verdict.iterations,
            if verdict.degraded { ", degraded" } else { "" }
        );
        Ok(verdict)
    }
}
