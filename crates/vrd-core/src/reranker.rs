//! Cross-encoder reranking of fused candidates.
//!
//! Fusion orders candidates by where they ranked; the reranker reads the
//! query and each candidate's passage together and assigns a relevance score
//! in [0, 1]. Those scores feed the classifier directly, so their calibration
//! matters more than their order.
//!
//! # Degraded mode
//!
//! When no backend is configured, or the backend fails, the fused order is
//! kept and each candidate is scored with its dense cosine similarity from
//! the same iteration, clamped to [0, 1] (0 for sparse-only candidates). The
//! outcome is flagged `degraded` and the flag propagates to the verdict.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{VrdError, VrdResult};
use crate::fusion::FusedCandidate;
use crate::index::IndexKind;
use crate::report::ReportId;

// ============================================================================
// ScoreNormalization
// ============================================================================

/// How raw backend scores are mapped onto [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreNormalization {
    /// Logistic function, for cross-encoder logits.
    #[default]
    Sigmoid,
    /// Clamp, for backends that already emit probabilities.
    Clamp,
}

impl ScoreNormalization {
    pub fn apply(&self, raw: f32) -> f32 {
        match self {
            Self::Sigmoid => 1.0 / (1.0 + (-raw).exp()),
            Self::Clamp => raw.clamp(0.0, 1.0),
        }
    }
}

impl fmt::Display for ScoreNormalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sigmoid => write!(f, "sigmoid"),
            Self::Clamp => write!(f, "clamp"),
        }
    }
}

impl FromStr for ScoreNormalization {
    type Err = VrdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sigmoid" | "logistic" => Ok(Self::Sigmoid),
            "clamp" | "none" => Ok(Self::Clamp),
            other => Err(VrdError::InvalidConfiguration {
                message: format!("unknown reranker normalization '{}'", other),
                hint: "Use 'sigmoid' for cross-encoder logits or 'clamp' for probabilities"
                    .to_string(),
            }),
        }
    }
}

// ============================================================================
// RerankerBackend Trait
// ============================================================================

/// Trait for relevance models scoring (query, passage) pairs.
pub trait RerankerBackend: Send + Sync {
    fn model_id(&self) -> &str;

    /// One raw score per passage, in input order.
    fn score_batch(&self, query: &str, passages: &[String]) -> VrdResult<Vec<f32>>;

    /// Warm up the backend by running a dummy inference.
    fn warm_up(&self) -> VrdResult<()> {
        let _ = self.score_batch("warmup query", &["warmup passage".to_string()])?;
        Ok(())
    }
}

// ============================================================================
// Types
// ============================================================================

/// A fused candidate with the passage the model will read.
#[derive(Debug, Clone)]
pub struct RerankInput {
    pub candidate: FusedCandidate,
    pub passage: String,
}

/// A candidate after reranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankedCandidate {
    pub report_id: ReportId,
    /// Relevance in [0, 1].
    pub score: f32,
    /// 1-based position after reranking.
    pub rank: usize,
    pub fused_rank: usize,
    /// Whether the relevance model scored this candidate.
    pub reranked: bool,
}

/// Result of one rerank call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankOutcome {
    pub candidates: Vec<RerankedCandidate>,
    pub degraded: bool,
    /// Why the model was not used, when degraded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl RerankOutcome {
    /// Highest-scoring candidate, ties broken by id.
    ///
    /// Candidates past the model's `top_k` carry only fallback scores and are
    /// ignored unless the whole outcome is degraded.
    pub fn best(&self) -> Option<&RerankedCandidate> {
        self.candidates
            .iter()
            .filter(|c| self.degraded || c.reranked)
            .max_by(|a, b| {
                a.score
                    .total_cmp(&b.score)
                    .then_with(|| b.report_id.cmp(&a.report_id))
            })
    }
}

/// Dense cosine of the candidate clamped to [0, 1], or 0 if it was not
/// found by dense search.
pub fn fallback_score(candidate: &FusedCandidate) -> f32 {
    candidate
        .score_in(IndexKind::Dense)
        .map(|s| if s.is_finite() { s.clamp(0.0, 1.0) } else { 0.0 })
        .unwrap_or(0.0)
}

// ============================================================================
// Reranker
// ============================================================================

/// Applies a [`RerankerBackend`] to the top of a fused list.
#[derive(Clone)]
pub struct Reranker {
    backend: Option<Arc<dyn RerankerBackend>>,
    top_k: usize,
    normalization: ScoreNormalization,
}

impl fmt::Debug for Reranker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reranker")
            .field("model_id", &self.backend.as_ref().map(|b| b.model_id()))
            .field("top_k", &self.top_k)
            .field("normalization", &self.normalization)
            .finish()
    }
}

impl Reranker {
    pub fn new(
        backend: Option<Arc<dyn RerankerBackend>>,
        top_k: usize,
        normalization: ScoreNormalization,
    ) -> Self {
        // best() only considers scored candidates
        Self {
            backend,
            top_k: top_k.max(1),
            normalization,
        }
    }

    /// A reranker that always degrades.
    pub fn disabled() -> Self {
        Self::new(None, 1, ScoreNormalization::default())
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn model_id(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.model_id())
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Score the first `top_k` inputs and append the rest in fused order.
    ///
    /// `inputs` must be in fused order. Never fails: backend problems produce
    /// a degraded outcome instead.
    pub fn rerank(&self, query: &str, inputs: Vec<RerankInput>) -> RerankOutcome {
        if inputs.is_empty() {
            return RerankOutcome::default();
        }

        let Some(backend) = &self.backend else {
            return Self::degraded(inputs, "no reranker backend configured".to_string());
        };

        let split = self.top_k.min(inputs.len());
        let passages: Vec<String> = inputs[..split].iter().map(|i| i.passage.clone()).collect();

        let raw = match backend.score_batch(query, &passages) {
            Ok(raw) if raw.len() != passages.len() => {
                let reason = format!(
                    "reranker `{}` returned {} scores for {} passages",
                    backend.model_id(),
                    raw.len(),
                    passages.len()
                );
                warn!("{}", reason);
                return Self::degraded(inputs, reason);
            }
            Ok(raw) if raw.iter().any(|s| !s.is_finite()) => {
                let reason = format!("reranker `{}` returned a non-finite score", backend.model_id());
                warn!("{}", reason);
                return Self::degraded(inputs, reason);
            }
            Ok(raw) => raw,
            Err(e) => {
                warn!("Reranker failed, keeping fused order: {}", e);
                return Self::degraded(inputs, e.to_string());
            }
        };

        let mut scored: Vec<RerankedCandidate> = inputs[..split]
            .iter()
            .zip(raw)
            .map(|(input, raw)| RerankedCandidate {
                report_id: input.candidate.report_id.clone(),
                score: self.normalization.apply(raw),
                rank: 0,
                fused_rank: input.candidate.fused_rank,
                reranked: true,
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.fused_rank.cmp(&b.fused_rank))
        });

        scored.extend(inputs[split..].iter().map(|input| RerankedCandidate {
            report_id: input.candidate.report_id.clone(),
            score: fallback_score(&input.candidate),
            rank: 0,
            fused_rank: input.candidate.fused_rank,
            reranked: false,
        }));
        for (i, c) in scored.iter_mut().enumerate() {
            c.rank = i + 1;
        }

        debug!(
            "Reranked {} of {} candidates with {}",
            split,
            scored.len(),
            backend.model_id()
        );
        RerankOutcome {
            candidates: scored,
            degraded: false,
            failure: None,
        }
    }

    fn degraded(inputs: Vec<RerankInput>, reason: String) -> RerankOutcome {
        let candidates = inputs
            .into_iter()
            .enumerate()
            .map(|(i, input)| RerankedCandidate {
                score: fallback_score(&input.candidate),
                report_id: input.candidate.report_id,
                rank: i + 1,
                fused_rank: input.candidate.fused_rank,
                reranked: false,
            })
            .collect();
        RerankOutcome {
            candidates,
            degraded: true,
            failure: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::SourceRank;

    fn candidate(id: &str, fused_rank: usize, dense: Option<f32>) -> RerankInput {
        let mut provenance = vec![SourceRank {
            source: IndexKind::Sparse,
            rank: fused_rank,
            score: 3.0,
        }];
        if let Some(score) = dense {
            provenance.insert(
                0,
                SourceRank {
                    source: IndexKind::Dense,
                    rank: fused_rank,
                    score,
                },
            );
        }
        RerankInput {
            candidate: FusedCandidate {
                report_id: ReportId::from(id),
                fused_rank,
                fused_score: 1.0 / (60.0 + fused_rank as f32),
                provenance,
            },
            passage: format!("passage for {}", id),
        }
    }

    /// Scores from a fixed table keyed by passage.
    struct TableBackend(Vec<(&'static str, f32)>);

    impl RerankerBackend for TableBackend {
        fn model_id(&self) -> &str {
            "table"
        }

        fn score_batch(&self, _query: &str, passages: &[String]) -> VrdResult<Vec<f32>> {
            Ok(passages
                .iter()
                .map(|p| {
                    self.0
                        .iter()
                        .find(|(id, _)| p.ends_with(id))
                        .map(|(_, s)| *s)
                        .unwrap_or(0.0)
                })
                .collect())
        }
    }

    struct BrokenBackend;

    impl RerankerBackend for BrokenBackend {
        fn model_id(&self) -> &str {
            "broken"
        }

        fn score_batch(&self, _query: &str, _passages: &[String]) -> VrdResult<Vec<f32>> {
            Err(VrdError::RerankerInferenceFailed {
                model_id: "broken".into(),
                reason: "tensor shape mismatch".into(),
            })
        }
    }

    fn reranker(backend: impl RerankerBackend + 'static, top_k: usize) -> Reranker {
        Reranker::new(Some(Arc::new(backend)), top_k, ScoreNormalization::Clamp)
    }

    // ========================================================================
    // Normalization
    // ========================================================================

    #[test]
    fn test_sigmoid_normalization() {
        let n = ScoreNormalization::Sigmoid;
        assert!((n.apply(0.0) - 0.5).abs() < 1e-6);
        assert!(n.apply(8.0) > 0.99);
        assert!(n.apply(-8.0) < 0.01);
    }

    #[test]
    fn test_clamp_normalization() {
        let n = ScoreNormalization::Clamp;
        assert_eq!(n.apply(1.7), 1.0);
        assert_eq!(n.apply(-0.2), 0.0);
        assert_eq!(n.apply(0.42), 0.42);
        assert_eq!("CLAMP".parse::<ScoreNormalization>().unwrap(), n);
        assert!("softmax".parse::<ScoreNormalization>().is_err());
    }

    // ========================================================================
    // Rerank
    // ========================================================================

    #[test]
    fn test_reorders_top_k_and_appends_rest() {
        let r = reranker(TableBackend(vec![("a", 0.2), ("b", 0.9), ("c", 0.5)]), 3);
        let inputs = vec![
            candidate("a", 1, Some(0.8)),
            candidate("b", 2, Some(0.7)),
            candidate("c", 3, None),
            candidate("d", 4, Some(0.6)),
        ];

        let outcome = r.rerank("query", inputs);
        assert!(!outcome.degraded);
        let ids: Vec<_> = outcome.candidates.iter().map(|c| c.report_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a", "d"]);
        assert_eq!(outcome.candidates[0].score, 0.9);
        assert!(outcome.candidates[..3].iter().all(|c| c.reranked));

        let tail = &outcome.candidates[3];
        assert!(!tail.reranked);
        assert_eq!(tail.rank, 4);
        assert_eq!(tail.fused_rank, 4);
        assert_eq!(tail.score, 0.6);
    }

    #[test]
    fn test_best_ignores_unscored_tail() {
        let r = reranker(TableBackend(vec![("a", 0.3)]), 1);
        let outcome = r.rerank("query", vec![candidate("a", 1, None), candidate("b", 2, Some(0.95))]);
        let best = outcome.best().unwrap();
        assert_eq!(best.report_id.as_str(), "a");
        assert_eq!(best.score, 0.3);
    }

    #[test]
    fn test_zero_top_k_still_scores_leader() {
        let r = reranker(TableBackend(vec![("a", 0.4), ("b", 0.8)]), 0);
        assert_eq!(r.top_k(), 1);

        let outcome = r.rerank("query", vec![candidate("a", 1, None), candidate("b", 2, None)]);
        assert!(!outcome.degraded);
        let best = outcome.best().unwrap();
        assert_eq!(best.report_id.as_str(), "a");
        assert!(best.reranked);
        assert_eq!(best.score, 0.4);
    }

    #[test]
    fn test_backend_error_degrades_to_fused_order() {
        let r = reranker(BrokenBackend, 10);
        let outcome = r.rerank(
            "query",
            vec![
                candidate("a", 1, Some(0.4)),
                candidate("b", 2, Some(1.3)),
                candidate("c", 3, None),
            ],
        );

        assert!(outcome.degraded);
        assert!(outcome.failure.as_deref().unwrap().contains("tensor shape"));
        let ids: Vec<_> = outcome.candidates.iter().map(|c| c.report_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(outcome.candidates[1].score, 1.0);
        assert_eq!(outcome.candidates[2].score, 0.0);
        assert_eq!(outcome.best().unwrap().report_id.as_str(), "b");
    }

    #[test]
    fn test_missing_backend_degrades() {
        let outcome = Reranker::disabled().rerank("query", vec![candidate("a", 1, Some(-0.2))]);
        assert!(outcome.degraded);
        assert_eq!(outcome.candidates[0].score, 0.0);
    }

    #[test]
    fn test_wrong_score_count_degrades() {
        struct Short;
        impl RerankerBackend for Short {
            fn model_id(&self) -> &str {
                "short"
            }
            fn score_batch(&self, _q: &str, _p: &[String]) -> VrdResult<Vec<f32>> {
                Ok(vec![0.5])
            }
        }

        let outcome = reranker(Short, 5).rerank(
            "query",
            vec![candidate("a", 1, Some(0.1)), candidate("b", 2, Some(0.2))],
        );
        assert!(outcome.degraded);
    }

    #[test]
    fn test_empty_input() {
        let outcome = reranker(BrokenBackend, 5).rerank("query", Vec::new());
        assert!(outcome.candidates.is_empty());
        assert!(!outcome.degraded);
        assert!(outcome.best().is_none());
    }

    #[test]
    fn test_best_tie_breaks_by_id() {
        let r = reranker(TableBackend(vec![("x", 0.7), ("m", 0.7)]), 5);
        let outcome = r.rerank("query", vec![candidate("x", 1, None), candidate("m", 2, None)]);
        assert_eq!(outcome.best().unwrap().report_id.as_str(), "m");
    }
}
