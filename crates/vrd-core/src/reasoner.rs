//! Query reformulation for the decision loop.
//!
//! After the first iteration the loop asks a [`QueryReasoner`] for the next
//! query, naming the dimension it wants explored. A reasoner may be slow,
//! unavailable or unhelpful; in every such case the loop uses the
//! deterministic [`SearchDimension::fallback_query`] instead, so a scan
//! always terminates.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::VrdResult;
use crate::report::NormalizedReport;
use crate::session::IterationRecord;

// ============================================================================
// SearchDimension
// ============================================================================

/// Aspect of a report a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDimension {
    /// Category and summary.
    Semantic,
    /// Affected component string (endpoint, module).
    Component,
    /// Verbatim artifact contents.
    Artifact,
    /// Technology stack.
    Technology,
}

impl SearchDimension {
    /// Order in which dimensions are explored. Each is tried at most once
    /// per session.
    pub const EXPLORATION_ORDER: [SearchDimension; 4] = [
        SearchDimension::Semantic,
        SearchDimension::Component,
        SearchDimension::Artifact,
        SearchDimension::Technology,
    ];

    /// Whether the report has anything to search for in this dimension.
    pub fn has_material(&self, report: &NormalizedReport) -> bool {
        match self {
            Self::Semantic => !report.summary.trim().is_empty(),
            Self::Component => !report.affected_component.trim().is_empty(),
            Self::Artifact => report.artifacts.iter().any(|a| !a.content.is_empty()),
            Self::Technology => !report.technologies.is_empty(),
        }
    }

    /// Deterministic query for this dimension.
    ///
    /// Artifact queries carry the artifact contents verbatim and in full.
    pub fn fallback_query(&self, report: &NormalizedReport) -> String {
        match self {
            Self::Semantic => format!("{}: {}", report.category, report.summary),
            Self::Component => format!("{} {}", report.affected_component, report.category),
            Self::Artifact => report
                .artifacts
                .iter()
                .filter(|a| !a.content.is_empty())
                .map(|a| a.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Technology => format!(
                "{} {}",
                report
                    .technologies
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(" "),
                report.category
            ),
        }
    }
}

impl fmt::Display for SearchDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semantic => write!(f, "semantic"),
            Self::Component => write!(f, "component"),
            Self::Artifact => write!(f, "artifact"),
            Self::Technology => write!(f, "technology"),
        }
    }
}

// ============================================================================
// QueryReasoner
// ============================================================================

/// What a reasoner wants the loop to do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "action", content = "query")]
pub enum ReasonerStep {
    /// Search with this query.
    Query(String),
    /// Enough evidence has been gathered; decide now.
    Stop,
}

/// Chooses query reformulations, typically backed by a remote model.
///
/// Every call runs under the session's reasoner timeout.
#[async_trait]
pub trait QueryReasoner: Send + Sync {
    fn name(&self) -> &str;

    /// Propose the query for `next`, given the iterations run so far.
    async fn next_query(
        &self,
        report: &NormalizedReport,
        history: &[IterationRecord],
        next: SearchDimension,
    ) -> VrdResult<ReasonerStep>;
}

/// Reasoner that always answers with the fallback query.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackReasoner;

#[async_trait]
impl QueryReasoner for FallbackReasoner {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn next_query(
        &self,
        report: &NormalizedReport,
        _history: &[IterationRecord],
        next: SearchDimension,
    ) -> VrdResult<ReasonerStep> {
        Ok(ReasonerStep::Query(next.fallback_query(report)))
    }
}
