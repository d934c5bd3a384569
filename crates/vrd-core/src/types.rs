//! Result types returned by [`crate::engine::Engine`] operations.

use serde::{Deserialize, Serialize};

use crate::index::IndexHealth;
use crate::report::ReportId;

// ============================================================================
// Ingestion
// ============================================================================

/// Result of ingesting one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionResult {
    pub report_id: ReportId,
    /// Identical content was already indexed; nothing was written.
    pub already_exists: bool,
    pub message: String,
}

impl IngestionResult {
    pub(crate) fn inserted(report_id: ReportId) -> Self {
        let message = format!("Report {} indexed", report_id.short());
        Self {
            report_id,
            already_exists: false,
            message,
        }
    }

    pub(crate) fn existing(report_id: ReportId) -> Self {
        let message = format!("Report {} already indexed", report_id.short());
        Self {
            report_id,
            already_exists: true,
            message,
        }
    }
}

/// A report that could not be ingested in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    /// Position in the input slice.
    pub index: usize,
    pub report_id: ReportId,
    pub error: String,
}

/// Counts from [`crate::engine::Engine::ingest_batch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchIngestSummary {
    pub ingested: usize,
    /// Already indexed, including repeats within the batch.
    pub skipped: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchItemError>,
}

impl BatchIngestSummary {
    pub fn total(&self) -> usize {
        self.ingested + self.skipped + self.failed
    }
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub report_count: usize,
    pub index_health: IndexHealth,
}
