//! Report store: the authoritative set of ingested reports.
//!
//! Every report is kept with its [`EmbeddingPair`] so indexes can be rebuilt
//! without re-embedding. A store opened on a directory persists to the
//! `vrd-db` record log (one JSON line per report) and replays it on open.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vrd_db::records::RecordLog;

use crate::embedding::EmbeddingPair;
use crate::errors::{VrdError, VrdResult};
use crate::report::{NormalizedReport, ReportId};

/// A report plus everything derived from it at ingestion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    pub report: NormalizedReport,
    pub embedding: EmbeddingPair,
    pub ingested_at: DateTime<Utc>,
}

impl StoredReport {
    pub fn new(report: NormalizedReport, embedding: EmbeddingPair) -> Self {
        Self {
            report,
            embedding,
            ingested_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &ReportId {
        &self.report.id
    }
}

/// In-memory map of reports, optionally backed by a record log.
#[derive(Debug)]
pub struct ReportStore {
    reports: RwLock<BTreeMap<ReportId, Arc<StoredReport>>>,
    log: Option<RecordLog>,
    dir: Option<PathBuf>,
}

impl ReportStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            reports: RwLock::new(BTreeMap::new()),
            log: None,
            dir: None,
        }
    }

    /// Open the store under `dir`, replaying its record log.
    ///
    /// Duplicate lines for the same id with identical content are collapsed.
    /// A line whose id is not the hash of its content, or two lines with the
    /// same id and different content, make the store unusable.
    pub fn open(dir: &Path) -> VrdResult<Self> {
        let log = RecordLog::open(dir)?;
        let records: Vec<StoredReport> = log.replay().map_err(|e| VrdError::StoreCorrupted {
            path: log.path().to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut reports: BTreeMap<ReportId, Arc<StoredReport>> = BTreeMap::new();
        for record in records {
            let expected = record.report.content_hash();
            if expected != record.report.id {
                return Err(VrdError::StoreCorrupted {
                    path: log.path().to_path_buf(),
                    reason: format!(
                        "record `{}` does not match its content hash `{}`",
                        record.report.id, expected
                    ),
                });
            }
            if let Some(existing) = reports.get(&record.report.id) {
                if !existing.report.same_content(&record.report) {
                    return Err(VrdError::StoreCorrupted {
                        path: log.path().to_path_buf(),
                        reason: format!("conflicting records for `{}`", record.report.id),
                    });
                }
                debug!("Skipping repeated record for {}", record.report.id.short());
                continue;
            }
            reports.insert(record.report.id.clone(), Arc::new(record));
        }

        info!("Opened report store at {:?} with {} reports", dir, reports.len());
        Ok(Self {
            reports: RwLock::new(reports),
            log: Some(log),
            dir: Some(dir.to_path_buf()),
        })
    }

    /// Directory backing the store, if persistent.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn is_persistent(&self) -> bool {
        self.log.is_some()
    }

    pub fn get(&self, id: &ReportId) -> VrdResult<Option<Arc<StoredReport>>> {
        Ok(self.read()?.get(id).cloned())
    }

    pub fn contains(&self, id: &ReportId) -> VrdResult<bool> {
        Ok(self.read()?.contains_key(id))
    }

    pub fn len(&self) -> VrdResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> VrdResult<bool> {
        Ok(self.len()? == 0)
    }

    /// All reports ordered by id.
    pub fn all(&self) -> VrdResult<Vec<Arc<StoredReport>>> {
        Ok(self.read()?.values().cloned().collect())
    }

    /// Persist and insert a record. Callers serialize writes per id and check
    /// for existing content first; this never overwrites.
    pub fn put(&self, record: StoredReport) -> VrdResult<Arc<StoredReport>> {
        if let Some(existing) = self.get(record.id())? {
            return Ok(existing);
        }
        if let Some(log) = &self.log {
            log.append(&record)?;
        }
        let record = Arc::new(record);
        self.write()?
            .entry(record.id().clone())
            .or_insert_with(|| Arc::clone(&record));
        Ok(record)
    }

    fn read(
        &self,
    ) -> VrdResult<std::sync::RwLockReadGuard<'_, BTreeMap<ReportId, Arc<StoredReport>>>> {
        self.reports
            .read()
            .map_err(|e| anyhow::anyhow!("report store lock poisoned: {}", e).into())
    }

    fn write(
        &self,
    ) -> VrdResult<std::sync::RwLockWriteGuard<'_, BTreeMap<ReportId, Arc<StoredReport>>>> {
        self.reports
            .write()
            .map_err(|e| anyhow::anyhow!("report store lock poisoned: {}", e).into())
    }
}
