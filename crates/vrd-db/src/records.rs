//! Append-only JSONL record log.
//!
//! One line per record. The log never rewrites earlier lines; replaying it in
//! order yields every record ever appended. Callers own the record schema and
//! decide how to key and deduplicate records on replay.

use crate::error::{DbError, DbResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Default filename for the report record log.
pub const RECORD_LOG_FILENAME: &str = "reports.jsonl";

/// Append-only JSONL log of serialized records.
#[derive(Debug)]
pub struct RecordLog {
    path: PathBuf,
    writer: Mutex<File>,
}

impl RecordLog {
    /// Open (or create) the log at `dir/reports.jsonl`.
    pub fn open(dir: &Path) -> DbResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(RECORD_LOG_FILENAME);
        debug!("Opening record log at {:?}", path);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| DbError::record_io(&path, e.to_string()))?;

        // Cut a torn final line so the next append starts on a fresh line.
        let existing = fs::read(&path).map_err(|e| DbError::record_io(&path, e.to_string()))?;
        if existing.last().is_some_and(|b| *b != b'\n') {
            let keep = existing
                .iter()
                .rposition(|b| *b == b'\n')
                .map(|pos| pos + 1)
                .unwrap_or(0);
            warn!(
                "Record log {:?} ends mid-line, truncating {} bytes",
                path,
                existing.len() - keep
            );
            file.set_len(keep as u64)
                .map_err(|e| DbError::record_io(&path, e.to_string()))?;
        }

        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to disk.
    pub fn append<T: Serialize>(&self, record: &T) -> DbResult<()> {
        let line = serde_json::to_string(record)?;

        let mut file = self
            .writer
            .lock()
            .map_err(|e| DbError::internal(format!("Failed to acquire log lock: {}", e)))?;

        writeln!(file, "{}", line).map_err(|e| DbError::record_io(&self.path, e.to_string()))?;
        file.flush()
            .map_err(|e| DbError::record_io(&self.path, e.to_string()))?;
        Ok(())
    }

    /// Read every record in append order.
    ///
    /// Blank lines are skipped. A line that fails to parse is an error unless
    /// it is the final line, which is treated as a torn write and dropped.
    pub fn replay<T: DeserializeOwned>(&self) -> DbResult<Vec<T>> {
        let file = File::open(&self.path).map_err(|e| DbError::record_io(&self.path, e.to_string()))?;
        let lines: Vec<String> = BufReader::new(file)
            .lines()
            .collect::<Result<_, _>>()
            .map_err(|e| DbError::record_io(&self.path, e.to_string()))?;

        let last = lines.iter().rposition(|l| !l.trim().is_empty());
        let mut records = Vec::with_capacity(lines.len());

        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(line) {
                Ok(record) => records.push(record),
                Err(e) if Some(idx) == last => {
                    warn!("Dropping torn final record at line {}: {}", idx + 1, e);
                }
                Err(e) => {
                    return Err(DbError::RecordParse {
                        path: self.path.clone(),
                        line: idx + 1,
                        message: e.to_string(),
                    });
                }
            }
        }

        debug!("Replayed {} records from {:?}", records.len(), self.path);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: String,
        value: u32,
    }

    fn row(id: &str, value: u32) -> Row {
        Row {
            id: id.to_string(),
            value,
        }
    }

    #[test]
    fn test_append_and_replay_in_order() {
        let temp = TempDir::new().unwrap();
        let log = RecordLog::open(temp.path()).unwrap();
        log.append(&row("a", 1)).unwrap();
        log.append(&row("b", 2)).unwrap();

        let rows: Vec<Row> = log.replay().unwrap();
        assert_eq!(rows, vec![row("a", 1), row("b", 2)]);
    }

    #[test]
    fn test_reopen_keeps_records() {
        let temp = TempDir::new().unwrap();
        {
            let log = RecordLog::open(temp.path()).unwrap();
            log.append(&row("a", 1)).unwrap();
        }
        let log = RecordLog::open(temp.path()).unwrap();
        log.append(&row("b", 2)).unwrap();

        let rows: Vec<Row> = log.replay().unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_torn_final_line_is_dropped() {
        let temp = TempDir::new().unwrap();
        let log = RecordLog::open(temp.path()).unwrap();
        log.append(&row("a", 1)).unwrap();
        fs::write(
            log.path(),
            format!("{}\n{{\"id\":\"b\",\"va", serde_json::to_string(&row("a", 1)).unwrap()),
        )
        .unwrap();

        let rows: Vec<Row> = log.replay().unwrap();
        assert_eq!(rows, vec![row("a", 1)]);
    }

    #[test]
    fn test_append_after_torn_line_starts_fresh_line() {
        let temp = TempDir::new().unwrap();
        {
            let log = RecordLog::open(temp.path()).unwrap();
            log.append(&row("a", 1)).unwrap();
        }
        let path = temp.path().join(RECORD_LOG_FILENAME);
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("{\"id\":\"b\"");
        fs::write(&path, content).unwrap();

        let log = RecordLog::open(temp.path()).unwrap();
        log.append(&row("c", 3)).unwrap();

        let rows: Vec<Row> = log.replay().unwrap();
        assert_eq!(rows, vec![row("a", 1), row("c", 3)]);
    }

    #[test]
    fn test_corrupt_middle_line_is_error() {
        let temp = TempDir::new().unwrap();
        let log = RecordLog::open(temp.path()).unwrap();
        fs::write(
            log.path(),
            format!("garbage\n{}\n", serde_json::to_string(&row("a", 1)).unwrap()),
        )
        .unwrap();

        let err = log.replay::<Row>().unwrap_err();
        assert!(matches!(err, DbError::RecordParse { line: 1, .. }));
    }
}
