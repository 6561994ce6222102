//! Startup replay of the write-ahead log into the store

use serde::Serialize;

use crate::core::ScoreRecord;
use crate::error::Result;
use crate::store::{InsertMode, ScoreStore};
use crate::wal::{decode_line, WalLineError, WriteAheadLog};

/// A WAL line that was dropped during recovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryWarning {
    /// 1-based line number in the log
    pub line_no: usize,
    pub line: String,
    pub reason: String,
}

impl RecoveryWarning {
    fn new(line_no: usize, line: &str, reason: WalLineError) -> Self {
        Self {
            line_no,
            line: line.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Outcome of one recovery pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    /// Non-empty lines found in the log
    pub lines: usize,
    /// Valid records handed to the store
    pub recovered: usize,
    /// Malformed lines that were skipped
    pub skipped: Vec<RecoveryWarning>,
    /// Valid records the store rejected during one-by-one fallback
    pub dropped: usize,
    /// Whether the bulk insert failed and records were inserted one at a time
    pub fell_back: bool,
}

impl RecoveryReport {
    pub fn is_noop(&self) -> bool {
        self.lines == 0
    }
}

/// Parse the raw log, collecting valid records and warnings for the rest
pub fn parse_log(raw: &str) -> (Vec<ScoreRecord>, Vec<RecoveryWarning>) {
    let mut records = Vec::new();
    let mut warnings = Vec::new();

    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match decode_line(line) {
            Ok(record) => records.push(record),
            Err(reason) => warnings.push(RecoveryWarning::new(idx + 1, line, reason)),
        }
    }

    (records, warnings)
}

/// Replay the write-ahead log into `store`, then delete the log.
///
/// Malformed lines and records the store rejects are logged and dropped, never
/// fatal. The log is removed whether or not every record made it. Only a
/// failure to read the log is returned as an error.
pub async fn recover(wal: &WriteAheadLog, store: &dyn ScoreStore) -> Result<RecoveryReport> {
    let raw = match wal.read()? {
        Some(raw) => raw,
        None => {
            tracing::info!("No {} found; nothing to recover.", wal.path().display());
            return Ok(RecoveryReport::default());
        }
    };

    if raw.trim().is_empty() {
        remove_log(wal);
        tracing::info!("{} was empty; deleted.", wal.path().display());
        return Ok(RecoveryReport::default());
    }

    let (records, skipped) = parse_log(&raw);
    for warning in &skipped {
        tracing::warn!(
            "⚠️ Skipping malformed WAL line {} ({}): {}",
            warning.line_no,
            warning.reason,
            warning.line
        );
    }

    let mut report = RecoveryReport {
        lines: records.len() + skipped.len(),
        recovered: records.len(),
        skipped,
        ..RecoveryReport::default()
    };

    if records.is_empty() {
        remove_log(wal);
        tracing::info!("No valid records to recover; {} deleted.", wal.path().display());
        return Ok(report);
    }

    match store.bulk_insert(&records, InsertMode::SkipDuplicates).await {
        Ok(written) => {
            tracing::info!(
                "✅ Recovered {} score(s) from {} ({} new)",
                records.len(),
                wal.path().display(),
                written
            );
        }
        Err(e) => {
            tracing::error!("❌ Batch recovery failed; falling back to single inserts: {}", e);
            report.fell_back = true;

            for record in &records {
                if let Err(e) = store.insert_one(record).await {
                    tracing::error!(
                        "Failed to insert recovered score for {}@{}: {}",
                        record.user_id,
                        record.game_id,
                        e
                    );
                    report.dropped += 1;
                }
            }
            report.recovered -= report.dropped;
        }
    }

    remove_log(wal);
    tracing::info!("{} deleted after recovery", wal.path().display());
    Ok(report)
}

fn remove_log(wal: &WriteAheadLog) {
    if let Err(e) = wal.remove() {
        tracing::error!("Failed to delete {} after recovery: {}", wal.path().display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_mixed() {
        let raw = "2024-02-20T12:00:00.000Z,u1,g1,100\n\
                   2024-02-20T12:00:00.000Z,u2,100\n\
                   \n\
                   2024-02-20T12:00:01.000Z,u3,g1,abc\n\
                   2024-02-20T12:00:02.000Z,u4,g1,300\n";

        let (records, warnings) = parse_log(raw);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].user_id, "u4");
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].line_no, 2);
        assert_eq!(warnings[1].line_no, 4);
    }

    #[test]
    fn test_parse_log_handles_crlf() {
        let (records, warnings) = parse_log("2024-02-20T12:00:00.000Z,u1,g1,100\r\n");
        assert_eq!(records.len(), 1);
        assert!(warnings.is_empty());
    }
}
