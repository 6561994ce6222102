//! Write-ahead log
//!
//! Every accepted score is appended here, and synced to disk, before it is
//! queued for the store. The log is replayed and removed by crash recovery at
//! the next startup.
//!
//! Line format (no escaping, ids may not contain commas):
//! ```text
//! 2024-02-20T12:34:56.789Z,user123,game456,1500
//! ```

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use thiserror::Error;

use crate::core::ScoreRecord;
use crate::error::Result;

const FIELD_COUNT: usize = 4;

/// Why a WAL line could not be turned back into a score
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalLineError {
    #[error("expected 4 fields, found {0}")]
    FieldCount(usize),

    #[error("invalid score {0:?}")]
    InvalidScore(String),

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Encode one record as a WAL line, including the trailing newline
pub fn encode_line(record: &ScoreRecord) -> String {
    format!(
        "{},{},{},{}\n",
        record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        record.user_id,
        record.game_id,
        record.score
    )
}

/// Decode one WAL line (without its newline)
pub fn decode_line(line: &str) -> std::result::Result<ScoreRecord, WalLineError> {
    let fields: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Err(WalLineError::FieldCount(fields.len()));
    }

    let timestamp = DateTime::parse_from_rfc3339(fields[0])
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| WalLineError::InvalidTimestamp(fields[0].to_string()))?;

    let score = fields[3]
        .trim()
        .parse::<i64>()
        .map_err(|_| WalLineError::InvalidScore(fields[3].to_string()))?;

    ScoreRecord::new(fields[1], fields[2], score, timestamp)
        .validated()
        .map_err(|e| WalLineError::InvalidRecord(e.to_string()))
}

/// Append-only, fsynced score log
pub struct WriteAheadLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl WriteAheadLog {
    /// The file is created lazily on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append records and sync them to disk.
    ///
    /// All lines of one call are written with a single `write_all` under the
    /// log lock, so concurrent appends never interleave.
    pub fn append(&self, records: &[ScoreRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let buf: String = records.iter().map(encode_line).collect();

        let mut guard = self.file.lock();
        let mut file = match guard.take() {
            Some(file) => file,
            None => OpenOptions::new().create(true).append(true).open(&self.path)?,
        };

        // On failure the handle is dropped and reopened by the next append
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;
        *guard = Some(file);

        Ok(())
    }

    /// Read the raw log contents; `None` if the file does not exist
    pub fn read(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the log file; a missing file is not an error
    pub fn remove(&self) -> Result<()> {
        let mut guard = self.file.lock();
        *guard = None;

        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}
