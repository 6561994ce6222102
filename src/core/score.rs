use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LeaderboardError, Result};

/// Characters that would break the write-ahead log line format
const RESERVED_CHARS: [char; 3] = [',', '\n', '\r'];

/// A single game score as submitted by a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreRecord {
    /// Player identifier
    pub user_id: String,

    /// Game identifier
    pub game_id: String,

    /// Non-negative score
    pub score: i64,

    /// Event time (when the score was achieved, not when it was ingested)
    #[serde(alias = "timeStamp")]
    pub timestamp: DateTime<Utc>,
}

impl ScoreRecord {
    /// Create a new record with the given event time
    pub fn new(
        user_id: impl Into<String>,
        game_id: impl Into<String>,
        score: i64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            game_id: game_id.into(),
            score,
            timestamp,
        }
    }

    /// Check semantic constraints and normalise the timestamp to millisecond
    /// precision, which is what the write-ahead log and the store retain.
    pub fn validated(mut self) -> Result<Self> {
        validate_id("user_id", &self.user_id)?;
        validate_id("game_id", &self.game_id)?;

        if self.score < 0 {
            return Err(LeaderboardError::Validation(format!(
                "score must be non-negative, got {}",
                self.score
            )));
        }

        self.timestamp = truncate_to_millis(self.timestamp)?;
        Ok(self)
    }

    /// Event time in Unix milliseconds
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

fn validate_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LeaderboardError::Validation(format!("{} must not be empty", field)));
    }
    if value.contains(RESERVED_CHARS) {
        return Err(LeaderboardError::Validation(format!(
            "{} must not contain commas or line breaks: {:?}",
            field, value
        )));
    }
    Ok(())
}

fn truncate_to_millis(ts: DateTime<Utc>) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ts.timestamp_millis())
        .ok_or_else(|| LeaderboardError::Validation(format!("timestamp out of range: {}", ts)))
}

/// A persisted score with store-assigned identity and audit timestamps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredScore {
    pub id: i64,
    #[serde(flatten)]
    pub record: ScoreRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
