use thiserror::Error;

/// Main error type for the leaderboard engine
#[derive(Error, Debug)]
pub enum LeaderboardError {
    /// Malformed input, rejected before the write-ahead log is touched
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bulk insert failed after the records were made durable in the WAL
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// No ranking record for the requested user/game/window
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write-ahead log I/O errors
    #[error("Write-ahead log error: {0}")]
    Wal(#[from] std::io::Error),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl LeaderboardError {
    /// Whether the error is the caller's fault (maps to a client error)
    pub fn is_client_error(&self) -> bool {
        matches!(self, LeaderboardError::Validation(_) | LeaderboardError::NotFound(_))
    }
}

impl From<String> for LeaderboardError {
    fn from(s: String) -> Self {
        LeaderboardError::Other(s)
    }
}

impl From<&str> for LeaderboardError {
    fn from(s: &str) -> Self {
        LeaderboardError::Other(s.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, LeaderboardError>;
