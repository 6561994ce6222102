use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{LeaderboardError, Result};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SQLite database path (`:memory:` for an in-memory store)
    pub db_path: String,
    /// Write-ahead log file
    pub wal_path: PathBuf,
    /// Time-to-live of cached leaderboard queries
    pub cache_ttl: Duration,
    /// Maximum number of records per bulk insert
    pub max_batch_size: usize,
    /// Top-K limit used when the caller passes none
    pub default_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: "leaderboard.db".to_string(),
            wal_path: PathBuf::from("wal.log"),
            cache_ttl: Duration::from_secs(300),
            max_batch_size: 5000,
            default_limit: 5,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from environment variables, falling back to defaults.
    ///
    /// Reads `DB_PATH`, `WAL_PATH`, `CACHE_TTL_SECS`, `MAX_FLUSH_BATCH` and `DEFAULT_LIMIT`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            db_path: std::env::var("DB_PATH").unwrap_or(defaults.db_path),
            wal_path: std::env::var("WAL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.wal_path),
            cache_ttl: env_parse::<u64>("CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            max_batch_size: env_parse("MAX_FLUSH_BATCH").unwrap_or(defaults.max_batch_size),
            default_limit: env_parse("DEFAULT_LIMIT").unwrap_or(defaults.default_limit),
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(LeaderboardError::Config("max_batch_size must be at least 1".into()));
        }
        if self.default_limit == 0 {
            return Err(LeaderboardError::Config("default_limit must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("⚠️ Ignoring invalid {}={:?}, using default", name, raw);
            None
        }
    }
}
