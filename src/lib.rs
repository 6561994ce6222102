//! # Leaderboard Engine
//!
//! High-throughput score ingestion and leaderboard queries with:
//! - Write-ahead log durability before acknowledgment
//! - Single-flighted, batched flushing to the store
//! - Crash recovery that replays the log on startup
//! - TTL query cache invalidated by writes
//! - Standard competition ranking with percentiles
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use leaderboard_engine::{EngineConfig, LeaderboardEngine, ScoreRecord};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (engine, _report) = LeaderboardEngine::start(EngineConfig::default()).await?;
//!
//!     engine.ingest(vec![
//!         ScoreRecord::new("user123", "game456", 1500, chrono::Utc::now()),
//!     ]).await?;
//!
//!     let rank = engine.user_rank("game456", "user123", None).await?;
//!     println!("Rank {} of {} ({}%)", rank.rank, rank.total_players, rank.percentile);
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod cache;
pub mod config;
pub mod ranking;
pub mod store;
pub mod wal;
pub mod ingest;
pub mod recovery;
pub mod engine;
pub mod error;

// Re-export primary types
pub use core::{LeaderEntry, ScoreRecord, StoredScore, UserRank};
pub use cache::{CacheKind, CacheStats, TtlCache};
pub use config::EngineConfig;
pub use engine::LeaderboardEngine;
pub use error::{LeaderboardError, Result};
pub use ingest::{IngestReceipt, IngestionPipeline};
pub use ranking::RankingEngine;
pub use recovery::{RecoveryReport, RecoveryWarning};
pub use store::{InsertMode, ScoreStore};
pub use wal::WriteAheadLog;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
