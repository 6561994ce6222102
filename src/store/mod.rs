pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::{LeaderEntry, RankPosition, ScoreRecord};
use crate::error::Result;

pub use memory::MemoryScoreStore;
pub use sqlite::SqliteScoreStore;

/// How a bulk insert treats records that already exist under the natural key
/// `(user_id, game_id, timestamp, score)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Any duplicate fails the whole batch
    Strict,
    /// Duplicates are silently skipped (recovery, seeding)
    SkipDuplicates,
}

/// Trait for persistent score stores
///
/// A bulk insert is all-or-nothing: either every (non-skipped) record of the
/// batch is visible afterwards or none is.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Insert a batch in one transaction, returning the number of rows written
    async fn bulk_insert(&self, records: &[ScoreRecord], mode: InsertMode) -> Result<usize>;

    /// Insert a single record
    async fn insert_one(&self, record: &ScoreRecord) -> Result<()>;

    /// Highest scores of a game, best first; ties are in no particular order
    async fn top_scores(&self, game_id: &str, limit: usize) -> Result<Vec<LeaderEntry>>;

    /// Competition rank of the user's best record among records of `game_id`,
    /// restricted to `timestamp >= since` when given
    async fn rank(
        &self,
        game_id: &str,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<RankPosition>>;

    /// Total number of stored records
    async fn count(&self) -> Result<u64>;

    /// Get store name for logging
    fn name(&self) -> &str;
}
