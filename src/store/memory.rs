use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::core::{competition_rank, LeaderEntry, RankPosition, ScoreRecord, StoredScore};
use crate::error::{LeaderboardError, Result};
use crate::store::{InsertMode, ScoreStore};

type NaturalKey = (String, String, i64, i64);

#[derive(Default)]
struct Tables {
    rows: Vec<StoredScore>,
    keys: HashSet<NaturalKey>,
    next_id: i64,
}

fn natural_key(record: &ScoreRecord) -> NaturalKey {
    (
        record.user_id.clone(),
        record.game_id.clone(),
        record.timestamp_millis(),
        record.score,
    )
}

/// In-process score store with the same dedup and ranking semantics as
/// [`SqliteScoreStore`](crate::store::SqliteScoreStore)
#[derive(Default)]
pub struct MemoryScoreStore {
    tables: RwLock<Tables>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored row, in insertion order
    pub fn snapshot(&self) -> Vec<StoredScore> {
        self.tables.read().rows.clone()
    }
}

#[async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn bulk_insert(&self, records: &[ScoreRecord], mode: InsertMode) -> Result<usize> {
        let mut tables = self.tables.write();

        // Check the whole batch first so a rejected batch leaves no trace
        let mut staged: Vec<&ScoreRecord> = Vec::with_capacity(records.len());
        let mut batch_keys = HashSet::with_capacity(records.len());
        for record in records {
            let key = natural_key(record);
            let duplicate = tables.keys.contains(&key) || batch_keys.contains(&key);
            match (duplicate, mode) {
                (true, InsertMode::Strict) => {
                    return Err(LeaderboardError::Persistence(format!(
                        "duplicate score for {}@{}",
                        record.user_id, record.game_id
                    )));
                }
                (true, InsertMode::SkipDuplicates) => continue,
                (false, _) => {
                    batch_keys.insert(key);
                    staged.push(record);
                }
            }
        }

        let now = Utc::now();
        for record in &staged {
            tables.next_id += 1;
            let id = tables.next_id;
            tables.rows.push(StoredScore {
                id,
                record: (*record).clone(),
                created_at: now,
                updated_at: now,
            });
        }
        tables.keys.extend(batch_keys);

        Ok(staged.len())
    }

    async fn insert_one(&self, record: &ScoreRecord) -> Result<()> {
        self.bulk_insert(std::slice::from_ref(record), InsertMode::Strict)
            .await
            .map(|_| ())
    }

    async fn top_scores(&self, game_id: &str, limit: usize) -> Result<Vec<LeaderEntry>> {
        let tables = self.tables.read();
        let mut entries: Vec<LeaderEntry> = tables
            .rows
            .iter()
            .filter(|row| row.record.game_id == game_id)
            .map(|row| LeaderEntry {
                user_id: row.record.user_id.clone(),
                score: row.record.score,
                timestamp: row.record.timestamp,
            })
            .collect();

        entries.sort_by(|a, b| b.score.cmp(&a.score));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn rank(
        &self,
        game_id: &str,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<RankPosition>> {
        let tables = self.tables.read();
        let scores: Vec<(&str, i64)> = tables
            .rows
            .iter()
            .filter(|row| row.record.game_id == game_id)
            .filter(|row| since.map_or(true, |cutoff| row.record.timestamp >= cutoff))
            .map(|row| (row.record.user_id.as_str(), row.record.score))
            .collect();

        let best = scores
            .iter()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, score)| *score)
            .max();

        Ok(best.map(|score| RankPosition {
            rank: competition_rank(score, scores.iter().map(|(_, s)| *s)),
            total_players: scores.len() as u64,
        }))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.tables.read().rows.len() as u64)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
