use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::{LeaderEntry, RankPosition, ScoreRecord, StoredScore};
use crate::error::{LeaderboardError, Result};
use crate::store::{InsertMode, ScoreStore};

/// SQLite-backed score store
///
/// Schema:
/// ```sql
/// CREATE TABLE scores (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     user_id TEXT NOT NULL,
///     game_id TEXT NOT NULL,
///     score INTEGER NOT NULL,
///     timestamp_ms INTEGER NOT NULL,
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL,
///     UNIQUE (user_id, game_id, timestamp_ms, score)
/// );
/// ```
pub struct SqliteScoreStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteScoreStore {
    /// Open (or create) the store at `db_path`; `:memory:` gives a private in-memory database
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                game_id TEXT NOT NULL,
                score INTEGER NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, game_id, timestamp_ms, score)
            );
            CREATE INDEX IF NOT EXISTS idx_scores_game_score ON scores(game_id, score DESC);
            CREATE INDEX IF NOT EXISTS idx_scores_game_time ON scores(game_id, timestamp_ms);",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LeaderboardError::Other("SQLite connection lock poisoned".into()))
    }

    /// All stored records of a game, in insertion order
    pub fn list(&self, game_id: &str) -> Result<Vec<StoredScore>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, game_id, score, timestamp_ms, created_at, updated_at
             FROM scores
             WHERE game_id = ?1
             ORDER BY id",
        )?;

        let rows = stmt.query_map(params![game_id], |row| {
            Ok(StoredScore {
                id: row.get(0)?,
                record: ScoreRecord {
                    user_id: row.get(1)?,
                    game_id: row.get(2)?,
                    score: row.get(3)?,
                    timestamp: millis_to_datetime(4, row.get(4)?)?,
                },
                created_at: parse_audit_time(row.get::<_, String>(5)?),
                updated_at: parse_audit_time(row.get::<_, String>(6)?),
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn millis_to_datetime(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn parse_audit_time(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl ScoreStore for SqliteScoreStore {
    async fn bulk_insert(&self, records: &[ScoreRecord], mode: InsertMode) -> Result<usize> {
        let sql = match mode {
            InsertMode::Strict => {
                "INSERT INTO scores (user_id, game_id, score, timestamp_ms, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)"
            }
            InsertMode::SkipDuplicates => {
                "INSERT OR IGNORE INTO scores (user_id, game_id, score, timestamp_ms, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)"
            }
        };

        let mut conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        // Dropping the transaction on error rolls the whole batch back
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare_cached(sql)?;
            for record in records {
                written += stmt.execute(params![
                    record.user_id,
                    record.game_id,
                    record.score,
                    record.timestamp_millis(),
                    now,
                ])?;
            }
        }
        tx.commit()?;

        Ok(written)
    }

    async fn insert_one(&self, record: &ScoreRecord) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO scores (user_id, game_id, score, timestamp_ms, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                record.user_id,
                record.game_id,
                record.score,
                record.timestamp_millis(),
                now,
            ],
        )?;

        Ok(())
    }

    async fn top_scores(&self, game_id: &str, limit: usize) -> Result<Vec<LeaderEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT user_id, score, timestamp_ms
             FROM scores
             WHERE game_id = ?1
             ORDER BY score DESC
             LIMIT ?2",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![game_id, limit], |row| {
            Ok(LeaderEntry {
                user_id: row.get(0)?,
                score: row.get(1)?,
                timestamp: millis_to_datetime(2, row.get(2)?)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn rank(
        &self,
        game_id: &str,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<RankPosition>> {
        let conn = self.lock()?;
        let since_ms = since.map(|ts| ts.timestamp_millis());

        let position = conn
            .query_row(
                "WITH ranked AS (
                    SELECT
                        user_id,
                        RANK() OVER (ORDER BY score DESC) AS rank,
                        COUNT(*) OVER () AS total_players
                    FROM scores
                    WHERE game_id = ?1
                      AND (?2 IS NULL OR timestamp_ms >= ?2)
                )
                SELECT rank, total_players
                FROM ranked
                WHERE user_id = ?3
                ORDER BY rank ASC
                LIMIT 1",
                params![game_id, since_ms, user_id],
                |row| {
                    let rank: i64 = row.get(0)?;
                    let total_players: i64 = row.get(1)?;
                    Ok(RankPosition {
                        rank: rank.max(0) as u64,
                        total_players: total_players.max(0) as u64,
                    })
                },
            )
            .optional()?;

        Ok(position)
    }

    async fn count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM scores", [], |row| row.get(0))?;
        Ok(total.max(0) as u64)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
