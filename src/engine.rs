use std::sync::Arc;

use crate::cache::{CacheStats, TtlCache};
use crate::config::EngineConfig;
use crate::core::{LeaderEntry, ScoreRecord, UserRank};
use crate::error::Result;
use crate::ingest::{IngestReceipt, IngestionPipeline};
use crate::ranking::RankingEngine;
use crate::recovery::{self, RecoveryReport};
use crate::store::{ScoreStore, SqliteScoreStore};
use crate::wal::WriteAheadLog;

/// Main leaderboard orchestrator: ingestion, recovery and cached queries
/// over one store, one write-ahead log and one cache
pub struct LeaderboardEngine {
    config: EngineConfig,
    store: Arc<dyn ScoreStore>,
    wal: Arc<WriteAheadLog>,
    cache: Arc<TtlCache>,
    pipeline: IngestionPipeline,
    ranking: RankingEngine,
}

impl LeaderboardEngine {
    /// Open the SQLite store from `config` and recover any pending WAL records.
    ///
    /// Must complete before the engine takes traffic.
    pub async fn start(config: EngineConfig) -> Result<(Self, RecoveryReport)> {
        let store = Arc::new(SqliteScoreStore::new(&config.db_path).await?);
        Self::start_with_store(config, store).await
    }

    /// Same as [`start`](Self::start) with a caller-supplied store
    pub async fn start_with_store(
        config: EngineConfig,
        store: Arc<dyn ScoreStore>,
    ) -> Result<(Self, RecoveryReport)> {
        config.validate()?;

        let wal = Arc::new(WriteAheadLog::new(config.wal_path.clone()));
        let report = recovery::recover(&wal, store.as_ref()).await?;

        let cache = Arc::new(TtlCache::new());
        let pipeline = IngestionPipeline::new(
            Arc::clone(&wal),
            Arc::clone(&store),
            Arc::clone(&cache),
            config.max_batch_size,
        );
        let ranking = RankingEngine::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            config.cache_ttl,
            config.default_limit,
        );

        tracing::info!(
            "✅ Leaderboard engine ready (store: {}, wal: {})",
            store.name(),
            wal.path().display()
        );

        Ok((
            Self {
                config,
                store,
                wal,
                cache,
                pipeline,
                ranking,
            },
            report,
        ))
    }

    /// Ingest one or more scores; returns once they are persisted
    pub async fn ingest(&self, records: Vec<ScoreRecord>) -> Result<IngestReceipt> {
        self.pipeline.ingest(records).await
    }

    pub async fn top_leaders(&self, game_id: &str, limit: usize) -> Result<Vec<LeaderEntry>> {
        self.ranking.top_leaders(game_id, limit).await
    }

    pub async fn user_rank(
        &self,
        game_id: &str,
        user_id: &str,
        window_hours: Option<u32>,
    ) -> Result<UserRank> {
        self.ranking.user_rank(game_id, user_id, window_hours).await
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop expired cache entries
    pub fn purge_cache(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Records waiting for the next flush slice
    pub fn pending(&self) -> usize {
        self.pipeline.pending()
    }

    pub async fn total_scores(&self) -> Result<u64> {
        self.store.count().await
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn wal(&self) -> &WriteAheadLog {
        &self.wal
    }

    /// Drain the ingestion queue and tear the cache down
    pub async fn shutdown(&self) -> Result<()> {
        let flushed = self.pipeline.flush().await;
        self.cache.clear();

        match &flushed {
            Ok(()) => tracing::info!("👋 Leaderboard engine stopped"),
            Err(e) => tracing::warn!("⚠️ Final flush failed, WAL kept for recovery: {}", e),
        }
        flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_engine_creation() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            db_path: ":memory:".to_string(),
            wal_path: dir.path().join("wal.log"),
            ..EngineConfig::default()
        };

        let (engine, report) = LeaderboardEngine::start(config).await.unwrap();
        assert!(report.is_noop());
        assert_eq!(engine.total_scores().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = EngineConfig {
            db_path: ":memory:".to_string(),
            max_batch_size: 0,
            ..EngineConfig::default()
        };

        assert!(LeaderboardEngine::start(config).await.is_err());
    }
}
