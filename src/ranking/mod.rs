use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::{CacheKind, TtlCache};
use crate::core::{LeaderEntry, UserRank};
use crate::error::{LeaderboardError, Result};
use crate::store::ScoreStore;

/// Cache argument used for all-time rank lookups
const ALL_TIME: &str = "all";

/// Read-through leaderboard queries: cache first, store on miss
pub struct RankingEngine {
    store: Arc<dyn ScoreStore>,
    cache: Arc<TtlCache>,
    ttl: Duration,
    default_limit: usize,
}

impl RankingEngine {
    pub fn new(
        store: Arc<dyn ScoreStore>,
        cache: Arc<TtlCache>,
        ttl: Duration,
        default_limit: usize,
    ) -> Self {
        Self {
            store,
            cache,
            ttl,
            default_limit: default_limit.max(1),
        }
    }

    /// Top `limit` scores of a game, best first (`0` means the default limit)
    pub async fn top_leaders(&self, game_id: &str, limit: usize) -> Result<Vec<LeaderEntry>> {
        let limit = if limit == 0 { self.default_limit } else { limit };
        let limit_arg = limit.to_string();
        let args = [game_id, limit_arg.as_str()];

        if let Some(cached) = self.cache.get::<Vec<LeaderEntry>, _>(CacheKind::TopKLeaders, &args) {
            tracing::debug!("Cache hit: top {} of {}", limit, game_id);
            return Ok(cached);
        }

        let ticket = self.cache.ticket(CacheKind::TopKLeaders, &args);
        let leaders = self.store.top_scores(game_id, limit).await?;
        if !ticket.fill(&leaders, self.ttl) {
            tracing::debug!("Top {} of {} changed during read, not cached", limit, game_id);
        }

        Ok(leaders)
    }

    /// Rank and percentile of a user's best score in a game.
    ///
    /// With `window_hours`, only scores whose event time lies within the last
    /// `window_hours` hours count; `Some(0)` is the same as all time.
    pub async fn user_rank(
        &self,
        game_id: &str,
        user_id: &str,
        window_hours: Option<u32>,
    ) -> Result<UserRank> {
        let window_hours = window_hours.filter(|hours| *hours > 0);
        let window_arg = window_hours.map_or_else(|| ALL_TIME.to_string(), |h| h.to_string());
        let args = [game_id, user_id, window_arg.as_str()];

        if let Some(cached) = self.cache.get::<UserRank, _>(CacheKind::UserRank, &args) {
            tracing::debug!("Cache hit: rank of {} in {} ({})", user_id, game_id, window_arg);
            return Ok(cached);
        }

        let ticket = self.cache.ticket(CacheKind::UserRank, &args);
        let position = self
            .store
            .rank(game_id, user_id, window_hours.and_then(window_start))
            .await?
            .ok_or_else(|| {
                LeaderboardError::NotFound(format!(
                    "User {} not found in leaderboard for game {}",
                    user_id, game_id
                ))
            })?;

        let rank = UserRank::from(position);
        if !ticket.fill(&rank, self.ttl) {
            tracing::debug!("Rank of {} in {} changed during read, not cached", user_id, game_id);
        }

        Ok(rank)
    }
}

/// Earliest event time inside a window of `hours`; `None` once the window
/// reaches past the earliest representable time, which covers every record
fn window_start(hours: u32) -> Option<DateTime<Utc>> {
    Utc::now().checked_sub_signed(chrono::Duration::hours(i64::from(hours)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ScoreRecord;
    use crate::core::RankPosition;
    use crate::store::{InsertMode, MemoryScoreStore};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    const TTL: Duration = Duration::from_secs(300);

    async fn engine_with(records: Vec<ScoreRecord>) -> (RankingEngine, Arc<MemoryScoreStore>, Arc<TtlCache>) {
        let store = Arc::new(MemoryScoreStore::new());
        store.bulk_insert(&records, InsertMode::Strict).await.unwrap();
        let cache = Arc::new(TtlCache::new());
        let engine = RankingEngine::new(store.clone(), Arc::clone(&cache), TTL, 5);
        (engine, store, cache)
    }

    fn score(user: &str, value: i64) -> ScoreRecord {
        ScoreRecord::new(user, "g1", value, Utc::now())
    }

    #[tokio::test]
    async fn test_top_leaders_with_ties() {
        let (engine, _, _) = engine_with(vec![score("u1", 100), score("u2", 200), score("u3", 200)]).await;

        let top = engine.top_leaders("g1", 2).await.unwrap();
        let users: HashSet<&str> = top.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(users, HashSet::from(["u2", "u3"]));
        assert!(top.iter().all(|e| e.score == 200));
    }

    #[tokio::test]
    async fn test_top_leaders_default_limit() {
        let records: Vec<_> = (0..8).map(|i| score(&format!("u{}", i), i)).collect();
        let (engine, _, _) = engine_with(records).await;

        assert_eq!(engine.top_leaders("g1", 0).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_top_leaders_served_from_cache() {
        let (engine, store, cache) = engine_with(vec![score("u1", 100)]).await;

        let first = engine.top_leaders("g1", 5).await.unwrap();
        assert_eq!(first.len(), 1);

        // Written behind the cache's back: not visible until invalidated
        store.bulk_insert(&[score("u2", 500)], InsertMode::Strict).await.unwrap();
        assert_eq!(engine.top_leaders("g1", 5).await.unwrap(), first);

        cache.evict_scope(CacheKind::TopKLeaders, &["g1"]);
        let refreshed = engine.top_leaders("g1", 5).await.unwrap();
        assert_eq!(refreshed[0].user_id, "u2");
    }

    #[tokio::test]
    async fn test_user_rank_scenario() {
        let (engine, _, _) = engine_with(vec![score("u1", 100), score("u2", 200), score("u3", 200)]).await;

        let u1 = engine.user_rank("g1", "u1", None).await.unwrap();
        assert_eq!(u1, UserRank { rank: 3, percentile: 0.0, total_players: 3 });

        let u2 = engine.user_rank("g1", "u2", None).await.unwrap();
        assert_eq!(u2.rank, 1);
        assert_eq!(u2.percentile, 100.0);
    }

    #[tokio::test]
    async fn test_single_player_percentile() {
        let (engine, _, _) = engine_with(vec![score("solo", 42)]).await;

        let rank = engine.user_rank("g1", "solo", None).await.unwrap();
        assert_eq!(rank, UserRank { rank: 1, percentile: 0.0, total_players: 1 });
    }

    #[tokio::test]
    async fn test_user_rank_not_found() {
        let (engine, _, _) = engine_with(vec![score("u1", 100)]).await;

        let err = engine.user_rank("g1", "ghost", None).await.unwrap_err();
        assert!(matches!(err, LeaderboardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_user_rank_window() {
        let old = ScoreRecord::new("old", "g1", 1000, Utc::now() - chrono::Duration::hours(48));
        let (engine, _, _) = engine_with(vec![old, score("u1", 100), score("u2", 50)]).await;

        let all_time = engine.user_rank("g1", "u1", None).await.unwrap();
        assert_eq!(all_time.rank, 2);
        assert_eq!(all_time.total_players, 3);

        let last_day = engine.user_rank("g1", "u1", Some(24)).await.unwrap();
        assert_eq!(last_day, UserRank { rank: 1, percentile: 100.0, total_players: 2 });

        let err = engine.user_rank("g1", "old", Some(24)).await.unwrap_err();
        assert!(matches!(err, LeaderboardError::NotFound(_)));

        // Zero hours means all time
        assert_eq!(engine.user_rank("g1", "u1", Some(0)).await.unwrap(), all_time);
    }

    #[tokio::test]
    async fn test_user_rank_cached_per_window() {
        let (engine, _, cache) = engine_with(vec![score("u1", 100)]).await;

        engine.user_rank("g1", "u1", None).await.unwrap();
        engine.user_rank("g1", "u1", Some(24)).await.unwrap();
        assert_eq!(cache.len(), 2);

        let cached: Option<UserRank> = cache.get(CacheKind::UserRank, &["g1", "u1", "all"]);
        assert!(cached.is_some());
        let cached: Option<UserRank> = cache.get(CacheKind::UserRank, &["g1", "u1", "24"]);
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn test_user_rank_huge_window_is_all_time() {
        let old = ScoreRecord::new("old", "g1", 1000, Utc::now() - chrono::Duration::hours(48));
        let (engine, _, _) = engine_with(vec![old, score("u1", 100)]).await;

        let all_time = engine.user_rank("g1", "u1", None).await.unwrap();
        let widest = engine.user_rank("g1", "u1", Some(u32::MAX)).await.unwrap();
        assert_eq!(widest, all_time);
        assert_eq!(widest.total_players, 2);
    }

    /// Memory store whose first read pauses after taking its snapshot
    /// until the test lets it return
    struct GatedStore {
        inner: MemoryScoreStore,
        armed: AtomicBool,
        snapshot_taken: Notify,
        release: Notify,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: MemoryScoreStore::new(),
                armed: AtomicBool::new(true),
                snapshot_taken: Notify::new(),
                release: Notify::new(),
            }
        }

        async fn hold(&self) {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.snapshot_taken.notify_one();
                self.release.notified().await;
            }
        }
    }

    #[async_trait]
    impl ScoreStore for GatedStore {
        async fn bulk_insert(&self, records: &[ScoreRecord], mode: InsertMode) -> Result<usize> {
            self.inner.bulk_insert(records, mode).await
        }

        async fn insert_one(&self, record: &ScoreRecord) -> Result<()> {
            self.inner.insert_one(record).await
        }

        async fn top_scores(&self, game_id: &str, limit: usize) -> Result<Vec<LeaderEntry>> {
            let snapshot = self.inner.top_scores(game_id, limit).await?;
            self.hold().await;
            Ok(snapshot)
        }

        async fn rank(
            &self,
            game_id: &str,
            user_id: &str,
            since: Option<DateTime<Utc>>,
        ) -> Result<Option<RankPosition>> {
            let snapshot = self.inner.rank(game_id, user_id, since).await?;
            self.hold().await;
            Ok(snapshot)
        }

        async fn count(&self) -> Result<u64> {
            self.inner.count().await
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    fn gated_engine(store: Arc<GatedStore>) -> (Arc<RankingEngine>, Arc<TtlCache>) {
        let cache = Arc::new(TtlCache::new());
        let engine = RankingEngine::new(store, Arc::clone(&cache), TTL, 5);
        (Arc::new(engine), cache)
    }

    #[tokio::test]
    async fn test_top_leaders_snapshot_not_cached_across_write() {
        let store = Arc::new(GatedStore::new());
        let (engine, cache) = gated_engine(Arc::clone(&store));

        let reader = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.top_leaders("g1", 5).await }
        });
        store.snapshot_taken.notified().await;

        // Persist and invalidate while the reader holds its snapshot
        store.bulk_insert(&[score("u1", 100)], InsertMode::Strict).await.unwrap();
        cache.evict_scope(CacheKind::TopKLeaders, &["g1"]);

        store.release.notify_one();
        assert!(reader.await.unwrap().unwrap().is_empty());

        let after = engine.top_leaders("g1", 5).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_user_rank_snapshot_not_cached_across_write() {
        let store = Arc::new(GatedStore::new());
        store.inner.bulk_insert(&[score("u1", 100)], InsertMode::Strict).await.unwrap();
        let (engine, cache) = gated_engine(Arc::clone(&store));

        let reader = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.user_rank("g1", "u1", None).await }
        });
        store.snapshot_taken.notified().await;

        store.bulk_insert(&[score("u1", 300), score("u2", 200)], InsertMode::Strict).await.unwrap();
        cache.evict_scope(CacheKind::UserRank, &["g1", "u1"]);

        store.release.notify_one();
        assert_eq!(reader.await.unwrap().unwrap().total_players, 1);

        let after = engine.user_rank("g1", "u1", None).await.unwrap();
        assert_eq!(after, UserRank { rank: 1, percentile: 100.0, total_players: 3 });
    }
}
