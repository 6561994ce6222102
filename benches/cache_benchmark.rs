use criterion::{black_box, criterion_group, criterion_main, Criterion};
use leaderboard_engine::{
    cache::{CacheKind, TtlCache},
    core::LeaderEntry,
};
use std::time::Duration;

const TTL: Duration = Duration::from_secs(300);

fn leaders(count: usize) -> Vec<LeaderEntry> {
    (0..count)
        .map(|i| LeaderEntry {
            user_id: format!("user{}", i),
            score: 1000 - i as i64,
            timestamp: chrono::Utc::now(),
        })
        .collect()
}

fn setup_cache() -> TtlCache {
    let cache = TtlCache::new();

    // Populate with test data
    for i in 0..100 {
        let game = format!("game{}", i);
        cache.set(CacheKind::TopKLeaders, &[game.as_str(), "10"], &leaders(10), TTL);
    }

    cache
}

fn bench_cache_get(c: &mut Criterion) {
    let cache = setup_cache();

    c.bench_function("cache_get_hit", |b| {
        b.iter(|| {
            let hit: Option<Vec<LeaderEntry>> = cache.get(CacheKind::TopKLeaders, &["game50", "10"]);
            black_box(hit)
        });
    });

    c.bench_function("cache_get_miss", |b| {
        b.iter(|| {
            let miss: Option<Vec<LeaderEntry>> = cache.get(CacheKind::TopKLeaders, &["nonexistent", "10"]);
            black_box(miss)
        });
    });
}

fn bench_cache_set(c: &mut Criterion) {
    let cache = TtlCache::new();
    let value = leaders(10);

    c.bench_function("cache_set", |b| {
        b.iter(|| cache.set(CacheKind::TopKLeaders, &["game1", "10"], black_box(&value), TTL));
    });
}

fn bench_cache_evict_scope(c: &mut Criterion) {
    c.bench_function("cache_evict_scope", |b| {
        b.iter_with_setup(setup_cache, |cache| {
            black_box(cache.evict_scope(CacheKind::TopKLeaders, &["game50"]))
        });
    });
}

criterion_group!(benches, bench_cache_get, bench_cache_set, bench_cache_evict_scope);
criterion_main!(benches);
