use criterion::{black_box, criterion_group, criterion_main, Criterion};
use leaderboard_engine::{
    core::ScoreRecord,
    store::{InsertMode, MemoryScoreStore, ScoreStore, SqliteScoreStore},
};

fn create_test_scores(count: usize) -> Vec<ScoreRecord> {
    let now = chrono::Utc::now();
    (0..count)
        .map(|i| {
            ScoreRecord::new(
                format!("user{}", i % 1000),
                "game1",
                ((i * 7919) % 10_000) as i64,
                now - chrono::Duration::seconds(i as i64),
            )
        })
        .collect()
}

fn bench_memory_rank(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = MemoryScoreStore::new();
    runtime
        .block_on(store.bulk_insert(&create_test_scores(10_000), InsertMode::SkipDuplicates))
        .unwrap();

    c.bench_function("memory_rank_10k", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(store.rank("game1", "user500", None).await.unwrap())
        });
    });
}

fn bench_sqlite_rank(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = runtime.block_on(SqliteScoreStore::new(":memory:")).unwrap();
    runtime
        .block_on(store.bulk_insert(&create_test_scores(10_000), InsertMode::SkipDuplicates))
        .unwrap();

    c.bench_function("sqlite_rank_10k", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(store.rank("game1", "user500", None).await.unwrap())
        });
    });

    c.bench_function("sqlite_top_10", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(store.top_scores("game1", 10).await.unwrap())
        });
    });
}

fn bench_bulk_insert(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let batch = create_test_scores(5000);

    c.bench_function("sqlite_bulk_insert_5000", |b| {
        b.to_async(&runtime).iter(|| async {
            let store = SqliteScoreStore::new(":memory:").await.unwrap();
            black_box(store.bulk_insert(&batch, InsertMode::Strict).await.unwrap())
        });
    });
}

criterion_group!(benches, bench_memory_rank, bench_sqlite_rank, bench_bulk_insert);
criterion_main!(benches);
