//! Score ingestion pipeline
//!
//! `ingest` appends to the write-ahead log, queues the records and waits for
//! the flush round that persists them. At most one round runs at a time: the
//! first caller to find the pipeline idle starts a round (a new generation),
//! every other caller subscribes to the round in flight. A round keeps draining
//! the queue in bounded slices until it is empty, so records queued while it
//! runs are swept into the same generation.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::cache::{CacheKind, TtlCache};
use crate::core::ScoreRecord;
use crate::error::{LeaderboardError, Result};
use crate::store::{InsertMode, ScoreStore};
use crate::wal::WriteAheadLog;

type RoundOutcome = std::result::Result<(), String>;

/// Result of a successful ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub accepted: usize,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<ScoreRecord>,
    flushing: bool,
    generation: u64,
    waiters: Vec<oneshot::Sender<RoundOutcome>>,
}

struct Shared {
    wal: Arc<WriteAheadLog>,
    store: Arc<dyn ScoreStore>,
    cache: Arc<TtlCache>,
    max_batch_size: usize,
    state: Mutex<QueueState>,
}

/// WAL-backed, single-flighted batching writer
#[derive(Clone)]
pub struct IngestionPipeline {
    shared: Arc<Shared>,
}

impl IngestionPipeline {
    pub fn new(
        wal: Arc<WriteAheadLog>,
        store: Arc<dyn ScoreStore>,
        cache: Arc<TtlCache>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                wal,
                store,
                cache,
                max_batch_size: max_batch_size.max(1),
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Durably accept `records` and wait until they are persisted.
    ///
    /// Records are stored at most once per `(user_id, game_id, timestamp,
    /// score)`: resubmitting an already persisted record succeeds without
    /// adding a row.
    ///
    /// Fails with `Validation` before anything is written, with `Wal` if the log
    /// append fails (nothing is queued), and with `Persistence` if the flush
    /// round fails (the records stay in the log for recovery).
    pub async fn ingest(&self, records: Vec<ScoreRecord>) -> Result<IngestReceipt> {
        if records.is_empty() {
            return Ok(IngestReceipt { accepted: 0 });
        }

        let records = records
            .into_iter()
            .map(ScoreRecord::validated)
            .collect::<Result<Vec<_>>>()?;

        self.shared.wal.append(&records)?;
        tracing::debug!("📝 {} score(s) written to {}", records.len(), self.shared.wal.path().display());

        let accepted = records.len();
        let done = self.enqueue(records);
        wait_for(done).await?;

        Ok(IngestReceipt { accepted })
    }

    /// Wait until everything queued so far has been flushed
    pub async fn flush(&self) -> Result<()> {
        let done = self.enqueue(Vec::new());
        wait_for(done).await
    }

    /// Records queued but not yet handed to the store
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Number of flush rounds started so far
    pub fn generation(&self) -> u64 {
        self.shared.state.lock().generation
    }

    fn enqueue(&self, records: Vec<ScoreRecord>) -> oneshot::Receiver<RoundOutcome> {
        let (tx, rx) = oneshot::channel();

        let start = {
            let mut state = self.shared.state.lock();
            state.queue.extend(records);
            state.waiters.push(tx);
            if state.flushing {
                None
            } else {
                state.flushing = true;
                state.generation += 1;
                Some(state.generation)
            }
        };

        if let Some(generation) = start {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move { shared.run_round(generation).await });
        }

        rx
    }
}

async fn wait_for(done: oneshot::Receiver<RoundOutcome>) -> Result<()> {
    match done.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(reason)) => Err(LeaderboardError::Persistence(reason)),
        Err(_) => Err(LeaderboardError::Persistence("flush round ended without a result".into())),
    }
}

/// Fails the round if the driver exits without completing it (e.g. on panic)
struct RoundGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.fail_round("flush round aborted".to_string());
        }
    }
}

impl Shared {
    async fn run_round(&self, generation: u64) {
        let mut guard = RoundGuard { shared: self, armed: true };
        let mut slices = 0usize;
        let mut persisted = 0usize;

        // A record already stored under its natural key (a client retry) is
        // skipped rather than failing the whole slice
        while let Some(batch) = self.next_slice_or_finish() {
            match self.store.bulk_insert(&batch, InsertMode::SkipDuplicates).await {
                Ok(inserted) => {
                    slices += 1;
                    persisted += inserted;
                    self.invalidate(&batch);
                }
                Err(e) => {
                    tracing::error!(
                        "❌ Flush round {} failed after {} record(s): {}",
                        generation,
                        persisted,
                        e
                    );
                    guard.armed = false;
                    self.fail_round(e.to_string());
                    return;
                }
            }
        }

        guard.armed = false;
        tracing::debug!(
            "✅ Flush round {} persisted {} record(s) in {} slice(s) to {}",
            generation,
            persisted,
            slices,
            self.store.name()
        );
    }

    /// Take the next slice, or, when the queue is empty, end the round and
    /// release its waiters under the same lock.
    fn next_slice_or_finish(&self) -> Option<Vec<ScoreRecord>> {
        let waiters = {
            let mut state = self.state.lock();
            if !state.queue.is_empty() {
                let n = state.queue.len().min(self.max_batch_size);
                return Some(state.queue.drain(..n).collect());
            }
            state.flushing = false;
            std::mem::take(&mut state.waiters)
        };

        notify(waiters, Ok(()));
        None
    }

    /// End the round with an error. Queued records are dropped from memory;
    /// they remain in the write-ahead log.
    fn fail_round(&self, reason: String) {
        let (waiters, dropped) = {
            let mut state = self.state.lock();
            let dropped = state.queue.len();
            state.queue.clear();
            state.flushing = false;
            (std::mem::take(&mut state.waiters), dropped)
        };

        if dropped > 0 {
            tracing::warn!("⚠️ {} queued record(s) left to WAL recovery", dropped);
        }
        notify(waiters, Err(reason));
    }

    fn invalidate(&self, batch: &[ScoreRecord]) {
        let games: HashSet<&str> = batch.iter().map(|r| r.game_id.as_str()).collect();
        for game_id in games {
            self.cache.evict_scope(CacheKind::TopKLeaders, &[game_id]);
        }

        let players: HashSet<(&str, &str)> = batch
            .iter()
            .map(|r| (r.game_id.as_str(), r.user_id.as_str()))
            .collect();
        for (game_id, user_id) in players {
            self.cache.evict_scope(CacheKind::UserRank, &[game_id, user_id]);
        }
    }
}

fn notify(waiters: Vec<oneshot::Sender<RoundOutcome>>, outcome: RoundOutcome) {
    for waiter in waiters {
        // Receiver gone means the caller stopped waiting
        let _ = waiter.send(outcome.clone());
    }
}
