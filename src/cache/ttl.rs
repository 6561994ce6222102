use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};

use crate::cache::{CacheKey, CacheKind, CacheStats};

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Scope prefix -> live keys under it
    index: HashMap<CacheKey, HashSet<CacheKey>>,
    /// Scope (or exact key) -> sequence of its latest invalidation, kept only
    /// while a read ticket older than that invalidation is open
    invalidated: HashMap<CacheKey, u64>,
    /// Issue sequence of open read tickets -> count
    open_tickets: BTreeMap<u64, usize>,
    sequence: u64,
    cleared_at: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Inner {
    fn insert(&mut self, key: CacheKey, entry: CacheEntry) {
        for scope in key.scopes() {
            self.index.entry(scope).or_default().insert(key.clone());
        }
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: &CacheKey) -> bool {
        if self.entries.remove(key).is_none() {
            return false;
        }
        for scope in key.scopes() {
            if let Some(keys) = self.index.get_mut(&scope) {
                keys.remove(key);
                if keys.is_empty() {
                    self.index.remove(&scope);
                }
            }
        }
        true
    }

    /// Record an invalidation of `scope` for the tickets still open
    fn mark_invalidated(&mut self, scope: CacheKey) {
        self.sequence += 1;
        if !self.open_tickets.is_empty() {
            self.invalidated.insert(scope, self.sequence);
        }
    }

    fn invalidated_since(&self, key: &CacheKey, issued: u64) -> bool {
        if self.cleared_at > issued {
            return true;
        }
        (0..=key.args.len()).any(|n| {
            let scope = CacheKey {
                kind: key.kind,
                args: key.args[..n].to_vec(),
            };
            self.invalidated.get(&scope).is_some_and(|seq| *seq > issued)
        })
    }
}

/// In-memory TTL cache for leaderboard queries
///
/// Values of any serializable type are stored as JSON. The cache never fails:
/// a value that cannot be encoded is not stored and a value that cannot be
/// decoded as the requested type is reported as a miss.
#[derive(Default)]
pub struct TtlCache {
    inner: Mutex<Inner>,
}

/// Permission to fill one cache entry with the result of a store read.
///
/// Take the ticket before reading the store. If the entry's scope is
/// invalidated while the read runs, [`ReadTicket::fill`] stores nothing, so a
/// snapshot taken before a write never outlives that write's invalidation.
pub struct ReadTicket<'a> {
    cache: &'a TtlCache,
    key: CacheKey,
    issued: u64,
}

impl ReadTicket<'_> {
    /// Store `value` unless the entry was invalidated since the ticket was issued
    pub fn fill<T: Serialize>(self, value: &T, ttl: Duration) -> bool {
        let Some(entry) = encode(self.key.kind, value, ttl) else {
            return false;
        };

        let mut inner = self.cache.inner.lock();
        if inner.invalidated_since(&self.key, self.issued) {
            return false;
        }
        inner.insert(self.key.clone(), entry);
        true
    }
}

impl Drop for ReadTicket<'_> {
    fn drop(&mut self) {
        let mut inner = self.cache.inner.lock();
        if let Some(count) = inner.open_tickets.get_mut(&self.issued) {
            *count -= 1;
            if *count == 0 {
                inner.open_tickets.remove(&self.issued);
            }
        }

        // Marks at or below the oldest open ticket can no longer reject anything
        match inner.open_tickets.keys().next().copied() {
            Some(oldest) => inner.invalidated.retain(|_, seq| *seq > oldest),
            None => inner.invalidated.clear(),
        }
    }
}

fn encode<T: Serialize>(kind: CacheKind, value: &T, ttl: Duration) -> Option<CacheEntry> {
    match serde_json::to_value(value) {
        Ok(value) => Some(CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        }),
        Err(e) => {
            tracing::warn!("Failed to encode {} cache entry: {}", kind.as_str(), e);
            None
        }
    }
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `(kind, args)` until `ttl` elapses
    pub fn set<T, S>(&self, kind: CacheKind, args: &[S], value: &T, ttl: Duration)
    where
        T: Serialize,
        S: AsRef<str>,
    {
        if let Some(entry) = encode(kind, value, ttl) {
            self.inner.lock().insert(CacheKey::new(kind, args), entry);
        }
    }

    /// Start a read-through fill of `(kind, args)`
    pub fn ticket<S: AsRef<str>>(&self, kind: CacheKind, args: &[S]) -> ReadTicket<'_> {
        let mut inner = self.inner.lock();
        let issued = inner.sequence;
        *inner.open_tickets.entry(issued).or_insert(0) += 1;

        ReadTicket {
            cache: self,
            key: CacheKey::new(kind, args),
            issued,
        }
    }

    /// Fetch a live entry; expired entries are removed and reported as absent
    pub fn get<T, S>(&self, kind: CacheKind, args: &[S]) -> Option<T>
    where
        T: DeserializeOwned,
        S: AsRef<str>,
    {
        let key = CacheKey::new(kind, args);
        let mut inner = self.inner.lock();

        let now = Instant::now();
        let expired = inner
            .entries
            .get(&key)
            .is_some_and(|entry| now >= entry.expires_at);
        if expired {
            inner.remove(&key);
        }

        let value = inner.entries.get(&key).map(|entry| entry.value.clone());

        let decoded = value.and_then(|v| serde_json::from_value(v).ok());
        if decoded.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        decoded
    }

    /// Remove the entry at exactly `(kind, args)`
    pub fn evict<S: AsRef<str>>(&self, kind: CacheKind, args: &[S]) -> bool {
        let key = CacheKey::new(kind, args);
        let mut inner = self.inner.lock();
        let removed = inner.remove(&key);
        if removed {
            inner.evictions += 1;
        }
        inner.mark_invalidated(key);
        removed
    }

    /// Remove every entry of `kind` whose arguments start with `scope`
    pub fn evict_scope<S: AsRef<str>>(&self, kind: CacheKind, scope: &[S]) -> usize {
        let scope = CacheKey::new(kind, scope);
        let mut inner = self.inner.lock();

        let mut keys: Vec<CacheKey> = if scope.args.is_empty() {
            inner
                .entries
                .keys()
                .filter(|key| key.in_scope(kind, scope.args.as_slice()))
                .cloned()
                .collect()
        } else {
            inner
                .index
                .get(&scope)
                .map(|keys| keys.iter().cloned().collect())
                .unwrap_or_default()
        };
        if !scope.args.is_empty() && inner.entries.contains_key(&scope) {
            keys.push(scope.clone());
        }

        let removed = keys.iter().filter(|key| inner.remove(key)).count();
        inner.evictions += removed as u64;
        inner.mark_invalidated(scope);
        removed
    }

    /// Drop all expired entries
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| now >= entry.expires_at)
            .map(|(key, _)| key.clone())
            .collect();

        expired.iter().filter(|key| inner.remove(key)).count()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.index.clear();
        inner.sequence += 1;
        inner.cleared_at = inner.sequence;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len() as u64,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}
