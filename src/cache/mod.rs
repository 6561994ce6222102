pub mod ttl;

use serde::Serialize;

pub use ttl::TtlCache;

/// Query families cached by the ranking engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKind {
    /// Top-K leaders of a game, args `[game_id, limit]`
    TopKLeaders,
    /// Rank of a user in a game, args `[game_id, user_id, window]`
    UserRank,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::TopKLeaders => "top-k-leaders",
            CacheKind::UserRank => "user-rank",
        }
    }
}

/// Cache key: operation type plus argument tuple.
///
/// Compared structurally, so `["a,b"]` and `["a", "b"]` never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: CacheKind,
    pub args: Vec<String>,
}

impl CacheKey {
    pub fn new<S: AsRef<str>>(kind: CacheKind, args: &[S]) -> Self {
        Self {
            kind,
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
        }
    }

    /// Whether this key falls under `scope` (same kind, args start with `scope`)
    pub fn in_scope<S: AsRef<str>>(&self, kind: CacheKind, scope: &[S]) -> bool {
        self.kind == kind
            && self.args.len() >= scope.len()
            && self.args.iter().zip(scope).all(|(a, s)| a == s.as_ref())
    }

    /// Proper, non-empty scopes this key belongs to: `[a]`, `[a, b]`, ...
    pub fn scopes(&self) -> impl Iterator<Item = CacheKey> + '_ {
        (1..self.args.len()).map(move |n| CacheKey {
            kind: self.kind,
            args: self.args[..n].to_vec(),
        })
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_structural() {
        let joined = CacheKey::new(CacheKind::UserRank, &["a,b"]);
        let split = CacheKey::new(CacheKind::UserRank, &["a", "b"]);
        assert_ne!(joined, split);
    }

    #[test]
    fn test_key_kind_matters() {
        let top = CacheKey::new(CacheKind::TopKLeaders, &["game1"]);
        let rank = CacheKey::new(CacheKind::UserRank, &["game1"]);
        assert_ne!(top, rank);
    }

    #[test]
    fn test_in_scope() {
        let key = CacheKey::new(CacheKind::UserRank, &["game1", "user1", "all"]);
        assert!(key.in_scope(CacheKind::UserRank, &["game1"]));
        assert!(key.in_scope(CacheKind::UserRank, &["game1", "user1"]));
        assert!(!key.in_scope(CacheKind::UserRank, &["game1", "user2"]));
        assert!(!key.in_scope(CacheKind::TopKLeaders, &["game1"]));
        assert!(!key.in_scope(CacheKind::UserRank, &["game1", "user1", "all", "extra"]));
    }

    #[test]
    fn test_scopes() {
        let key = CacheKey::new(CacheKind::UserRank, &["game1", "user1", "all"]);
        let scopes: Vec<CacheKey> = key.scopes().collect();
        assert_eq!(
            scopes,
            vec![
                CacheKey::new(CacheKind::UserRank, &["game1"]),
                CacheKey::new(CacheKind::UserRank, &["game1", "user1"]),
            ]
        );
        assert!(scopes.iter().all(|scope| key.in_scope(scope.kind, scope.args.as_slice())));
    }
}
