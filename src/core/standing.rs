use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of a top-K leaderboard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderEntry {
    pub user_id: String,
    pub score: i64,
    pub timestamp: DateTime<Utc>,
}

/// Raw position of a user inside a (possibly windowed) leaderboard,
/// as returned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankPosition {
    /// Standard competition rank (1-based)
    pub rank: u64,
    /// Number of records in the restricted set
    pub total_players: u64,
}

/// Rank and percentile of a user, as served to clients
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UserRank {
    pub rank: u64,
    pub percentile: f64,
    pub total_players: u64,
}

impl From<RankPosition> for UserRank {
    fn from(pos: RankPosition) -> Self {
        Self {
            rank: pos.rank,
            percentile: percentile(pos.rank, pos.total_players),
            total_players: pos.total_players,
        }
    }
}

/// Percentile of `rank` among `total_players`, rounded to two decimals.
///
/// `(total - rank) / max(total - 1, 1) * 100`. An empty set reports 100.00 and a
/// single player reports 0.00.
pub fn percentile(rank: u64, total_players: u64) -> f64 {
    if total_players == 0 {
        return 100.0;
    }

    let above = total_players.saturating_sub(rank) as f64;
    let denominator = total_players.saturating_sub(1).max(1) as f64;
    round2(above / denominator * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Standard competition rank of `score` among `scores`:
/// one plus the number of strictly better scores.
pub fn competition_rank<I>(score: i64, scores: I) -> u64
where
    I: IntoIterator<Item = i64>,
{
    1 + scores.into_iter().filter(|other| *other > score).count() as u64
}
