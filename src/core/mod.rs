pub mod score;
pub mod standing;

pub use score::{ScoreRecord, StoredScore};
pub use standing::{LeaderEntry, RankPosition, UserRank, percentile, competition_rank};
