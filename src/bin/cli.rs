use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use leaderboard_engine::{EngineConfig, LeaderboardEngine, ScoreRecord};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "leaderboard-cli")]
#[command(about = "Leaderboard Engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database path
    #[arg(short, long, default_value = "leaderboard.db")]
    db: String,

    /// Write-ahead log path
    #[arg(short, long, default_value = "wal.log")]
    wal: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the write-ahead log into the database
    Recover,

    /// Submit a single score
    Ingest {
        #[arg(long)]
        user: String,

        #[arg(long)]
        game: String,

        #[arg(long)]
        score: i64,

        /// Event time (RFC 3339), defaults to now
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
    },

    /// Show the top scores of a game
    Top {
        game: String,

        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Show a user's rank in a game
    Rank {
        game: String,

        user: String,

        /// Only count scores from the last N hours
        #[arg(short, long)]
        window: Option<u32>,
    },

    /// Show store totals
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = EngineConfig {
        db_path: cli.db.clone(),
        wal_path: cli.wal.clone(),
        ..EngineConfig::from_env()
    };

    // Every command starts the engine, which replays any pending WAL first
    let (engine, report) = LeaderboardEngine::start(config).await?;

    match cli.command {
        Commands::Recover => {
            if report.is_noop() {
                println!("✅ Nothing to recover");
            } else {
                println!("♻️ Recovery finished");
                println!("   Lines: {}", report.lines);
                println!("   Recovered: {}", report.recovered);
                println!("   Skipped: {}", report.skipped.len());
                println!("   Dropped: {}", report.dropped);
                for warning in &report.skipped {
                    println!("   ⚠️ line {}: {}", warning.line_no, warning.reason);
                }
            }
        }

        Commands::Ingest { user, game, score, timestamp } => {
            let record = ScoreRecord::new(user, game, score, timestamp.unwrap_or_else(Utc::now));
            let receipt = engine.ingest(vec![record]).await?;
            println!("✅ {} score(s) persisted", receipt.accepted);
        }

        Commands::Top { game, limit } => {
            let leaders = engine.top_leaders(&game, limit).await?;

            println!("🏆 Top {} for {}:", limit, game);
            for (i, entry) in leaders.iter().enumerate() {
                println!(
                    "   {}. {} - {} ({})",
                    i + 1,
                    entry.user_id,
                    entry.score,
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        Commands::Rank { game, user, window } => {
            let rank = engine.user_rank(&game, &user, window).await?;

            println!("📊 {} in {}:", user, game);
            println!("   Rank: {} / {}", rank.rank, rank.total_players);
            println!("   Percentile: {:.2}", rank.percentile);
        }

        Commands::Stats => {
            println!("📊 Store Statistics:");
            println!("   Total scores: {}", engine.total_scores().await?);
        }
    }

    engine.shutdown().await?;
    Ok(())
}
