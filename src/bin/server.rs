use axum::{
    extract::{rejection::JsonRejection, Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leaderboard_engine::{
    CacheStats, EngineConfig, LeaderEntry, LeaderboardEngine, LeaderboardError, ScoreRecord, UserRank,
};

/// Largest batch accepted in one request
const MAX_BATCH: usize = 1000;

#[derive(Clone)]
struct AppState {
    engine: Arc<LeaderboardEngine>,
}

/// A single score or a batch of scores
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScorePayload {
    Batch(Vec<ScoreRecord>),
    Single(ScoreRecord),
}

impl ScorePayload {
    fn into_records(self) -> Vec<ScoreRecord> {
        match self {
            ScorePayload::Batch(records) => records,
            ScorePayload::Single(record) => vec![record],
        }
    }
}

#[derive(Debug, Deserialize)]
struct LeadersParams {
    limit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RankParams {
    window: Option<String>,
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    score: IngestSummary,
}

#[derive(Debug, Serialize)]
struct IngestSummary {
    accepted: usize,
    message: String,
}

#[derive(Debug, Serialize)]
struct LeadersResponse {
    leaders: Vec<LeaderEntry>,
}

#[derive(Debug, Serialize)]
struct RankResponse {
    user: UserRank,
}

#[derive(Debug, Serialize)]
struct RootResponse {
    message: String,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    cache: CacheStats,
    pending: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: u16,
    message: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leaderboard_server=debug,leaderboard_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env();
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8000);

    tracing::info!("🚀 Starting Leaderboard Server");
    tracing::info!("📦 Database: {}", config.db_path);
    tracing::info!("📝 WAL: {}", config.wal_path.display());
    tracing::info!("🔌 Port: {}", port);

    // Recovery runs before the listener is bound
    let (engine, report) = LeaderboardEngine::start(config).await?;
    if !report.is_noop() {
        tracing::info!(
            "♻️ Recovery: {} line(s), {} recovered, {} skipped, {} dropped",
            report.lines,
            report.recovered,
            report.skipped.len(),
            report.dropped
        );
    }

    let engine = Arc::new(engine);
    spawn_cache_janitor(Arc::clone(&engine));

    let state = AppState {
        engine: Arc::clone(&engine),
    };

    // Build router
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/v1/score", post(ingest_handler))
        .route("/api/v1/games/:game_id/leaders", get(leaders_handler))
        .route("/api/v1/games/:game_id/users/:user_id/rank", get(rank_handler))
        .route("/api/v1/stats", get(stats_handler))
        .fallback(not_found_handler)
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("🎮 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("🛑 Shutdown requested");
}

fn spawn_cache_janitor(engine: Arc<LeaderboardEngine>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let purged = engine.purge_cache();
            if purged > 0 {
                tracing::debug!("🧹 Purged {} expired cache entries", purged);
            }
        }
    });
}

async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Server is up and running".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: leaderboard_engine::VERSION.to_string(),
    })
}

async fn ingest_handler(
    State(state): State<AppState>,
    payload: Result<Json<ScorePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let Json(payload) = payload
        .map_err(|e| LeaderboardError::Validation(format!("Invalid score data: {}", e.body_text())))?;

    let records = payload.into_records();
    if records.len() > MAX_BATCH {
        return Err(LeaderboardError::Validation(format!(
            "Batch of {} exceeds the maximum of {} scores",
            records.len(),
            MAX_BATCH
        ))
        .into());
    }

    let receipt = state.engine.ingest(records).await?;
    tracing::info!("✅ {} score(s) ingested", receipt.accepted);

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            score: IngestSummary {
                accepted: receipt.accepted,
                message: format!("{} score(s) successfully processed.", receipt.accepted),
            },
        }),
    ))
}

async fn leaders_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Query(params): Query<LeadersParams>,
) -> Result<Json<LeadersResponse>, AppError> {
    // Unparsable or missing limits fall back to the configured default
    let limit = params
        .limit
        .and_then(|l| l.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let leaders = state.engine.top_leaders(game_id.trim(), limit).await?;
    Ok(Json(LeadersResponse { leaders }))
}

async fn rank_handler(
    State(state): State<AppState>,
    Path((game_id, user_id)): Path<(String, String)>,
    Query(params): Query<RankParams>,
) -> Result<Json<RankResponse>, AppError> {
    let window = params.window.and_then(|w| w.trim().parse::<u32>().ok());

    let user = state
        .engine
        .user_rank(game_id.trim(), user_id.trim(), window)
        .await?;
    Ok(Json(RankResponse { user }))
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        cache: state.engine.cache_stats(),
        pending: state.engine.pending(),
    })
}

async fn not_found_handler() -> AppError {
    AppError(LeaderboardError::NotFound("Route Not Found".to_string()))
}

// Error handling
struct AppError(LeaderboardError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            LeaderboardError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            LeaderboardError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            e => {
                tracing::error!("❌ Error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        tracing::debug!("{} - {}", status, message);

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody {
                    status: status.as_u16(),
                    message,
                },
            }),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<LeaderboardError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
