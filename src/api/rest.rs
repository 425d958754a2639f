// =============================================================================
// REST API Endpoints — Axum 0.8
// =============================================================================
//
// All endpoints live under `/api/v1/`. Health requires no authentication;
// everything else requires a valid Bearer token checked via `AuthBearer`.
//
// CORS is configured permissively for development; tighten `allow_origin`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::errors::TrackerError;
use crate::tracker::{QualityMetricsQuery, QueryWindow};
use crate::types::ComponentScores;
use crate::weights::ReloadOutcome;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/v1/evaluate", post(evaluate))
        .route("/api/v1/evaluations", get(recent_evaluations))
        .route("/api/v1/weights", get(weights))
        .route("/api/v1/weights/reload", post(reload_weights))
        .route("/api/v1/config", get(config))
        .route("/api/v1/quality/stats", get(quality_stats))
        .route("/api/v1/quality/filters", get(filter_effectiveness))
        .route("/api/v1/quality/outcome", post(record_outcome))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

fn error_body(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, Json(body)).into_response()
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    weights_version: u64,
    weights_degraded: bool,
    tracked_evaluations: u64,
    uptime_secs: i64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.weights.snapshot();
    let now = Utc::now();
    Json(HealthResponse {
        status: if snapshot.degraded { "degraded" } else { "ok" },
        state_version: state.current_state_version(),
        weights_version: snapshot.version,
        weights_degraded: snapshot.degraded,
        tracked_evaluations: state.tracker.total_appended(),
        uptime_secs: (now - state.start_time).num_seconds(),
        server_time: now.timestamp_millis(),
    })
}

// =============================================================================
// Evaluation (authenticated)
// =============================================================================

#[derive(Debug, Deserialize)]
struct EvaluateRequest {
    symbol: String,
    /// Defaults to the server time.
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    scores: ComponentScores,
}

async fn evaluate(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(req): Json<EvaluateRequest>,
) -> impl IntoResponse {
    let symbol = req.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "symbol must not be empty");
    }
    let timestamp = req.timestamp.unwrap_or_else(Utc::now);
    let result = state.evaluate_and_track(&symbol, timestamp, &req.scores);
    Json(result).into_response()
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    limit: usize,
}

fn default_recent_limit() -> usize {
    20
}

async fn recent_evaluations(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(q): Query<RecentQuery>,
) -> impl IntoResponse {
    Json(state.recent(q.limit))
}

// =============================================================================
// Weights & config (authenticated)
// =============================================================================

async fn weights(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.weights.snapshot().as_ref().clone())
}

#[derive(Serialize)]
struct ReloadResponse {
    changed: bool,
    version: u64,
    degraded: bool,
}

async fn reload_weights(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    match state.reload_weights() {
        Ok(outcome) => {
            let snapshot = outcome.snapshot();
            let changed = matches!(outcome, ReloadOutcome::Installed(_));
            info!(version = snapshot.version, changed, "weight reload requested via API");
            Json(ReloadResponse {
                changed,
                version: snapshot.version,
                degraded: snapshot.degraded,
            })
            .into_response()
        }
        Err(e) => {
            warn!(error = %e, "weight reload via API rejected");
            error_body(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}

async fn config(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.runtime_config.as_ref().clone())
}

// =============================================================================
// Quality metrics (authenticated)
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct WindowQuery {
    symbol: Option<String>,
    last: Option<usize>,
    since_minutes: Option<i64>,
}

impl WindowQuery {
    fn window(&self) -> QueryWindow {
        match (self.last, self.since_minutes) {
            (Some(n), _) => QueryWindow::Last(n),
            (None, Some(m)) => QueryWindow::Since(Utc::now() - Duration::minutes(m.max(0))),
            (None, None) => QueryWindow::All,
        }
    }
}

async fn quality_stats(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(q): Query<WindowQuery>,
) -> impl IntoResponse {
    let symbol = q.symbol.as_deref().map(|s| s.trim().to_uppercase());
    Json(state.tracker.get_statistics(q.window(), symbol.as_deref()))
}

async fn filter_effectiveness(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(q): Query<WindowQuery>,
) -> impl IntoResponse {
    Json(state.tracker.get_filter_effectiveness(q.window()))
}

#[derive(Debug, Deserialize)]
struct OutcomeRequest {
    evaluation_id: String,
    realized_pnl_pct: f64,
}

async fn record_outcome(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(req): Json<OutcomeRequest>,
) -> impl IntoResponse {
    if !req.realized_pnl_pct.is_finite() {
        return error_body(StatusCode::BAD_REQUEST, "realized_pnl_pct must be finite");
    }
    match state
        .tracker
        .record_outcome(&req.evaluation_id, req.realized_pnl_pct)
    {
        Ok(record) => Json(record).into_response(),
        Err(e @ TrackerError::UnknownEvaluation(_)) => {
            error_body(StatusCode::NOT_FOUND, e.to_string())
        }
        Err(e @ TrackerError::DuplicateOutcome(_)) => {
            error_body(StatusCode::CONFLICT, e.to_string())
        }
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
