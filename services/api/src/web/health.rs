//! services/api/src/web/health.rs
//!
//! Liveness and readiness probes. None of these require a token.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::web::state::AppState;

/// How long the readiness probe waits on the database.
pub const READY_TIMEOUT: Duration = Duration::from_secs(2);

/// GET /healthz
#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "Process is up")),
    tag = "health"
)]
pub async fn healthz_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /readyz
#[utoipa::path(
    get,
    path = "/readyz",
    responses(
        (status = 200, description = "Database reachable"),
        (status = 503, description = "Database unreachable")
    ),
    tag = "health"
)]
pub async fn readyz_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.probe.check(READY_TIMEOUT).await {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        warn!("readiness probe failed: database unreachable");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "db_unreachable" })),
        )
    }
}

/// GET /health/db
#[utoipa::path(
    get,
    path = "/health/db",
    responses((status = 200, description = "`{ok}` with the result of a database ping")),
    tag = "health"
)]
pub async fn health_db_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ok = state.probe.check(READY_TIMEOUT).await;
    Json(json!({ "ok": ok }))
}
