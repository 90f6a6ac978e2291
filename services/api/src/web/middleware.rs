//! services/api/src/web/middleware.rs
//!
//! Authentication, coach-guard and request-logging middleware.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::extract::{ApiPath, CurrentUser};
use crate::web::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Validates the `Authorization: Bearer` access token and inserts the caller as `CurrentUser`.
///
/// Preflight `OPTIONS` requests pass through untouched.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if req.method() == Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError::Unauthorized("unauthorized"))?;

    let user_id = state.jwt.access_user(token)?;
    req.extensions_mut().insert(CurrentUser(user_id));
    Ok(next.run(req).await)
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Rejects the request with 403 unless the caller can coach the disciple named by the `{id}`
/// path segment. Must run inside `require_auth`.
pub async fn coach_guard(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(params): ApiPath<HashMap<String, String>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let disciple_id = params
        .get("id")
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| ApiError::BadRequest("invalid disciple id".to_string()))?;
    if !state.services.coach.can_coach(user.0, disciple_id).await? {
        return Err(roma_core::PortError::Forbidden("not_coach_of_disciple".to_string()).into());
    }
    Ok(next.run(req).await)
}

/// Propagates or assigns an `X-Request-ID`, runs the request inside a span carrying it and
/// emits one access log line per request.
pub async fn request_log(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let span = tracing::info_span!("request", request_id = %request_id);
    let mut response = next.run(req).instrument(span).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        request_id = %request_id,
        "request completed"
    );
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
