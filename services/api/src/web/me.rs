//! services/api/src/web/me.rs
//!
//! The caller's own profile, today's plan, active assignment and open session.

use axum::{extract::State, Json};
use chrono::NaiveDate;
use roma_core::domain::{Assignment, SessionLog, TodayPlan};
use roma_core::services::programs::ProgramDayPlan;
use roma_core::Me;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::web::extract::{ApiQuery, CurrentUser};
use crate::web::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TzQuery {
    pub tz: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

/// GET /me
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Profile with the derived role"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<Me>> {
    Ok(Json(state.services.accounts.me(user.0).await?))
}

/// GET /api/me/today
#[utoipa::path(
    get,
    path = "/api/me/today",
    params(("tz" = Option<String>, Query, description = "IANA time zone")),
    responses((status = 200, description = "Today's program day, empty when none resolves")),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn today_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiQuery(q): ApiQuery<TzQuery>,
) -> ApiResult<Json<TodayPlan>> {
    let history = &state.services.history;
    let tz = history.tz(q.tz.as_deref());
    Ok(Json(history.today_or_empty(user.0, tz).await?))
}

/// GET /api/me/assignment/active
#[utoipa::path(
    get,
    path = "/api/me/assignment/active",
    responses((status = 200, description = "Latest active assignment or null")),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn active_assignment_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<Option<Assignment>>> {
    Ok(Json(state.services.coach.active_assignment(user.0).await?))
}

/// GET /api/me/session/active
#[utoipa::path(
    get,
    path = "/api/me/session/active",
    responses((status = 200, description = "Latest open session or null")),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn active_session_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<Option<SessionLog>>> {
    Ok(Json(state.services.sessions.active_session(user.0).await?))
}

/// GET /api/me/program-day
#[utoipa::path(
    get,
    path = "/api/me/program-day",
    params(("date" = String, Query, description = "Local date, YYYY-MM-DD")),
    responses(
        (status = 200, description = "Program day projected for the date"),
        (status = 404, description = "No day at that slot")
    ),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn program_day_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiQuery(q): ApiQuery<DateQuery>,
) -> ApiResult<Json<ProgramDayPlan>> {
    Ok(Json(state.services.programs.day_for_date(user.0, q.date).await?))
}
