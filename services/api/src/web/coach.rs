//! services/api/src/web/coach.rs
//!
//! Coach–disciple links, program assignments and the per-disciple coach views.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::NaiveDate;
use roma_core::calendar::CalendarDay;
use roma_core::domain::{
    Assignment, AssignmentDay, AssignmentPatch, AssignmentSummary, CoachLink, Disciple, LinkAction,
    LinkLists, Page, TodayPlan,
};
use roma_core::history::DEFAULT_WINDOW_DAYS;
use roma_core::services::coach::{AssignProgram, Overview};
use roma_core::PortError;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::extract::{ApiJson, ApiPath, ApiQuery, CurrentUser};
use crate::web::me::TzQuery;
use crate::web::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateLinkRequest {
    /// Defaults to the caller, which makes an accepted self-link.
    pub disciple_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct LinkActionRequest {
    pub action: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignmentQuery {
    pub disciple_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OverviewQuery {
    pub days: Option<i64>,
    pub tz: Option<String>,
}

//=========================================================================================
// Links
//=========================================================================================

/// POST /api/coach/links
#[utoipa::path(
    post,
    path = "/api/coach/links",
    responses((status = 201, description = "Link created or the existing one returned")),
    security(("bearer" = [])),
    tag = "coach"
)]
pub async fn create_link_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CreateLinkRequest>,
) -> ApiResult<impl IntoResponse> {
    let disciple_id = req.disciple_id.unwrap_or(user.0);
    let link = state
        .services
        .coach
        .create_link(user.0, disciple_id, false)
        .await?;
    Ok((StatusCode::CREATED, Json(link)))
}

/// PATCH /api/coach/links/{id}
#[utoipa::path(
    patch,
    path = "/api/coach/links/{id}",
    params(("id" = Uuid, Path)),
    responses(
        (status = 200, description = "Link accepted or rejected"),
        (status = 400, description = "Unknown action"),
        (status = 403, description = "Caller is not the link's disciple"),
        (status = 409, description = "Link is not pending")
    ),
    security(("bearer" = [])),
    tag = "coach"
)]
pub async fn update_link_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<LinkActionRequest>,
) -> ApiResult<Json<CoachLink>> {
    let action = LinkAction::parse(&req.action)
        .ok_or_else(|| PortError::Validation("invalid_action".to_string()))?;
    let link = state
        .services
        .coach
        .update_link_status(user.0, id, action)
        .await?;
    Ok(Json(link))
}

/// GET /api/coach/links
#[utoipa::path(
    get,
    path = "/api/coach/links",
    responses((status = 200, description = "Incoming and outgoing links")),
    security(("bearer" = [])),
    tag = "coach"
)]
pub async fn list_links_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<LinkLists>> {
    Ok(Json(state.services.coach.list_links(user.0).await?))
}

/// GET /api/coach/disciples
#[utoipa::path(
    get,
    path = "/api/coach/disciples",
    responses((status = 200, description = "Accepted disciples by name")),
    security(("bearer" = [])),
    tag = "coach"
)]
pub async fn list_disciples_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<Disciple>>> {
    Ok(Json(state.services.coach.list_disciples(user.0).await?))
}

//=========================================================================================
// Assignments
//=========================================================================================

/// POST /api/coach/assignments
#[utoipa::path(
    post,
    path = "/api/coach/assignments",
    responses(
        (status = 201, description = "Assignment created and activated"),
        (status = 403, description = "Caller cannot coach the disciple")
    ),
    security(("bearer" = [])),
    tag = "coach"
)]
pub async fn assign_program_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(req): ApiJson<AssignProgram>,
) -> ApiResult<impl IntoResponse> {
    let assignment = state.services.coach.assign_program(user.0, req).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// GET /api/coach/assignments
#[utoipa::path(
    get,
    path = "/api/coach/assignments",
    params(
        ("disciple_id" = Option<Uuid>, Query),
        ("limit" = Option<i64>, Query),
        ("offset" = Option<i64>, Query)
    ),
    responses((status = 200, description = "Assignments with program and disciple names")),
    security(("bearer" = [])),
    tag = "coach"
)]
pub async fn list_assignments_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiQuery(q): ApiQuery<AssignmentQuery>,
) -> ApiResult<Json<Page<AssignmentSummary>>> {
    let page = state
        .services
        .coach
        .list_assignments(user.0, q.disciple_id, q.limit, q.offset)
        .await?;
    Ok(Json(page))
}

/// PATCH /api/coach/assignments/{id}
#[utoipa::path(
    patch,
    path = "/api/coach/assignments/{id}",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "Assignment updated"), (status = 404, description = "Not visible")),
    security(("bearer" = [])),
    tag = "coach"
)]
pub async fn update_assignment_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<AssignmentPatch>,
) -> ApiResult<Json<Assignment>> {
    Ok(Json(
        state.services.coach.update_assignment(user.0, id, patch).await?,
    ))
}

/// GET /api/coach/assignments/{id}/calendar
#[utoipa::path(
    get,
    path = "/api/coach/assignments/{id}/calendar",
    params(
        ("id" = Uuid, Path),
        ("from" = Option<NaiveDate>, Query),
        ("to" = Option<NaiveDate>, Query)
    ),
    responses((status = 200, description = "Program days cycled over the date range")),
    security(("bearer" = [])),
    tag = "coach"
)]
pub async fn assignment_calendar_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(q): ApiQuery<CalendarQuery>,
) -> ApiResult<Json<Vec<CalendarDay>>> {
    let days = state
        .services
        .coach
        .assignment_calendar(user.0, id, q.from, q.to)
        .await?;
    Ok(Json(days))
}

/// GET /api/assignments/{id}/days
#[utoipa::path(
    get,
    path = "/api/assignments/{id}/days",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "Program days with prescription and session counts")),
    security(("bearer" = [])),
    tag = "coach"
)]
pub async fn assignment_days_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<AssignmentDay>>> {
    Ok(Json(state.services.coach.assignment_days(user.0, id).await?))
}

//=========================================================================================
// Disciple views (behind the coach guard)
//=========================================================================================

/// POST /api/coach/disciples/{id}/assignments/{assignment_id}/activate
#[utoipa::path(
    post,
    path = "/api/coach/disciples/{id}/assignments/{assignment_id}/activate",
    params(("id" = Uuid, Path), ("assignment_id" = Uuid, Path)),
    responses((status = 200, description = "The disciple's only active assignment")),
    security(("bearer" = [])),
    tag = "coach"
)]
pub async fn activate_assignment_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath((disciple_id, assignment_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<Json<Assignment>> {
    let assignment = state
        .services
        .coach
        .activate_assignment(user.0, disciple_id, assignment_id)
        .await?;
    Ok(Json(assignment))
}

/// GET /api/coach/disciples/{id}/today
#[utoipa::path(
    get,
    path = "/api/coach/disciples/{id}/today",
    params(("id" = Uuid, Path), ("tz" = Option<String>, Query)),
    responses((status = 200, description = "The disciple's plan for today"), (status = 403, description = "Not a coach of the disciple")),
    security(("bearer" = [])),
    tag = "coach"
)]
pub async fn disciple_today_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(disciple_id): ApiPath<Uuid>,
    ApiQuery(q): ApiQuery<TzQuery>,
) -> ApiResult<Json<TodayPlan>> {
    let tz = state.services.history.tz(q.tz.as_deref());
    let plan = state
        .services
        .coach
        .today_for_disciple(user.0, disciple_id, tz)
        .await?;
    Ok(Json(plan))
}

/// GET /api/coach/disciples/{id}/overview
#[utoipa::path(
    get,
    path = "/api/coach/disciples/{id}/overview",
    params(
        ("id" = Uuid, Path),
        ("days" = Option<i64>, Query, description = "Window length, 14 by default"),
        ("tz" = Option<String>, Query)
    ),
    responses((status = 200, description = "Today, volume pivot and adherence")),
    security(("bearer" = [])),
    tag = "coach"
)]
pub async fn disciple_overview_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(disciple_id): ApiPath<Uuid>,
    ApiQuery(q): ApiQuery<OverviewQuery>,
) -> ApiResult<Json<Overview>> {
    let tz = state.services.history.tz(q.tz.as_deref());
    let overview = state
        .services
        .coach
        .overview(user.0, disciple_id, q.days.unwrap_or(DEFAULT_WINDOW_DAYS), tz)
        .await?;
    Ok(Json(overview))
}
