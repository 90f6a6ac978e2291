//! services/api/src/web/programs.rs
//!
//! Programs and their tree of weeks, days and prescriptions.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use roma_core::domain::{
    DayPatch, NewDay, NewPrescription, NewProgram, Page, Prescription, PrescriptionPatch,
    PrescriptionView, Program, ProgramDay, ProgramPatch, ProgramVersion, ProgramWeek,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::extract::{ApiJson, ApiPath, ApiQuery, CurrentUser};
use crate::web::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ProgramQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NewWeekRequest {
    pub week_index: i32,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ids: Vec<Uuid>,
}

//=========================================================================================
// Programs
//=========================================================================================

/// POST /api/programs
#[utoipa::path(
    post,
    path = "/api/programs",
    responses((status = 201, description = "Program created at version 1"), (status = 400, description = "Title too short")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn create_program_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(input): ApiJson<NewProgram>,
) -> ApiResult<impl IntoResponse> {
    let program = state.services.programs.create(user.0, input).await?;
    Ok((StatusCode::CREATED, Json(program)))
}

/// GET /api/programs
#[utoipa::path(
    get,
    path = "/api/programs",
    params(
        ("q" = Option<String>, Query, description = "Title filter"),
        ("limit" = Option<i64>, Query),
        ("offset" = Option<i64>, Query)
    ),
    responses((status = 200, description = "The caller's programs, newest first")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn list_programs_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiQuery(q): ApiQuery<ProgramQuery>,
) -> ApiResult<Json<Page<Program>>> {
    let page = state
        .services
        .programs
        .list_mine(user.0, q.q, q.limit, q.offset)
        .await?;
    Ok(Json(page))
}

/// GET /api/programs/{id}
#[utoipa::path(
    get,
    path = "/api/programs/{id}",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "The program"), (status = 404, description = "Unknown or not visible")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn get_program_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Program>> {
    Ok(Json(state.services.programs.get(user.0, id).await?))
}

/// PUT /api/programs/{id}
#[utoipa::path(
    put,
    path = "/api/programs/{id}",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "Program updated"), (status = 404, description = "Not the owner")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn update_program_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<ProgramPatch>,
) -> ApiResult<Json<Program>> {
    Ok(Json(state.services.programs.update(user.0, id, patch).await?))
}

/// DELETE /api/programs/{id}
#[utoipa::path(
    delete,
    path = "/api/programs/{id}",
    params(("id" = Uuid, Path)),
    responses((status = 204, description = "Program and its tree deleted"), (status = 409, description = "Still assigned")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn delete_program_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    state.services.programs.delete(user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/programs/{id}/version
#[utoipa::path(
    post,
    path = "/api/programs/{id}/version",
    params(("id" = Uuid, Path)),
    responses((status = 201, description = "The cloned program at version + 1")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn new_version_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let program = state.services.programs.new_version(user.0, id).await?;
    Ok((StatusCode::CREATED, Json(program)))
}

/// GET /api/programs/{id}/versions
#[utoipa::path(
    get,
    path = "/api/programs/{id}/versions",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "Version snapshots, newest first")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn list_versions_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<ProgramVersion>>> {
    Ok(Json(state.services.programs.list_versions(user.0, id).await?))
}

//=========================================================================================
// Weeks & Days
//=========================================================================================

/// POST /api/programs/{id}/weeks
#[utoipa::path(
    post,
    path = "/api/programs/{id}/weeks",
    params(("id" = Uuid, Path)),
    responses((status = 201, description = "Week added"), (status = 409, description = "Week index taken")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn add_week_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<NewWeekRequest>,
) -> ApiResult<impl IntoResponse> {
    let week = state
        .services
        .programs
        .add_week(user.0, id, req.week_index)
        .await?;
    Ok((StatusCode::CREATED, Json(week)))
}

/// GET /api/programs/{id}/weeks
#[utoipa::path(
    get,
    path = "/api/programs/{id}/weeks",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "Weeks by index")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn list_weeks_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<ProgramWeek>>> {
    Ok(Json(state.services.programs.list_weeks(user.0, id).await?))
}

/// DELETE /api/programs/{id}/weeks/{week_id}
#[utoipa::path(
    delete,
    path = "/api/programs/{id}/weeks/{week_id}",
    params(("id" = Uuid, Path), ("week_id" = Uuid, Path)),
    responses((status = 204, description = "Week and its days deleted")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn delete_week_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath((id, week_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    state.services.programs.delete_week(user.0, id, week_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/programs/{id}/weeks/{week_id}/days
#[utoipa::path(
    post,
    path = "/api/programs/{id}/weeks/{week_id}/days",
    params(("id" = Uuid, Path), ("week_id" = Uuid, Path)),
    responses((status = 201, description = "Day added"), (status = 409, description = "Day index taken")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn add_day_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath((id, week_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(input): ApiJson<NewDay>,
) -> ApiResult<impl IntoResponse> {
    let day = state
        .services
        .programs
        .add_day(user.0, id, week_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(day)))
}

/// GET /api/programs/{id}/weeks/{week_id}/days
#[utoipa::path(
    get,
    path = "/api/programs/{id}/weeks/{week_id}/days",
    params(("id" = Uuid, Path), ("week_id" = Uuid, Path)),
    responses((status = 200, description = "Days ordered by (day_index, id)")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn list_days_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath((id, week_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<Json<Vec<ProgramDay>>> {
    Ok(Json(state.services.programs.list_days(user.0, id, week_id).await?))
}

/// PUT /api/programs/days/{day_id}
#[utoipa::path(
    put,
    path = "/api/programs/days/{day_id}",
    params(("day_id" = Uuid, Path)),
    responses((status = 200, description = "Day updated")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn update_day_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(day_id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<DayPatch>,
) -> ApiResult<Json<ProgramDay>> {
    Ok(Json(state.services.programs.update_day(user.0, day_id, patch).await?))
}

/// DELETE /api/programs/days/{day_id}
#[utoipa::path(
    delete,
    path = "/api/programs/days/{day_id}",
    params(("day_id" = Uuid, Path)),
    responses((status = 204, description = "Day and its prescriptions deleted")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn delete_day_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(day_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    state.services.programs.delete_day(user.0, day_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Prescriptions
//=========================================================================================

/// POST /api/programs/days/{day_id}/prescriptions
#[utoipa::path(
    post,
    path = "/api/programs/days/{day_id}/prescriptions",
    params(("day_id" = Uuid, Path)),
    responses((status = 201, description = "Prescription added"), (status = 400, description = "Series below 1")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn add_prescription_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(day_id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<NewPrescription>,
) -> ApiResult<impl IntoResponse> {
    let rx = state
        .services
        .programs
        .add_prescription(user.0, day_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(rx)))
}

/// GET /api/programs/days/{day_id}/prescriptions
#[utoipa::path(
    get,
    path = "/api/programs/days/{day_id}/prescriptions",
    params(("day_id" = Uuid, Path)),
    responses((status = 200, description = "Prescriptions with exercise metadata, by position")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn list_prescriptions_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(day_id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<PrescriptionView>>> {
    Ok(Json(
        state.services.programs.list_prescriptions(user.0, day_id).await?,
    ))
}

/// PUT /api/programs/prescriptions/{id}
#[utoipa::path(
    put,
    path = "/api/programs/prescriptions/{id}",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "Prescription updated"), (status = 400, description = "Empty patch")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn update_prescription_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<PrescriptionPatch>,
) -> ApiResult<Json<Prescription>> {
    Ok(Json(
        state.services.programs.update_prescription(user.0, id, patch).await?,
    ))
}

/// DELETE /api/programs/prescriptions/{id}
#[utoipa::path(
    delete,
    path = "/api/programs/prescriptions/{id}",
    params(("id" = Uuid, Path)),
    responses((status = 204, description = "Deleted")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn delete_prescription_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    state.services.programs.delete_prescription(user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/programs/days/{day_id}/prescriptions/reorder
#[utoipa::path(
    patch,
    path = "/api/programs/days/{day_id}/prescriptions/reorder",
    params(("day_id" = Uuid, Path)),
    responses((status = 200, description = "Prescriptions in their new order")),
    security(("bearer" = [])),
    tag = "programs"
)]
pub async fn reorder_prescriptions_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(day_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ReorderRequest>,
) -> ApiResult<Json<Vec<PrescriptionView>>> {
    Ok(Json(
        state
            .services
            .programs
            .reorder_prescriptions(user.0, day_id, req.ids)
            .await?,
    ))
}
