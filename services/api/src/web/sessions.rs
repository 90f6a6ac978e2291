//! services/api/src/web/sessions.rs
//!
//! Workout sessions, the sets logged in them and cardio segments.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use roma_core::domain::{Page, SessionDetail, SessionLog, SetLog, SetPatch};
use roma_core::services::sessions::{CardioInput, SessionUpdate, SetInput, StartSession};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::extract::{ApiJson, ApiPath, ApiQuery, CurrentUser};
use crate::web::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SetQuery {
    pub prescription_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// POST /api/sessions
#[utoipa::path(
    post,
    path = "/api/sessions",
    responses(
        (status = 201, description = "Session opened"),
        (status = 404, description = "Assignment not the caller's or day outside its program")
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn start_session_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(req): ApiJson<StartSession>,
) -> ApiResult<impl IntoResponse> {
    let session = state.services.sessions.start(user.0, req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/sessions/{id}
#[utoipa::path(
    get,
    path = "/api/sessions/{id}",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "Session with its sets and cardio")),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<SessionDetail>> {
    Ok(Json(state.services.sessions.get(user.0, id).await?))
}

/// PATCH /api/sessions/{id}
#[utoipa::path(
    patch,
    path = "/api/sessions/{id}",
    params(("id" = Uuid, Path)),
    responses(
        (status = 200, description = "Session updated"),
        (status = 400, description = "Unknown status")
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn patch_session_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<SessionUpdate>,
) -> ApiResult<Json<SessionLog>> {
    Ok(Json(state.services.sessions.patch(user.0, id, update).await?))
}

/// POST /api/sessions/{id}/sets
#[utoipa::path(
    post,
    path = "/api/sessions/{id}/sets",
    params(("id" = Uuid, Path)),
    responses(
        (status = 201, description = "Set logged"),
        (status = 400, description = "set_index below 1 or negative reps")
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn add_set_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<SetInput>,
) -> ApiResult<impl IntoResponse> {
    let set = state.services.sessions.add_set(user.0, id, input).await?;
    Ok((StatusCode::CREATED, Json(set)))
}

/// GET /api/sessions/{id}/sets
#[utoipa::path(
    get,
    path = "/api/sessions/{id}/sets",
    params(
        ("id" = Uuid, Path),
        ("prescription_id" = Option<Uuid>, Query),
        ("limit" = Option<i64>, Query),
        ("offset" = Option<i64>, Query)
    ),
    responses((status = 200, description = "Sets ordered by prescription and index")),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn list_sets_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(q): ApiQuery<SetQuery>,
) -> ApiResult<Json<Page<SetLog>>> {
    let page = state
        .services
        .sessions
        .list_sets(user.0, id, q.prescription_id, q.limit, q.offset)
        .await?;
    Ok(Json(page))
}

/// PATCH /api/sessions/{id}/sets/{set_id}
#[utoipa::path(
    patch,
    path = "/api/sessions/{id}/sets/{set_id}",
    params(("id" = Uuid, Path), ("set_id" = Uuid, Path)),
    responses((status = 200, description = "Set updated")),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn update_set_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath((id, set_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(patch): ApiJson<SetPatch>,
) -> ApiResult<Json<SetLog>> {
    let set = state
        .services
        .sessions
        .update_set(user.0, id, set_id, patch)
        .await?;
    Ok(Json(set))
}

/// DELETE /api/sessions/{id}/sets/{set_id}
#[utoipa::path(
    delete,
    path = "/api/sessions/{id}/sets/{set_id}",
    params(("id" = Uuid, Path), ("set_id" = Uuid, Path)),
    responses((status = 204, description = "Set deleted")),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn delete_set_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath((id, set_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    state.services.sessions.delete_set(user.0, id, set_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sessions/{id}/cardio
#[utoipa::path(
    post,
    path = "/api/sessions/{id}/cardio",
    params(("id" = Uuid, Path)),
    responses(
        (status = 201, description = "Cardio segment logged"),
        (status = 400, description = "Missing modality, non-positive minutes or inverted HR range")
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn add_cardio_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<CardioInput>,
) -> ApiResult<impl IntoResponse> {
    let segment = state.services.sessions.add_cardio(user.0, id, input).await?;
    Ok((StatusCode::CREATED, Json(segment)))
}
