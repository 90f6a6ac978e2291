//! services/api/src/web/exercises.rs
//!
//! The shared exercise catalog.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use roma_core::domain::{Exercise, ExerciseFilter, ExerciseInput, Page, TagMatch};
use roma_core::services::{page_limit, page_offset};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::extract::{ApiJson, ApiPath, ApiQuery};
use crate::web::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ExerciseQuery {
    pub q: Option<String>,
    pub muscle: Option<String>,
    pub equipment: Option<String>,
    /// Comma separated.
    pub tags: Option<String>,
    #[serde(rename = "match")]
    pub tag_match: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ExerciseQuery {
    fn into_filter(self) -> ExerciseFilter {
        let tags = self
            .tags
            .map(|raw| raw.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        let tag_match = match self.tag_match.as_deref().map(str::trim) {
            Some(m) if m.eq_ignore_ascii_case("all") => TagMatch::All,
            _ => TagMatch::Any,
        };
        ExerciseFilter {
            query: self.q,
            muscle: self.muscle,
            equipment: self.equipment,
            tags,
            tag_match,
            limit: page_limit(self.limit),
            offset: page_offset(self.offset),
        }
    }
}

/// GET /api/exercises
#[utoipa::path(
    get,
    path = "/api/exercises",
    params(
        ("q" = Option<String>, Query, description = "Matches name or primary muscle"),
        ("muscle" = Option<String>, Query),
        ("equipment" = Option<String>, Query),
        ("tags" = Option<String>, Query, description = "Comma separated tags"),
        ("match" = Option<String>, Query, description = "any (default) or all"),
        ("limit" = Option<i64>, Query),
        ("offset" = Option<i64>, Query)
    ),
    responses((status = 200, description = "Page of exercises sorted by name")),
    security(("bearer" = [])),
    tag = "exercises"
)]
pub async fn list_exercises_handler(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<ExerciseQuery>,
) -> ApiResult<Json<Page<Exercise>>> {
    Ok(Json(state.services.exercises.list(q.into_filter()).await?))
}

/// POST /api/exercises
#[utoipa::path(
    post,
    path = "/api/exercises",
    responses(
        (status = 201, description = "Exercise created"),
        (status = 400, description = "Missing name or primary muscle"),
        (status = 409, description = "Name already exists")
    ),
    security(("bearer" = [])),
    tag = "exercises"
)]
pub async fn create_exercise_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(input): ApiJson<ExerciseInput>,
) -> ApiResult<impl IntoResponse> {
    let exercise = state.services.exercises.create(input).await?;
    Ok((StatusCode::CREATED, Json(exercise)))
}

/// GET /api/exercises/{id}
#[utoipa::path(
    get,
    path = "/api/exercises/{id}",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "The exercise"), (status = 404, description = "Unknown id")),
    security(("bearer" = [])),
    tag = "exercises"
)]
pub async fn get_exercise_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Exercise>> {
    Ok(Json(state.services.exercises.get(id).await?))
}

/// PUT /api/exercises/{id}
#[utoipa::path(
    put,
    path = "/api/exercises/{id}",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "Exercise replaced"), (status = 409, description = "Name already exists")),
    security(("bearer" = [])),
    tag = "exercises"
)]
pub async fn update_exercise_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<ExerciseInput>,
) -> ApiResult<Json<Exercise>> {
    Ok(Json(state.services.exercises.update(id, input).await?))
}

/// DELETE /api/exercises/{id}
#[utoipa::path(
    delete,
    path = "/api/exercises/{id}",
    params(("id" = Uuid, Path)),
    responses((status = 204, description = "Deleted"), (status = 409, description = "Still prescribed")),
    security(("bearer" = [])),
    tag = "exercises"
)]
pub async fn delete_exercise_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    state.services.exercises.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
