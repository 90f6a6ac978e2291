//! services/api/src/web/invites.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use roma_core::domain::Invitation;
use roma_core::services::invites::{AcceptedInvite, CreateInvite};
use std::sync::Arc;

use crate::error::ApiResult;
use crate::web::extract::{ApiJson, ApiPath, CurrentUser};
use crate::web::state::AppState;

/// POST /api/coach/invitations
#[utoipa::path(
    post,
    path = "/api/coach/invitations",
    responses((status = 201, description = "Pending invitation with its signed code"), (status = 400, description = "Invalid email")),
    security(("bearer" = [])),
    tag = "invitations"
)]
pub async fn create_invite_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(input): ApiJson<CreateInvite>,
) -> ApiResult<impl IntoResponse> {
    let invitation = state.services.invites.create(user.0, input).await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

/// GET /api/coach/invitations
#[utoipa::path(
    get,
    path = "/api/coach/invitations",
    responses((status = 200, description = "The caller's invitations, newest first")),
    security(("bearer" = [])),
    tag = "invitations"
)]
pub async fn list_invites_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<Invitation>>> {
    Ok(Json(state.services.invites.list(user.0).await?))
}

/// POST /api/coach/invitations/{code}/revoke
#[utoipa::path(
    post,
    path = "/api/coach/invitations/{code}/revoke",
    params(("code" = String, Path)),
    responses(
        (status = 200, description = "Invitation revoked"),
        (status = 403, description = "Not the issuing coach"),
        (status = 409, description = "Invitation is not pending")
    ),
    security(("bearer" = [])),
    tag = "invitations"
)]
pub async fn revoke_invite_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(code): ApiPath<String>,
) -> ApiResult<Json<Invitation>> {
    Ok(Json(state.services.invites.revoke(user.0, &code).await?))
}

/// POST /api/invitations/{code}/accept
#[utoipa::path(
    post,
    path = "/api/invitations/{code}/accept",
    params(("code" = String, Path)),
    responses(
        (status = 200, description = "Linked to the inviting coach"),
        (status = 404, description = "invalid_code"),
        (status = 409, description = "invite_not_pending"),
        (status = 410, description = "invite_expired")
    ),
    security(("bearer" = [])),
    tag = "invitations"
)]
pub async fn accept_invite_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(code): ApiPath<String>,
) -> ApiResult<Json<AcceptedInvite>> {
    Ok(Json(state.services.invites.accept(user.0, &code).await?))
}
