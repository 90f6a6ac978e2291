//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for signup, login and token refresh.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use roma_core::services::accounts::SignupInput;
use roma_core::{PortError, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::security::{TokenPair, TokenType};
use crate::web::extract::ApiJson;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshRequest {
    #[serde(alias = "refresh")]
    pub refresh_token: String,
}

#[derive(Serialize, ToSchema)]
pub struct UserBody {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserBody {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserBody,
    pub tokens: TokenPair,
}

#[derive(Serialize, ToSchema)]
pub struct RefreshResponse {
    pub tokens: TokenPair,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created", body = AuthResponse),
        (status = 400, description = "Invalid email, short password or missing name"),
        (status = 409, description = "Email already registered"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .services
        .accounts
        .signup(SignupInput {
            email: req.email,
            password: req.password,
            name: req.name,
        })
        .await?;
    let tokens = state.jwt.issue_pair(user.id)?;
    info!(user_id = %user.id, "user signed up");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: user.into(),
            tokens,
        }),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let user = state
        .services
        .accounts
        .authenticate(&req.email, &req.password)
        .await?;
    let tokens = state.jwt.issue_pair(user.id)?;
    Ok(Json(AuthResponse {
        user: user.into(),
        tokens,
    }))
}

/// POST /auth/refresh - Exchange a refresh token for a new pair
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = RefreshResponse),
        (status = 401, description = "Invalid, expired or non-refresh token")
    ),
    tag = "auth"
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let claims = state.jwt.verify(&req.refresh_token, TokenType::Refresh)?;
    let user_id = claims
        .user_id()
        .ok_or(ApiError::Unauthorized("invalid_token"))?;
    // Tokens of deleted accounts stop refreshing.
    state
        .services
        .accounts
        .get_user(user_id)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => ApiError::Unauthorized("invalid_token"),
            other => other.into(),
        })?;
    Ok(Json(RefreshResponse {
        tokens: state.jwt.issue_pair(user_id)?,
    }))
}
