//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it renders over HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use roma_core::ports::PortError;
use serde_json::json;
use tracing::error;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed request: bad JSON, path or query.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Authentication failed; carries the client-facing code.
    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("Rate limited")]
    RateLimited,

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    /// Status, stable code and optional detail sent to the client.
    fn parts(&self) -> (StatusCode, String, Option<String>) {
        match self {
            ApiError::Port(err) => match err {
                PortError::NotFound(what) => {
                    let code = if what == "invalid_code" { what.as_str() } else { "not_found" };
                    (StatusCode::NOT_FOUND, code.to_string(), Some(what.clone()))
                }
                PortError::NoDay => (StatusCode::NOT_FOUND, "no_day".to_string(), None),
                PortError::Validation(code) => (StatusCode::BAD_REQUEST, code.clone(), None),
                PortError::Unauthorized => {
                    (StatusCode::UNAUTHORIZED, "invalid_credentials".to_string(), None)
                }
                PortError::Forbidden(reason) => {
                    (StatusCode::FORBIDDEN, "forbidden".to_string(), Some(reason.clone()))
                }
                PortError::Conflict(code) => (StatusCode::CONFLICT, code.clone(), None),
                PortError::Gone(code) => (StatusCode::GONE, code.clone(), None),
                PortError::Unexpected(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "server_error".to_string(), None)
                }
            },
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "bad_request".to_string(), Some(detail.clone()))
            }
            ApiError::Unauthorized(code) => (StatusCode::UNAUTHORIZED, code.to_string(), None),
            ApiError::RateLimited => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limited".to_string(), None)
            }
            ApiError::Config(_)
            | ApiError::Database(_)
            | ApiError::Migration(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error".to_string(), None)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, detail) = self.parts();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = match detail {
            Some(detail) => json!({ "error": code, "detail": detail }),
            None => json!({ "error": code }),
        };
        (status, Json(body)).into_response()
    }
}

/// The result type returned by every handler.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_errors_map_to_statuses_and_codes() {
        let cases = [
            (PortError::NotFound("session".into()), StatusCode::NOT_FOUND, "not_found"),
            (PortError::NotFound("invalid_code".into()), StatusCode::NOT_FOUND, "invalid_code"),
            (PortError::NoDay, StatusCode::NOT_FOUND, "no_day"),
            (PortError::Validation("invalid_status".into()), StatusCode::BAD_REQUEST, "invalid_status"),
            (PortError::Unauthorized, StatusCode::UNAUTHORIZED, "invalid_credentials"),
            (PortError::Forbidden("x".into()), StatusCode::FORBIDDEN, "forbidden"),
            (PortError::Conflict("email_in_use".into()), StatusCode::CONFLICT, "email_in_use"),
            (PortError::Gone("invite_expired".into()), StatusCode::GONE, "invite_expired"),
            (PortError::Unexpected("boom".into()), StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
        ];
        for (err, status, code) in cases {
            let (s, c, _) = ApiError::from(err).parts();
            assert_eq!((s, c.as_str()), (status, code));
        }
    }

    #[test]
    fn internal_details_stay_private() {
        let (status, code, detail) = ApiError::Internal("pool exhausted".into()).parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "server_error");
        assert!(detail.is_none());
    }
}
