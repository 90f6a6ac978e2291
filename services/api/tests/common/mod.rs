//! Shared test helpers for integration tests.

#![allow(dead_code)]

use api_lib::adapters::DbAdapter;
use api_lib::config::CorsOrigins;
use api_lib::security::JwtKeys;
use api_lib::web::rate_limit::RateLimiter;
use api_lib::web::{build_router, cors_layer, AppState, HealthProbe};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use roma_core::memory::{InMemoryStore, PlainHasher};
use roma_core::{ServiceConfig, Services};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

/// A readiness probe with a fixed answer.
pub struct StaticProbe(pub bool);

#[async_trait]
impl HealthProbe for StaticProbe {
    async fn check(&self, _timeout: Duration) -> bool {
        self.0
    }
}

/// Router over an in-memory store, plus handles to seed it and mint tokens.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub jwt: Arc<JwtKeys>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(true, RateLimiter::new(1000.0, 1000))
    }

    pub fn with(db_up: bool, limiter: RateLimiter) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let jwt = Arc::new(JwtKeys::new(
            "test-secret",
            chrono::Duration::minutes(15),
            chrono::Duration::hours(1),
        ));
        let services = Services::new(
            store.clone(),
            Arc::new(PlainHasher),
            jwt.clone(),
            ServiceConfig {
                default_tz: chrono_tz::UTC,
                invite_ttl: chrono::Duration::hours(72),
            },
        );
        let state = Arc::new(AppState {
            services,
            jwt: jwt.clone(),
            probe: Arc::new(StaticProbe(db_up)),
            limiter: Arc::new(limiter),
        });
        Self {
            router: build_router(state, cors_layer(&CorsOrigins::Any)),
            store,
            jwt,
        }
    }

    /// Seeds a user and returns it with a fresh access token.
    pub fn user(&self, email: &str, name: &str) -> (Uuid, String) {
        let id = self.store.seed_user(email, name);
        (id, self.token(id))
    }

    pub fn token(&self, user_id: Uuid) -> String {
        self.jwt.issue_pair(user_id).unwrap().access
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        call(&self.router, method, uri, token, body).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send("GET", uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send("PATCH", uri, Some(token), Some(body)).await
    }
}

/// Reads a UUID field out of a JSON body.
pub fn id_of(json: &Value, field: &str) -> Uuid {
    json[field]
        .as_str()
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .unwrap_or_else(|| panic!("missing uuid field {field} in {json}"))
}

//=========================================================================================
// Database-backed helpers
//=========================================================================================

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// Connects, migrates and empties every table.
pub async fn setup_test_db() -> DbAdapter {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&test_db_url())
        .await
        .expect("Failed to connect to test database");
    let db = DbAdapter::new(pool);
    db.run_migrations().await.expect("migrations failed");
    truncate_all_tables(db.pool()).await;
    db
}

/// Truncate all tables to ensure test isolation.
pub async fn truncate_all_tables(pool: &sqlx::PgPool) {
    sqlx::query(
        "TRUNCATE TABLE invitations, cardio_segments, set_logs, session_logs, assignments,
                       coach_links, prescriptions, program_days, program_weeks,
                       program_versions, programs, exercises, users CASCADE",
    )
    .execute(pool)
    .await
    .expect("Failed to truncate tables");
}

/// The full router over a clean Postgres database.
pub async fn build_db_app() -> (Router, Arc<JwtKeys>) {
    let db = Arc::new(setup_test_db().await);
    let jwt = Arc::new(JwtKeys::new(
        "test-secret",
        chrono::Duration::minutes(15),
        chrono::Duration::hours(1),
    ));
    let services = Services::new(
        db.clone(),
        Arc::new(PlainHasher),
        jwt.clone(),
        ServiceConfig {
            default_tz: chrono_tz::UTC,
            invite_ttl: chrono::Duration::hours(72),
        },
    );
    let state = Arc::new(AppState {
        services,
        jwt: jwt.clone(),
        probe: db,
        limiter: Arc::new(RateLimiter::new(1000.0, 1000)),
    });
    (build_router(state, cors_layer(&CorsOrigins::Any)), jwt)
}

/// Sends one request to `router` and parses the JSON body.
pub async fn call(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri).method(method);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(serde_json::json!(null));
    (status, json)
}
