//! services/api/src/web/router.rs
//!
//! Assembles every route, the auth and coach-guard layers, CORS and request logging.

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use axum::{
    middleware as axum_middleware,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::CorsOrigins;
use crate::web::middleware::{coach_guard, request_log, require_auth, REQUEST_ID_HEADER};
use crate::web::rate_limit::rate_limit;
use crate::web::rest::ApiDoc;
use crate::web::state::AppState;
use crate::web::{auth, coach, exercises, health, history, invites, me, programs, sessions};

/// Builds the complete application router over `state`.
pub fn build_router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    // Public routes (no auth required); credential endpoints are rate limited per client.
    let auth_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/register", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), rate_limit));

    let health_routes = Router::new()
        .route("/healthz", get(health::healthz_handler))
        .route("/readyz", get(health::readyz_handler))
        .route("/health/db", get(health::health_db_handler));

    // Routes addressing a disciple by `{id}` where the caller must be able to coach them.
    let guarded_routes = Router::new()
        .route(
            "/api/coach/disciples/{id}/assignments/{assignment_id}/activate",
            post(coach::activate_assignment_handler),
        )
        .route("/api/coach/disciples/{id}/today", get(coach::disciple_today_handler))
        .route(
            "/api/coach/disciples/{id}/overview",
            get(coach::disciple_overview_handler),
        )
        .route(
            "/api/history/disciples/{id}/sessions",
            get(history::disciple_sessions_handler),
        )
        .route(
            "/api/history/disciples/{id}/plan-vs-done",
            get(history::plan_vs_done_handler),
        )
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), coach_guard));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        // --- Me ---
        .route("/me", get(me::me_handler))
        .route("/api/me/today", get(me::today_handler))
        .route("/api/me/assignment/active", get(me::active_assignment_handler))
        .route("/api/me/session/active", get(me::active_session_handler))
        .route("/api/me/program-day", get(me::program_day_handler))
        // --- Exercises ---
        .route(
            "/api/exercises",
            get(exercises::list_exercises_handler).post(exercises::create_exercise_handler),
        )
        .route(
            "/api/exercises/{id}",
            get(exercises::get_exercise_handler)
                .put(exercises::update_exercise_handler)
                .delete(exercises::delete_exercise_handler),
        )
        // --- Programs ---
        .route(
            "/api/programs",
            get(programs::list_programs_handler).post(programs::create_program_handler),
        )
        .route(
            "/api/programs/{id}",
            get(programs::get_program_handler)
                .put(programs::update_program_handler)
                .delete(programs::delete_program_handler),
        )
        .route("/api/programs/{id}/version", post(programs::new_version_handler))
        .route("/api/programs/{id}/versions", get(programs::list_versions_handler))
        .route(
            "/api/programs/{id}/weeks",
            get(programs::list_weeks_handler).post(programs::add_week_handler),
        )
        .route(
            "/api/programs/{id}/weeks/{week_id}",
            axum::routing::delete(programs::delete_week_handler),
        )
        .route(
            "/api/programs/{id}/weeks/{week_id}/days",
            get(programs::list_days_handler).post(programs::add_day_handler),
        )
        .route(
            "/api/programs/days/{day_id}",
            put(programs::update_day_handler).delete(programs::delete_day_handler),
        )
        .route(
            "/api/programs/days/{day_id}/prescriptions",
            get(programs::list_prescriptions_handler).post(programs::add_prescription_handler),
        )
        .route(
            "/api/programs/days/{day_id}/prescriptions/reorder",
            patch(programs::reorder_prescriptions_handler),
        )
        .route(
            "/api/programs/prescriptions/{id}",
            put(programs::update_prescription_handler)
                .delete(programs::delete_prescription_handler),
        )
        // --- Coach ---
        .route(
            "/api/coach/links",
            get(coach::list_links_handler).post(coach::create_link_handler),
        )
        .route("/api/coach/links/{id}", patch(coach::update_link_handler))
        .route("/api/coach/disciples", get(coach::list_disciples_handler))
        .route(
            "/api/coach/assignments",
            get(coach::list_assignments_handler).post(coach::assign_program_handler),
        )
        .route(
            "/api/coach/assignments/{id}",
            patch(coach::update_assignment_handler),
        )
        .route(
            "/api/coach/assignments/{id}/calendar",
            get(coach::assignment_calendar_handler),
        )
        .route("/api/assignments/{id}/days", get(coach::assignment_days_handler))
        // --- Invitations ---
        .route(
            "/api/coach/invitations",
            get(invites::list_invites_handler).post(invites::create_invite_handler),
        )
        .route(
            "/api/coach/invitations/{code}/revoke",
            post(invites::revoke_invite_handler),
        )
        .route(
            "/api/invitations/{code}/accept",
            post(invites::accept_invite_handler),
        )
        // --- Sessions ---
        .route("/api/sessions", post(sessions::start_session_handler))
        .route(
            "/api/sessions/{id}",
            get(sessions::get_session_handler).patch(sessions::patch_session_handler),
        )
        .route(
            "/api/sessions/{id}/sets",
            get(sessions::list_sets_handler).post(sessions::add_set_handler),
        )
        .route(
            "/api/sessions/{id}/sets/{set_id}",
            patch(sessions::update_set_handler).delete(sessions::delete_set_handler),
        )
        .route("/api/sessions/{id}/cardio", post(sessions::add_cardio_handler))
        // --- History ---
        .route("/api/history", get(history::history_handler))
        .route("/api/history/recent", get(history::recent_handler))
        .route("/api/history/prs", get(history::prs_handler))
        .route("/api/history/summary", get(history::summary_handler))
        .route("/api/history/summary/pivot", get(history::pivot_handler))
        .merge(guarded_routes)
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    let api_router = Router::new()
        .merge(auth_routes)
        .merge(health_routes)
        .merge(protected_routes)
        .with_state(state);

    // Merge the API router with the Swagger UI router for a complete application.
    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum_middleware::from_fn(request_log))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// A wildcard origin never allows credentials; an explicit list does.
pub fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    match origins {
        CorsOrigins::Any => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
            .expose_headers([request_id]),
        CorsOrigins::List(list) => {
            let allowed: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(origin = %origin, "ignoring unparseable CORS origin");
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_credentials(true)
                .allow_methods(methods)
                .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT, request_id.clone()])
                .expose_headers([request_id])
        }
    }
}
