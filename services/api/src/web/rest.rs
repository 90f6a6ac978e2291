//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::security::TokenPair;
use crate::web::auth::{
    AuthResponse, LoginRequest, RefreshRequest, RefreshResponse, SignupRequest, UserBody,
};
use crate::web::{auth, coach, exercises, health, history, invites, me, programs, sessions};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::refresh_handler,
        me::me_handler,
        me::today_handler,
        me::active_assignment_handler,
        me::active_session_handler,
        me::program_day_handler,
        exercises::list_exercises_handler,
        exercises::create_exercise_handler,
        exercises::get_exercise_handler,
        exercises::update_exercise_handler,
        exercises::delete_exercise_handler,
        programs::create_program_handler,
        programs::list_programs_handler,
        programs::get_program_handler,
        programs::update_program_handler,
        programs::delete_program_handler,
        programs::new_version_handler,
        programs::list_versions_handler,
        programs::add_week_handler,
        programs::list_weeks_handler,
        programs::delete_week_handler,
        programs::add_day_handler,
        programs::list_days_handler,
        programs::update_day_handler,
        programs::delete_day_handler,
        programs::add_prescription_handler,
        programs::list_prescriptions_handler,
        programs::update_prescription_handler,
        programs::delete_prescription_handler,
        programs::reorder_prescriptions_handler,
        coach::create_link_handler,
        coach::update_link_handler,
        coach::list_links_handler,
        coach::list_disciples_handler,
        coach::assign_program_handler,
        coach::list_assignments_handler,
        coach::update_assignment_handler,
        coach::assignment_calendar_handler,
        coach::assignment_days_handler,
        coach::activate_assignment_handler,
        coach::disciple_today_handler,
        coach::disciple_overview_handler,
        sessions::start_session_handler,
        sessions::get_session_handler,
        sessions::patch_session_handler,
        sessions::add_set_handler,
        sessions::list_sets_handler,
        sessions::update_set_handler,
        sessions::delete_set_handler,
        sessions::add_cardio_handler,
        history::history_handler,
        history::recent_handler,
        history::prs_handler,
        history::summary_handler,
        history::pivot_handler,
        history::disciple_sessions_handler,
        history::plan_vs_done_handler,
        invites::create_invite_handler,
        invites::list_invites_handler,
        invites::revoke_invite_handler,
        invites::accept_invite_handler,
        health::healthz_handler,
        health::readyz_handler,
        health::health_db_handler,
    ),
    components(
        schemas(SignupRequest, LoginRequest, RefreshRequest, UserBody, AuthResponse, RefreshResponse, TokenPair)
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Signup, login and token refresh."),
        (name = "me", description = "The caller's profile and today's plan."),
        (name = "exercises", description = "Shared exercise catalog."),
        (name = "programs", description = "Programs with their weeks, days and prescriptions."),
        (name = "coach", description = "Coach links, assignments and disciple views."),
        (name = "sessions", description = "Logged workouts, sets and cardio."),
        (name = "history", description = "Training history and volume summaries."),
        (name = "invitations", description = "Coach invitation codes."),
        (name = "health", description = "Liveness and readiness probes.")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme the protected paths refer to.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
