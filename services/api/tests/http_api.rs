//! HTTP tests for the REST API over the in-memory store.
//!
//! Every request goes through the full router (auth, coach guard, rate limiting, error
//! rendering) via `tower::ServiceExt::oneshot`, without a TCP listener or a database.
//!
//! ```bash
//! cargo test -p api --test http_api
//! ```

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{id_of, TestApp};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use api_lib::web::rate_limit::RateLimiter;

/// A coach with one exercise and a program holding week 1 / day 1 with one prescription.
struct Fixture {
    app: TestApp,
    coach: (Uuid, String),
    program_id: Uuid,
    day_id: Uuid,
    prescription_id: Uuid,
}

async fn fixture() -> Fixture {
    let app = TestApp::new();
    let coach = app.user("coach@example.com", "Coach");
    let exercise_id = app.store.seed_exercise("Back Squat", "quads");

    let (status, program) = app
        .post("/api/programs", &coach.1, json!({ "title": "Strength Base" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let program_id = id_of(&program, "id");

    let (status, week) = app
        .post(
            &format!("/api/programs/{program_id}/weeks"),
            &coach.1,
            json!({ "week_index": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let week_id = id_of(&week, "id");

    let (status, day) = app
        .post(
            &format!("/api/programs/{program_id}/weeks/{week_id}/days"),
            &coach.1,
            json!({ "day_index": 1, "notes": "lower" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let day_id = id_of(&day, "id");

    let (status, rx) = app
        .post(
            &format!("/api/programs/days/{day_id}/prescriptions"),
            &coach.1,
            json!({ "exercise_id": exercise_id, "series": 3, "reps": "5" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let prescription_id = id_of(&rx, "id");

    Fixture {
        app,
        coach,
        program_id,
        day_id,
        prescription_id,
    }
}

/// Links `disciple` to the fixture coach and assigns the program to them.
async fn assign_to(f: &Fixture, disciple: &(Uuid, String)) -> Uuid {
    let (status, link) = f
        .app
        .post("/api/coach/links", &f.coach.1, json!({ "disciple_id": disciple.0 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(link["status"], "pending");
    let link_id = id_of(&link, "id");

    let (status, link) = f
        .app
        .patch(
            &format!("/api/coach/links/{link_id}"),
            &disciple.1,
            json!({ "action": "accept" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(link["status"], "accepted");

    let (status, assignment) = f
        .app
        .post(
            "/api/coach/assignments",
            &f.coach.1,
            json!({ "program_id": f.program_id, "disciple_id": disciple.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(assignment["is_active"], true);
    id_of(&assignment, "id")
}

// == Auth ======================================================================

#[tokio::test]
async fn signup_login_and_refresh() {
    let app = TestApp::new();
    let body = json!({ "email": "Ana@Example.com", "password": "correct horse", "name": "Ana" });
    let (status, json) = app.send("POST", "/auth/signup", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["user"]["email"], "ana@example.com");
    assert!(json["tokens"]["access"].is_string());

    let (status, json) = app.send("POST", "/auth/register", None, Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "email_in_use");

    let (status, json) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let refresh = json["tokens"]["refresh"].as_str().unwrap().to_string();
    let access = json["tokens"]["access"].as_str().unwrap().to_string();

    let (status, json) = app
        .send("POST", "/auth/refresh", None, Some(json!({ "refresh": refresh })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["tokens"]["access"].is_string());

    // An access token is not a refresh token.
    let (status, json) = app
        .send("POST", "/auth/refresh", None, Some(json!({ "refresh_token": access })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "invalid_token");
}

#[tokio::test]
async fn signup_validation_and_bad_credentials() {
    let app = TestApp::new();
    let (status, json) = app
        .send(
            "POST",
            "/auth/signup",
            None,
            Some(json!({ "email": "ana@example.com", "password": "short", "name": "Ana" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "password_too_short");

    app.store.seed_user("ana@example.com", "Ana");
    let (status, json) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "invalid_credentials");

    let (status, json) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "password" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user"]["name"], "Ana");
}

#[tokio::test]
async fn protected_routes_require_a_valid_bearer_token() {
    let app = TestApp::new();
    let (status, json) = app.send("GET", "/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "unauthorized");

    let (status, json) = app.get("/me", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "invalid_token");
}

#[tokio::test]
async fn credential_endpoints_are_rate_limited() {
    let app = TestApp::with(true, RateLimiter::new(0.001, 2));
    let login = json!({ "email": "nobody@example.com", "password": "whatever1" });
    for _ in 0..2 {
        let (status, _) = app.send("POST", "/auth/login", None, Some(login.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, json) = app.send("POST", "/auth/login", None, Some(login)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"], "rate_limited");

    // Health checks are outside the limiter.
    let (status, _) = app.send("GET", "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_bodies_render_bad_request() {
    let app = TestApp::new();
    let (_, token) = app.user("ana@example.com", "Ana");
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/programs")
                .method("POST")
                .header("authorization", format!("Bearer {token}"))
                .header("content-type", "application/json")
                .body(Body::from("{ not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, json) = app.get("/api/programs/not-a-uuid", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "bad_request");
}

// == Me & Exercises ============================================================

#[tokio::test]
async fn role_follows_program_ownership() {
    let app = TestApp::new();
    let (_, token) = app.user("ana@example.com", "Ana");
    let (status, json) = app.get("/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["role"], "disciple");

    app.post("/api/programs", &token, json!({ "title": "Mine" })).await;
    let (_, json) = app.get("/me", &token).await;
    assert_eq!(json["role"], "coach");

    // No assignment: an empty plan rather than an error.
    let (status, json) = app.get("/api/me/today", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["day"].is_null());
    assert_eq!(json["prescriptions"], json!([]));
}

#[tokio::test]
async fn exercise_catalog_crud_and_filters() {
    let app = TestApp::new();
    let (_, token) = app.user("ana@example.com", "Ana");
    let (status, created) = app
        .post(
            "/api/exercises",
            &token,
            json!({ "name": "Bench Press", "primary_muscle": "chest", "tags": ["Push", "barbell"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = id_of(&created, "id");
    app.post(
        "/api/exercises",
        &token,
        json!({ "name": "Pull Up", "primary_muscle": "back", "tags": ["pull"] }),
    )
    .await;

    let (status, json) = app
        .post(
            "/api/exercises",
            &token,
            json!({ "name": "bench press", "primary_muscle": "chest" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "name_already_exists");

    let (status, page) = app.get("/api/exercises?tags=push&match=all", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["name"], "Bench Press");

    let (_, page) = app.get("/api/exercises?muscle=back", &token).await;
    assert_eq!(page["items"][0]["name"], "Pull Up");

    let (status, _) = app
        .send("DELETE", &format!("/api/exercises/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&format!("/api/exercises/{id}"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// == Programs ==================================================================

#[tokio::test]
async fn program_tree_reorder_and_versions() {
    let f = fixture().await;
    let app = &f.app;
    let token = &f.coach.1;
    let second = app.store.seed_exercise("Romanian Deadlift", "hamstrings");
    let (_, rx2) = app
        .post(
            &format!("/api/programs/days/{}/prescriptions", f.day_id),
            token,
            json!({ "exercise_id": second, "series": 3, "reps": "8-10", "position": 2 }),
        )
        .await;
    let rx2 = id_of(&rx2, "id");

    let (status, ordered) = app
        .patch(
            &format!("/api/programs/days/{}/prescriptions/reorder", f.day_id),
            token,
            json!({ "ids": [rx2, f.prescription_id] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ordered[0]["exercise_name"], "Romanian Deadlift");
    assert_eq!(ordered[0]["position"], 1);
    assert_eq!(ordered[1]["position"], 2);

    let (status, json) = app
        .post(
            &format!("/api/programs/days/{}/prescriptions", f.day_id),
            token,
            json!({ "exercise_id": second, "series": 0, "reps": "5" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, next) = app
        .post(&format!("/api/programs/{}/version", f.program_id), token, json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(next["version"], 2);
    let next_id = id_of(&next, "id");
    assert_ne!(next_id, f.program_id);

    let (_, weeks) = app
        .get(&format!("/api/programs/{next_id}/weeks"), token)
        .await;
    assert_eq!(weeks.as_array().map(Vec::len), Some(1));

    // Private programs are invisible to strangers.
    let (_, stranger) = app.user("eve@example.com", "Eve");
    let (status, _) = app
        .get(&format!("/api/programs/{}", f.program_id), &stranger)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// == Coach =====================================================================

#[tokio::test]
async fn coach_links_assignment_and_guarded_views() {
    let f = fixture().await;
    let app = &f.app;
    let disciple = app.user("dana@example.com", "Dana");
    let assignment_id = assign_to(&f, &disciple).await;

    let (status, disciples) = app.get("/api/coach/disciples", &f.coach.1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(disciples[0]["name"], "Dana");

    let (status, today) = app.get("/api/me/today?tz=UTC", &disciple.1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(id_of(&today, "assignment_id"), assignment_id);
    assert_eq!(id_of(&today["day"], "id"), f.day_id);
    assert_eq!(today["prescriptions"][0]["exercise_name"], "Back Squat");

    let (status, _) = app
        .get(&format!("/api/coach/disciples/{}/today", disciple.0), &f.coach.1)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, overview) = app
        .get(
            &format!("/api/coach/disciples/{}/overview?days=7", disciple.0),
            &f.coach.1,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["adherence"]["days"], 7);

    let (_, stranger) = app.user("eve@example.com", "Eve");
    let (status, json) = app
        .get(&format!("/api/coach/disciples/{}/overview", disciple.0), &stranger)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["detail"], "not_coach_of_disciple");

    let (status, calendar) = app
        .get(
            &format!("/api/coach/assignments/{assignment_id}/calendar"),
            &f.coach.1,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(calendar.as_array().map(Vec::len), Some(14));
    assert_eq!(id_of(&calendar[13], "day_id"), f.day_id);

    // Dates before the assignment starts are clipped away.
    let (_, early) = app
        .get(
            &format!("/api/coach/assignments/{assignment_id}/calendar?from=2000-01-01&to=2000-01-03"),
            &f.coach.1,
        )
        .await;
    assert_eq!(early, json!([]));

    let (status, days) = app
        .get(&format!("/api/assignments/{assignment_id}/days"), &disciple.1)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(days[0]["prescriptions"], 1);
}

#[tokio::test]
async fn link_actions_are_validated() {
    let f = fixture().await;
    let app = &f.app;
    let disciple = app.user("dana@example.com", "Dana");
    let (_, link) = app
        .post("/api/coach/links", &f.coach.1, json!({ "disciple_id": disciple.0 }))
        .await;
    let link_id = id_of(&link, "id");

    let (status, json) = app
        .patch(
            &format!("/api/coach/links/{link_id}"),
            &disciple.1,
            json!({ "action": "maybe" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_action");

    // Only the disciple may answer.
    let (status, _) = app
        .patch(
            &format!("/api/coach/links/{link_id}"),
            &f.coach.1,
            json!({ "action": "accept" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Pending links grant nothing.
    let (status, _) = app
        .post(
            "/api/coach/assignments",
            &f.coach.1,
            json!({ "program_id": f.program_id, "disciple_id": disciple.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// == Sessions & History ========================================================

#[tokio::test]
async fn session_lifecycle_sets_and_history() {
    let f = fixture().await;
    let app = &f.app;
    let disciple = app.user("dana@example.com", "Dana");
    let assignment_id = assign_to(&f, &disciple).await;

    let (status, session) = app
        .post(
            "/api/sessions",
            &disciple.1,
            json!({ "assignment_id": assignment_id, "day_id": f.day_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["status"], "open");
    let session_id = id_of(&session, "id");

    // The coach cannot log into the disciple's session.
    let (status, _) = app
        .post(
            "/api/sessions",
            &f.coach.1,
            json!({ "assignment_id": assignment_id, "day_id": f.day_id }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, set) = app
        .post(
            &format!("/api/sessions/{session_id}/sets"),
            &disciple.1,
            json!({ "prescription_id": f.prescription_id, "set_index": 1, "weight": 100.0, "reps": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(set["to_failure"], false);

    let (status, json) = app
        .post(
            &format!("/api/sessions/{session_id}/sets"),
            &disciple.1,
            json!({ "prescription_id": f.prescription_id, "set_index": 0, "reps": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, _) = app
        .post(
            &format!("/api/sessions/{session_id}/cardio"),
            &disciple.1,
            json!({ "modality": "bike", "minutes": 10 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, active) = app.get("/api/me/session/active", &disciple.1).await;
    assert_eq!(id_of(&active, "id"), session_id);

    let (_, today) = app.get("/api/me/today", &disciple.1).await;
    assert_eq!(id_of(&today, "current_session_id"), session_id);
    assert_eq!(today["current_session_sets_count"], 1);

    let (status, json) = app
        .patch(
            &format!("/api/sessions/{session_id}"),
            &disciple.1,
            json!({ "status": "paused" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_status");

    let (status, closed) = app
        .patch(
            &format!("/api/sessions/{session_id}"),
            &disciple.1,
            json!({ "status": "closed" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["status"], "closed");
    assert!(closed["ended_at"].is_string());

    let (status, detail) = app
        .get(&format!("/api/sessions/{session_id}"), &f.coach.1)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["sets"][0]["exercise_name"], "Back Squat");
    assert_eq!(detail["cardio"][0]["modality"], "bike");

    let (status, prs) = app.get("/api/history/prs", &disciple.1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(prs[0]["max_weight"], 100.0);
    assert_eq!(prs[0]["estimated_1rm"], 112.5);

    let (status, history) = app
        .get(&format!("/api/history?disciple_id={}", disciple.0), &f.coach.1)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["total"], 1);
    assert_eq!(history["items"][0]["sets_count"], 1);

    let (status, pivot) = app
        .get("/api/history/summary/pivot?metric=sets&days=7&include=catalog", &disciple.1)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pivot["columns"][0], "date");
    assert_eq!(pivot["rows"].as_array().map(Vec::len), Some(7));
    assert!(pivot["catalog"].is_array());

    let (status, _) = app
        .get(
            &format!("/api/history/disciples/{}/plan-vs-done", disciple.0),
            &f.coach.1,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, stranger) = app.user("eve@example.com", "Eve");
    let (status, _) = app
        .get(&format!("/api/history?disciple_id={}", disciple.0), &stranger)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// == Invitations ===============================================================

#[tokio::test]
async fn invitation_accept_links_once() {
    let app = TestApp::new();
    let coach = app.user("coach@example.com", "Coach");
    let disciple = app.user("dana@example.com", "Dana");

    let (status, invite) = app
        .post(
            "/api/coach/invitations",
            &coach.1,
            json!({ "email": "dana@example.com", "name": "Dana" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(invite["status"], "pending");
    let code = invite["code"].as_str().unwrap().to_string();

    let (status, json) = app
        .post(&format!("/api/invitations/{code}/accept"), &coach.1, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "own_invitation");

    let (status, accepted) = app
        .post(&format!("/api/invitations/{code}/accept"), &disciple.1, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["link"]["status"], "accepted");
    assert_eq!(accepted["invitation"]["status"], "accepted");

    let (status, json) = app
        .post(&format!("/api/invitations/{code}/accept"), &disciple.1, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "invite_not_pending");

    let (status, json) = app
        .post("/api/invitations/nope/accept", &disciple.1, json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "invalid_code");

    let (_, list) = app.get("/api/coach/invitations", &coach.1).await;
    assert_eq!(list.as_array().map(Vec::len), Some(1));
}

// == Health & Middleware =======================================================

#[tokio::test]
async fn health_endpoints_reflect_the_probe() {
    let up = TestApp::new();
    let (status, json) = up.send("GET", "/healthz", None, None).await;
    assert_eq!((status, json), (StatusCode::OK, json!({ "status": "ok" })));
    let (status, json) = up.send("GET", "/readyz", None, None).await;
    assert_eq!((status, json), (StatusCode::OK, json!({ "status": "ready" })));

    let down = TestApp::with(false, RateLimiter::new(1000.0, 1000));
    let (status, json) = down.send("GET", "/readyz", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "db_unreachable");
    let (status, json) = down.send("GET", "/health/db", None, None).await;
    assert_eq!((status, json), (StatusCode::OK, json!({ "ok": false })));
}

#[tokio::test]
async fn request_id_is_echoed() {
    let app = TestApp::new();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert!(Uuid::parse_str(generated).is_ok());
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new();
    let (status, json): (StatusCode, Value) =
        app.send("GET", "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/sessions/{id}/sets"].is_object());
}
