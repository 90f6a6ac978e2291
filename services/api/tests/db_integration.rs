//! End-to-end tests of the Postgres adapter through the HTTP router.
//!
//! # Prerequisites
//!
//! A running PostgreSQL instance with `TEST_DATABASE_URL` set. Tests truncate every table, so
//! run them single-threaded:
//!
//! ```bash
//! TEST_DATABASE_URL=postgres://... cargo test -p api --test db_integration -- --test-threads=1
//! ```

mod common;

use axum::http::StatusCode;
use common::{build_db_app, call, id_of};
use serde_json::json;

/// Skip the test if TEST_DATABASE_URL is not set.
macro_rules! require_db {
    () => {
        if !common::has_test_db() {
            eprintln!("Skipping: TEST_DATABASE_URL not set");
            return;
        }
    };
}

#[tokio::test]
async fn readiness_pings_postgres() {
    require_db!();
    let (router, _) = build_db_app().await;
    let (status, json) = call(&router, "GET", "/readyz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ready");
}

#[tokio::test]
async fn coach_plans_and_disciple_trains() {
    require_db!();
    let (router, _) = build_db_app().await;
    let signup = |email: &'static str, name: &'static str| {
        json!({ "email": email, "password": "password", "name": name })
    };

    let (status, coach) = call(&router, "POST", "/auth/signup", None, Some(signup("coach@example.com", "Coach"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let coach_token = coach["tokens"]["access"].as_str().unwrap().to_string();
    let (_, dana) = call(&router, "POST", "/auth/signup", None, Some(signup("dana@example.com", "Dana"))).await;
    let dana_token = dana["tokens"]["access"].as_str().unwrap().to_string();
    let dana_id = id_of(&dana["user"], "id");

    let (status, json) = call(&router, "POST", "/auth/signup", None, Some(signup("DANA@example.com", "Again"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "email_in_use");

    let (_, exercise) = call(
        &router,
        "POST",
        "/api/exercises",
        Some(&coach_token),
        Some(json!({ "name": "Deadlift", "primary_muscle": "back", "tags": ["pull"] })),
    )
    .await;
    let exercise_id = id_of(&exercise, "id");

    let (_, program) = call(&router, "POST", "/api/programs", Some(&coach_token), Some(json!({ "title": "Pull Day" }))).await;
    let program_id = id_of(&program, "id");
    let (_, week) = call(
        &router,
        "POST",
        &format!("/api/programs/{program_id}/weeks"),
        Some(&coach_token),
        Some(json!({ "week_index": 1 })),
    )
    .await;
    let week_id = id_of(&week, "id");
    let (_, day) = call(
        &router,
        "POST",
        &format!("/api/programs/{program_id}/weeks/{week_id}/days"),
        Some(&coach_token),
        Some(json!({ "day_index": 1 })),
    )
    .await;
    let day_id = id_of(&day, "id");
    let (status, rx) = call(
        &router,
        "POST",
        &format!("/api/programs/days/{day_id}/prescriptions"),
        Some(&coach_token),
        Some(json!({ "exercise_id": exercise_id, "series": 2, "reps": "5" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rx["position"], 1);
    let prescription_id = id_of(&rx, "id");

    // Invitation links the pair without a pending step.
    let (_, invite) = call(
        &router,
        "POST",
        "/api/coach/invitations",
        Some(&coach_token),
        Some(json!({ "email": "dana@example.com" })),
    )
    .await;
    let code = invite["code"].as_str().unwrap().to_string();
    let (status, _) = call(&router, "POST", &format!("/api/invitations/{code}/accept"), Some(&dana_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, assignment) = call(
        &router,
        "POST",
        "/api/coach/assignments",
        Some(&coach_token),
        Some(json!({ "program_id": program_id, "disciple_id": dana_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let assignment_id = id_of(&assignment, "id");

    // A second assignment replaces the first as the active one.
    let (_, second) = call(
        &router,
        "POST",
        "/api/coach/assignments",
        Some(&coach_token),
        Some(json!({ "program_id": program_id, "disciple_id": dana_id })),
    )
    .await;
    let (_, active) = call(&router, "GET", "/api/me/assignment/active", Some(&dana_token), None).await;
    assert_eq!(id_of(&active, "id"), id_of(&second, "id"));
    assert_ne!(id_of(&second, "id"), assignment_id);

    let (_, today) = call(&router, "GET", "/api/me/today?tz=UTC", Some(&dana_token), None).await;
    assert_eq!(id_of(&today["day"], "id"), day_id);

    let (status, session) = call(
        &router,
        "POST",
        "/api/sessions",
        Some(&dana_token),
        Some(json!({ "assignment_id": id_of(&second, "id"), "day_id": day_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let session_id = id_of(&session, "id");
    for set_index in 1..=2 {
        let (status, _) = call(
            &router,
            "POST",
            &format!("/api/sessions/{session_id}/sets"),
            Some(&dana_token),
            Some(json!({ "prescription_id": prescription_id, "set_index": set_index, "weight": 140.0, "reps": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, closed) = call(
        &router,
        "PATCH",
        &format!("/api/sessions/{session_id}"),
        Some(&dana_token),
        Some(json!({ "ended_at": "2030-01-01T10:00:00Z" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["status"], "closed");

    let (status, history) = call(
        &router,
        "GET",
        &format!("/api/history?disciple_id={dana_id}&group=day&tz=UTC"),
        Some(&coach_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["items"][0]["sets"], 2);

    let (status, summary) = call(&router, "GET", "/api/history/summary?mode=by_muscle&days=3", Some(&dana_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["rows"].as_array().map(Vec::len), Some(3));

    // Programs still referenced by assignments cannot be deleted.
    let (status, json) = call(&router, "DELETE", &format!("/api/programs/{program_id}"), Some(&coach_token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "in_use");
}

#[tokio::test]
async fn active_assignment_index_rejects_a_second_active_row() {
    require_db!();
    use roma_core::domain::{AssignmentPatch, NewAssignment, NewProgram};
    use roma_core::ports::{AssignmentRepository, ProgramRepository, UserRepository};
    use roma_core::PortError;

    let db = common::setup_test_db().await;
    let coach = db.create_user("coach@example.com", "Coach", "x").await.unwrap();
    let dana = db.create_user("dana@example.com", "Dana", "x").await.unwrap();
    let program = db
        .create_program(
            coach.id,
            &NewProgram { title: "Base".into(), notes: None, visibility: None },
        )
        .await
        .unwrap();
    let start = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let end = chrono::NaiveDate::from_ymd_opt(2024, 3, 28).unwrap();
    let input = NewAssignment {
        program_id: program.id,
        program_version: program.version,
        disciple_id: dana.id,
        assigned_by: coach.id,
        start_date: start,
        end_date: Some(end),
    };

    let first = db.create_active_assignment(&input).await.unwrap();
    let second = db.create_active_assignment(&input).await.unwrap();
    assert!(second.is_active);
    assert_eq!(second.end_date, Some(end));
    assert!(!db.get_assignment(first.id).await.unwrap().is_active);

    // Raising the flag outside the activation transaction trips the partial unique index.
    let raised = db
        .update_assignment(first.id, &AssignmentPatch { end_date: None, is_active: Some(true) })
        .await;
    assert!(matches!(raised, Err(PortError::Conflict(code)) if code == "active_assignment_exists"));
}
