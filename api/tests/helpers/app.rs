use api::middleware::log_request;
use api::routes::routes;
use api::state::AppState;
use axum::{Router, middleware::from_fn};
use chrono::{Duration, Utc};
use common::config::AppConfig;
use db::models::{class_session, class_session::SessionStatus, plan, plan::PlanStatus, student};
use db::test_utils::setup_test_db;
use sea_orm::DatabaseConnection;

pub const PLAN_ID: &str = "5a5a5a5a-5a5a-4a5a-8a5a-5a5a5a5a5a5a";

/// Fresh in-memory database and an app wired over it. The offline queue
/// stays in memory.
pub async fn make_test_app() -> (Router, AppState) {
    let db = setup_test_db().await;
    let app_state = AppState::new(db, &AppConfig::global(), None)
        .await
        .expect("Failed to build app state");

    let router = Router::new()
        .nest("/api", routes(app_state.clone()))
        .layer(from_fn(log_request));

    (router, app_state)
}

/// A student with an active plan restricted to `plan_courses` (empty means
/// unrestricted) and a session on `course` that started five minutes ago.
pub async fn seed_member(
    db: &DatabaseConnection,
    student_id: &str,
    session_id: &str,
    course: &str,
    plan_courses: &[&str],
) {
    let now = Utc::now();
    student::Model::create(db, student_id, "Ana Souza", true)
        .await
        .unwrap();
    class_session::Model::create(
        db,
        session_id,
        course,
        "Evening fundamentals",
        now - Duration::minutes(5),
        SessionStatus::Scheduled,
    )
    .await
    .unwrap();
    plan::Model::create(
        db,
        PLAN_ID,
        student_id,
        "Monthly",
        PlanStatus::Active,
        now - Duration::days(10),
        now + Duration::days(20),
        plan_courses,
    )
    .await
    .unwrap();
}
