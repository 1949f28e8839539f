use axum::{
    Router,
    body::Body as AxumBody,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use serial_test::serial;
use services::CheckInRequest;
use services::events::AttendanceEvent;
use std::time::Duration;
use tower::ServiceExt;

use crate::helpers::{make_test_app, seed_member};

const STUDENT_ID: &str = "0b6c3f7e-2d1a-4c5b-9e8f-1a2b3c4d5e6f";
const SESSION_ID: &str = "c3d4e5f6-a7b8-4c9d-8e0f-1a2b3c4d5e6f";

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("Content-Type", "application/json");
            AxumBody::from(json.to_string())
        }
        None => AxumBody::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn checkin_body() -> Value {
    json!({
        "student_id": STUDENT_ID,
        "session_id": SESSION_ID,
        "context": { "device": "kiosk", "trigger": "manual" }
    })
}

#[tokio::test]
#[serial]
async fn checkin_records_then_reports_duplicate() {
    let (app, state) = make_test_app().await;
    seed_member(state.db(), STUDENT_ID, SESSION_ID, "course-bjj", &[]).await;

    let (status, json) = send(&app, "POST", "/api/attendance/checkin", Some(checkin_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["status"], "success");
    assert_eq!(json["data"]["streak"], 1);
    let attendance_id = json["data"]["attendance_id"].as_str().unwrap().to_owned();

    let (status, json) = send(&app, "POST", "/api/attendance/checkin", Some(checkin_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "duplicate");
    assert_eq!(json["data"]["attendance_id"], attendance_id);
}

#[tokio::test]
#[serial]
async fn checkin_accepts_camel_case_fields() {
    let (app, state) = make_test_app().await;
    seed_member(state.db(), STUDENT_ID, SESSION_ID, "course-bjj", &[]).await;

    let body = json!({
        "studentId": STUDENT_ID.to_uppercase(),
        "sessionId": SESSION_ID
    });
    let (status, json) = send(&app, "POST", "/api/attendance/checkin", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["student_id"], STUDENT_ID);
}

#[tokio::test]
#[serial]
async fn invalid_ids_are_unprocessable() {
    let (app, _) = make_test_app().await;

    let body = json!({ "student_id": "not-a-uuid", "context": { "device": "toaster" } });
    let (status, json) = send(&app, "POST", "/api/attendance/checkin", Some(body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["success"], false);
    assert_eq!(json["data"]["status"], "validation_failure");
    assert_eq!(json["data"]["violations"].as_array().unwrap().len(), 3);
}

#[tokio::test]
#[serial]
async fn malformed_json_is_bad_request() {
    let (app, _) = make_test_app().await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/attendance/checkin")
        .header("Content-Type", "application/json")
        .body(AxumBody::from("{ not json"))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[serial]
async fn restricted_plan_conflicts_on_other_course() {
    let (app, state) = make_test_app().await;
    seed_member(state.db(), STUDENT_ID, SESSION_ID, "course-muay-thai", &["course-bjj"]).await;

    let (status, json) = send(&app, "POST", "/api/attendance/checkin", Some(checkin_body())).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["data"]["status"], "rule_failure");
    assert_eq!(json["data"]["code"], "PLAN_MISMATCH");
    assert_eq!(json["data"]["severity"], "BLOCK");
}

#[tokio::test]
#[serial]
async fn unknown_student_is_not_found() {
    let (app, _) = make_test_app().await;

    let (status, json) = send(&app, "POST", "/api/attendance/checkin", Some(checkin_body())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["data"]["status"], "upstream_failure");
    assert_eq!(json["data"]["kind"], "not_found");
    assert_eq!(json["data"]["retryable"], false);
}

#[tokio::test]
#[serial]
async fn streak_counts_todays_checkin() {
    let (app, state) = make_test_app().await;
    seed_member(state.db(), STUDENT_ID, SESSION_ID, "course-bjj", &[]).await;

    let uri = format!("/api/attendance/students/{}/streak", STUDENT_ID.to_uppercase());
    let (status, json) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["streak"], 0);

    send(&app, "POST", "/api/attendance/checkin", Some(checkin_body())).await;

    let (status, json) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["student_id"], STUDENT_ID);
    assert_eq!(json["data"]["streak"], 1);
}

#[tokio::test]
#[serial]
async fn successful_checkin_is_published() {
    let (app, state) = make_test_app().await;
    seed_member(state.db(), STUDENT_ID, SESSION_ID, "course-bjj", &[]).await;
    let mut rx = state.events().subscribe();

    let (status, json) = send(&app, "POST", "/api/attendance/checkin", Some(checkin_body())).await;
    assert_eq!(status, StatusCode::CREATED);

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no event within timeout")
        .unwrap();
    let AttendanceEvent::CheckInRecorded {
        attendance_id,
        course_id,
        ..
    } = event;
    assert_eq!(attendance_id, json["data"]["attendance_id"].as_str().unwrap());
    assert_eq!(course_id, "course-bjj");
}

#[tokio::test]
#[serial]
async fn drain_replays_queued_checkins() {
    let (app, state) = make_test_app().await;
    seed_member(state.db(), STUDENT_ID, SESSION_ID, "course-bjj", &[]).await;

    let request: CheckInRequest = serde_json::from_value(checkin_body()).unwrap();
    state.offline().enqueue(request).await.unwrap();

    let (status, json) = send(&app, "GET", "/api/attendance/offline", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let (status, json) = send(&app, "POST", "/api/attendance/offline/drain", None).await;
    assert_eq!(status, StatusCode::OK);
    let results = json["data"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["reply"]["status"], "success");
    assert_eq!(results[0]["requeued"], false);

    assert!(state.offline().is_empty().await);
}

#[tokio::test]
#[serial]
async fn queued_checkins_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let queue_path = dir.path().join("offline_queue.json");
    let config = common::config::AppConfig::global();

    let first = api::state::AppState::new(
        db::test_utils::setup_test_db().await,
        &config,
        Some(queue_path.clone()),
    )
    .await
    .unwrap();
    let request: CheckInRequest = serde_json::from_value(checkin_body()).unwrap();
    assert_eq!(first.offline().enqueue(request).await.unwrap(), 1);
    drop(first);

    let reopened = api::state::AppState::new(
        db::test_utils::setup_test_db().await,
        &config,
        Some(queue_path),
    )
    .await
    .unwrap();
    let pending = reopened.offline().pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request.student_id.as_deref(), Some(STUDENT_ID));
}
