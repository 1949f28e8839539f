use axum::{
    body::Body as AxumBody,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use services::CheckInRequest;
use serial_test::serial;
use tower::ServiceExt;

use crate::helpers::make_test_app;

#[tokio::test]
#[serial]
async fn health_reports_database_and_backlog() {
    let (app, state) = make_test_app().await;
    let request: CheckInRequest = serde_json::from_value(json!({
        "student_id": "0b6c3f7e-2d1a-4c5b-9e8f-1a2b3c4d5e6f",
        "session_id": "c3d4e5f6-a7b8-4c9d-8e0f-1a2b3c4d5e6f"
    }))
    .unwrap();
    state.offline().enqueue(request).await.unwrap();

    let req = Request::builder()
        .method("GET")
        .uri("/api/health")
        .body(AxumBody::empty())
        .unwrap();

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["status"], "OK");
    assert_eq!(json["data"]["database"], true);
    assert_eq!(json["data"]["offline_pending"], 1);
    assert_eq!(json["message"], "Health check passed");
}
