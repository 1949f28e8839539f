use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::error::UpstreamKind;
use services::offline_queue::ReplayResult;
use services::{CheckInReply, CheckInRequest, Submission};
use tracing::error;

use crate::response::ApiResponse;
use crate::state::AppState;

/// Status code and envelope message for a finished check-in.
fn status_for(reply: &CheckInReply) -> (StatusCode, String) {
    match reply {
        CheckInReply::Success { .. } => (StatusCode::CREATED, "Check-in recorded".into()),
        CheckInReply::Duplicate { .. } => (StatusCode::OK, "Already checked in today".into()),
        CheckInReply::RuleFailure { message, .. } => (StatusCode::CONFLICT, message.clone()),
        CheckInReply::ValidationFailure { message, .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, message.clone())
        }
        CheckInReply::UpstreamFailure {
            kind: UpstreamKind::NotFound,
            message,
            ..
        } => (StatusCode::NOT_FOUND, message.clone()),
        CheckInReply::UpstreamFailure { message, .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, message.clone())
        }
    }
}

/// POST /api/attendance/checkin
///
/// Records that a student attended a session. Transient backend failures are
/// retried; if the backend stays unreachable the request is queued for replay.
///
/// ### Request Body
/// ```json
/// {
///   "student_id": "0b6c3f7e-2d1a-4c5b-9e8f-1a2b3c4d5e6f",
///   "session_id": "c3d4e5f6-a7b8-4c9d-8e0f-1a2b3c4d5e6f",
///   "context": { "device": "kiosk", "trigger": "manual" }
/// }
/// ```
///
/// ### Responses
/// - `201 Created` → new attendance record (`data.status = "success"`)
/// - `200 OK` → already checked in today (`data.status = "duplicate"`)
/// - `202 Accepted` → backend unreachable, request queued
/// - `400 Bad Request` → body is not JSON
/// - `404 Not Found` → unknown student or session
/// - `409 Conflict` → blocked by a business rule (`data.code`)
/// - `422 Unprocessable Entity` → invalid ids or context (`data.violations`)
/// - `503 Service Unavailable` → backend failure
pub async fn checkin(
    State(app_state): State<AppState>,
    payload: Result<Json<CheckInRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<()>::error(rejection.body_text())),
            )
                .into_response();
        }
    };

    match app_state.offline().submit(request).await {
        Ok(Submission::Completed { reply }) => {
            let (status, message) = status_for(&reply);
            let body = if status.is_success() {
                ApiResponse::success(reply, message)
            } else {
                ApiResponse::failure(reply, message)
            };
            (status, Json(body)).into_response()
        }
        Ok(queued @ Submission::Queued { .. }) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(
                queued,
                "Backend unreachable; check-in queued for replay",
            )),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to queue check-in");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error("Failed to queue check-in")),
            )
                .into_response()
        }
    }
}

/// POST /api/attendance/offline/drain
///
/// Replays every queued check-in in arrival order. The replay runs in its own
/// task so a dropped connection cannot interrupt it.
///
/// ### Responses
/// - `200 OK` → one entry per replayed request with its reply and whether it stayed queued
/// - `500 Internal Server Error` → queue file could not be written
pub async fn drain_offline(State(app_state): State<AppState>) -> Response {
    let queue = app_state.offline();
    let drained = tokio::spawn(async move { queue.drain().await }).await;

    match drained {
        Ok(Ok(results)) => {
            let message = format!("Replayed {} queued check-ins", results.len());
            (
                StatusCode::OK,
                Json(ApiResponse::<Vec<ReplayResult>>::success(results, message)),
            )
                .into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "Offline drain failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error("Failed to persist offline queue")),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Offline drain task panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error("Offline drain aborted")),
            )
                .into_response()
        }
    }
}
