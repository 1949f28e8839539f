use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use services::offline_queue::QueuedCheckIn;
use tracing::warn;

use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StreakResponse {
    pub student_id: String,
    pub streak: u32,
}

/// GET /api/attendance/students/{student_id}/streak
///
/// Consecutive calendar days, ending today, on which the student attended.
///
/// ### Responses
/// - `200 OK` → `{ "student_id": "...", "streak": 3 }`
/// - `503 Service Unavailable` → attendance history could not be read
pub async fn get_streak(
    State(app_state): State<AppState>,
    Path(student_id): Path<String>,
) -> Response {
    let student_id = student_id.trim().to_ascii_lowercase();

    match app_state.recorder().streak(&student_id).await {
        Ok(streak) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                StreakResponse { student_id, streak },
                "Streak retrieved successfully",
            )),
        )
            .into_response(),
        Err(e) => {
            warn!(student_id = %student_id, error = %e, "streak.failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<()>::error("Attendance history is unavailable")),
            )
                .into_response()
        }
    }
}

/// GET /api/attendance/offline
///
/// Check-ins waiting in the offline queue, oldest first.
pub async fn list_offline(State(app_state): State<AppState>) -> impl IntoResponse {
    let pending: Vec<QueuedCheckIn> = app_state.offline().pending().await;
    let message = format!("{} check-ins pending", pending.len());
    Json(ApiResponse::success(pending, message))
}
