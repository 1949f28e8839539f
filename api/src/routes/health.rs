use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tracing::warn;

use crate::response::ApiResponse;
use crate::state::AppState;

/// Builds the `/health` route group.
///
/// Kiosks poll this before deciding whether to submit check-ins directly or
/// hold them locally, so it reports the database and the offline backlog.
pub fn health_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .with_state(app_state)
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: bool,
    pub offline_pending: usize,
}

/// GET /health
///
/// ### Responses
/// - `200 OK` → database reachable
/// - `503 Service Unavailable` → database unreachable; check-ins will be queued
///
/// ```json
/// {
///   "success": true,
///   "data": { "status": "OK", "database": true, "offline_pending": 0 },
///   "message": "Health check passed"
/// }
/// ```
async fn health_check(State(app_state): State<AppState>) -> Response {
    let database = match app_state.db().ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Database ping failed");
            false
        }
    };
    let report = HealthReport {
        status: if database { "OK" } else { "DEGRADED" },
        database,
        offline_pending: app_state.offline().len().await,
    };

    if database {
        (
            StatusCode::OK,
            Json(ApiResponse::success(report, "Health check passed")),
        )
            .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::failure(report, "Database unreachable")),
        )
            .into_response()
    }
}
