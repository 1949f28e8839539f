//! Attendance routes.
//!
//! - `POST /checkin` → record a check-in (queued when the backend is down)
//! - `GET /students/{student_id}/streak` → consecutive attended days
//! - `GET /offline` → check-ins waiting for replay
//! - `POST /offline/drain` → replay queued check-ins

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

pub mod get;
pub mod post;

pub fn attendance_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/checkin", post(post::checkin))
        .route("/students/{student_id}/streak", get(get::get_streak))
        .route("/offline", get(get::list_offline))
        .route("/offline/drain", post(post::drain_offline))
        .with_state(app_state)
}
