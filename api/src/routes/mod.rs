//! HTTP route entry point for `/api/...`.
//!
//! - `/health` → database reachability and offline backlog
//! - `/attendance` → check-in, streak lookup and offline queue management

use crate::routes::{attendance::attendance_routes, health::health_routes};
use crate::state::AppState;
use axum::Router;

pub mod attendance;
pub mod health;

/// Builds the complete `/api` router with `app_state` already applied.
pub fn routes(app_state: AppState) -> Router {
    Router::new()
        .nest("/health", health_routes(app_state.clone()))
        .nest("/attendance", attendance_routes(app_state))
}
