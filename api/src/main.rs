use api::middleware::log_request;
use api::routes::routes;
use api::state::AppState;
use axum::{Router, middleware::from_fn};
use common::config::AppConfig;
use common::logger::init_logging;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tracing::info;

#[tokio::main]
async fn main() {
    let config = AppConfig::global();
    let _log_guard = init_logging(
        "logs",
        &config.log_file,
        &config.log_level,
        config.log_to_stdout,
    );

    let db = db::connect().await.expect("Failed to connect to database");
    let app_state = AppState::new(
        db,
        &config,
        Some(PathBuf::from(&config.offline_queue_path)),
    )
    .await
    .expect("Failed to open offline queue");

    let pending = app_state.offline().len().await;
    if pending > 0 {
        info!(pending, "Offline queue has check-ins waiting for replay");
    }

    let app = Router::new()
        .nest("/api", routes(app_state.clone()))
        .layer(from_fn(log_request))
        .layer(CorsLayer::very_permissive());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid address");

    info!(
        "Starting {} ({}) on http://{}",
        config.project_name, config.env, addr
    );

    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server crashed");
}
