use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, header::USER_AGENT},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::info;

/// Logs method, path, client address, user-agent, status and duration of
/// every request except CORS preflights.
pub async fn log_request(req: Request<Body>, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".into());
    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_owned();

    let started = Instant::now();
    let response = next.run(req).await;

    info!(
        method = ?method,
        path = %path,
        ip = %ip,
        user_agent = %user_agent,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Incoming request"
    );
    response
}
