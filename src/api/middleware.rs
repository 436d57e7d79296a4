use crate::AppState;
use crate::api::routes::authenticate;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::time::Instant;
use tracing::{error, warn};

/// Log request outcomes a client will experience as failures.
pub async fn log_request_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if status.is_server_error() {
        error!(%method, %uri, %status, elapsed_ms, "Server error");
    } else if status.is_client_error() {
        warn!(%method, %uri, %status, elapsed_ms, "Client error");
    }

    response
}

/// Credential gate for the playlist proxy, applied only when proxy_auth is
/// configured.
pub async fn proxy_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Err(err) = authenticate(req.headers(), &state).await {
        return err.into_response();
    }
    next.run(req).await
}
