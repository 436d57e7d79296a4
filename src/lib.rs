pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod playlist;
pub mod secrets;
pub mod signer;
pub mod storage;

use axum::Router;
use axum::extract::Extension;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

//
// Re-export
//
pub use api::{SignResponse, healthz, log_request_errors, proxy_auth, proxy_playlist, sign_url};
pub use app_state::AppState;
pub use config::Config;
pub use error::ApiError;
pub use playlist::{BaseContext, MediaRef, PlaylistRewriter, RefKind, RewriteContext};
pub use secrets::{SecretCache, SecretStore, SigningIdentity, SigningSecret};
pub use signer::{RsaUrlSigner, SignError, SigningPolicy, UrlSigner};
pub use storage::{MediaStore, StorageBackend};

pub async fn run(config: Config) {
    let listen_on_port = config.listen_on_port;

    let state = AppState::new(config).expect("Failed to create app state");

    let cors = build_cors(&state.config.allowed_origins);

    // The proxy endpoint is open by default (players fetch it directly);
    // proxy_auth puts it behind the same credential gate as /sign.
    let mut playlist_routes = Router::new().route("/playlists/{*key}", get(proxy_playlist));
    if state.config.proxy_auth {
        playlist_routes = playlist_routes.route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            proxy_auth,
        ));
    }

    let app = Router::new()
        .route("/sign", post(sign_url))
        .route("/healthz", get(healthz))
        .merge(playlist_routes)
        .layer(axum::middleware::from_fn(log_request_errors))
        .layer(cors)
        .layer(Extension(state));

    let addr = format!("0.0.0.0:{listen_on_port}");
    info!("Listening on {addr}");
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}

/// Permissive CORS by default; a configured allowlist narrows it to the
/// approved player origins.
fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
