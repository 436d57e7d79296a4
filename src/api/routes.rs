use crate::AppState;
use crate::error::ApiError;
use crate::playlist::{BaseContext, PlaylistRewriter, RewriteContext};
use crate::signer::UrlSigner as _;
use axum::extract::{Extension, Path as AxumPath, Query};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use subtle::ConstantTimeEq as _;
use tracing::{error, info};

pub const CLIENT_ID_HEADER: &str = "x-client-id";
pub const CLIENT_SECRET_HEADER: &str = "x-client-secret";
const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";
const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Characters kept verbatim when re-encoding forwarded parameter values.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Deserialize)]
struct SignRequest {
    #[serde(default)]
    url: String,
}

#[derive(Serialize, Deserialize)]
pub struct SignResponse {
    #[serde(rename = "signedUrl")]
    pub signed_url: String,
}

/// Constant-time check of the request credentials against the secret
/// record. Does not reveal which half of the pair was wrong.
pub(crate) async fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<(), ApiError> {
    let client_id = headers.get(CLIENT_ID_HEADER).and_then(|v| v.to_str().ok());
    let client_secret = headers
        .get(CLIENT_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    let (Some(client_id), Some(client_secret)) = (client_id, client_secret) else {
        return Err(ApiError::Unauthenticated);
    };

    let identity = state.secrets.get().await?;
    let id_ok = client_id.as_bytes().ct_eq(identity.client_id.as_bytes());
    let secret_ok = client_secret
        .as_bytes()
        .ct_eq(identity.client_secret.as_bytes());
    if !bool::from(id_ok & secret_ok) {
        return Err(ApiError::Forbidden);
    }

    Ok(())
}

#[axum::debug_handler]
pub async fn sign_url(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<SignResponse>, ApiError> {
    // An absent body counts as an empty request, not malformed JSON.
    let raw = if body.trim().is_empty() { "{}" } else { &body };
    let request: SignRequest = serde_json::from_str(raw)
        .map_err(|_| ApiError::InvalidInput("Invalid JSON".to_string()))?;

    authenticate(&headers, &state).await?;

    if request.url.is_empty() {
        return Err(ApiError::InvalidInput("Missing url parameter".to_string()));
    }

    let identity = state.secrets.get().await?;
    let ttl = Duration::from_secs(state.config.sign_ttl_secs);
    let signed_url =
        identity
            .signer
            .sign(&request.url, ttl, state.config.resource_pattern.as_deref())?;

    info!(url = %request.url, "Issued signed URL");
    Ok(Json(SignResponse { signed_url }))
}

#[axum::debug_handler]
pub async fn proxy_playlist(
    Extension(state): Extension<AppState>,
    AxumPath(key): AxumPath<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    match rewrite_playlist(&state, &key, &params, &headers).await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(err) => {
            // Whatever failed, the player gets an empty 500, never a
            // partial document.
            error!(%key, error = %err, "Playlist rewrite failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn rewrite_playlist(
    state: &AppState,
    key: &str,
    params: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<String, ApiError> {
    let raw = state.storage.read(key).await?;
    let document = String::from_utf8(raw)
        .map_err(|_| ApiError::InvalidInput("playlist is not valid UTF-8".to_string()))?;

    let protocol = headers
        .get(FORWARDED_PROTO_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");

    let ctx = RewriteContext {
        base: BaseContext::new(protocol, state.config.cdn_domain.clone(), key),
        forwarded_params: forwarded_sign_params(params, &state.config.sign_param_prefix),
        segment_ttl: Duration::from_secs(state.config.segment_ttl_secs),
        sign_manifests: state.config.sign_manifests,
    };

    let identity = state.secrets.get().await?;
    let rewriter = PlaylistRewriter::new(identity.signer.clone());
    rewriter.rewrite(&document, &ctx).await
}

pub async fn healthz() -> &'static str {
    "ok"
}

/// Rebuild the query string a trusted upstream asked us to carry along:
/// parameters named with the reserved prefix are stripped of it, re-encoded
/// and recombined, sorted by name so the result is stable.
fn forwarded_sign_params(params: &HashMap<String, String>, prefix: &str) -> String {
    let mut forwarded: Vec<(String, String)> = params
        .iter()
        .filter_map(|(name, value)| {
            name.strip_prefix(prefix).map(|stripped| {
                (
                    stripped.to_string(),
                    utf8_percent_encode(value, QUERY_VALUE).to_string(),
                )
            })
        })
        .collect();
    forwarded.sort();

    forwarded
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}
