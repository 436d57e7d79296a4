use crate::signer::SignError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Request-level failures with their HTTP mapping
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing client credentials")]
    Unauthenticated,

    #[error("Invalid client credentials")]
    Forbidden,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    #[error("Storage backend failure")]
    Storage(#[source] opendal::Error),

    #[error("Signing key is unusable: {0}")]
    InvalidKey(String),

    #[error("Upstream dependency failure: {0}")]
    Upstream(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Storage(_) | ApiError::InvalidKey(_) | ApiError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            // Internal detail stays internal; the client gets an empty body.
            return status.into_response();
        }
        (status, self.to_string()).into_response()
    }
}

impl From<SignError> for ApiError {
    fn from(err: SignError) -> Self {
        match err {
            SignError::InvalidKey(msg) => ApiError::InvalidKey(msg),
            SignError::InvalidInput(field) => ApiError::InvalidInput(format!("Missing {field}")),
            SignError::Clock => {
                ApiError::Upstream("system clock is before the unix epoch".to_string())
            }
        }
    }
}
