pub mod middleware;
pub mod routes;

// Re-export public types and functions
pub use middleware::{log_request_errors, proxy_auth};
pub use routes::{SignResponse, healthz, proxy_playlist, sign_url};
