use crate::AppState;
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints that need no identity. Nothing here reads or writes blog content.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Used by monitoring and load balancer checks.
        .route("/health", get(|| async { "ok" }))
}
