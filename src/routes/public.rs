use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints that never consult the access policy.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        // The landing page is the section list; the gate there handles anonymous callers.
        .route("/", get(handlers::root_redirect))
        // GET /health
        // Used by load balancers; answers without touching storage.
        .route("/health", get(handlers::health))
}
