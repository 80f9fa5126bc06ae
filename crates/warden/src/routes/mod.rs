//! HTTP route handlers for Warden.

use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod challenge;
mod health;
mod session;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/api/health", get(health::health))

        // Challenge flow
        .route("/api/challenge", get(challenge::get_challenge))
        .route("/api/validate", post(challenge::validate))

        // Session check/revoke (for the front door)
        .route(
            "/api/session",
            get(session::check_session).delete(session::revoke_session),
        )

        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))

        // Add shared state
        .with_state(state)
}
