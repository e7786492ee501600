//! Axum router for the intake endpoints.

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{health, receive_callback, receive_inbound, IntakeState};

/// Routes without state or middleware.
pub fn intake_routes() -> Router<IntakeState> {
    Router::new()
        .route("/events/inbound", post(receive_inbound))
        .route("/callbacks", post(receive_callback))
        .route("/health", get(health))
}

/// Complete intake service: routes, request tracing and a request timeout.
pub fn intake_router(state: IntakeState, request_timeout: Duration) -> Router {
    intake_routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
}
