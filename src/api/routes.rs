//! HTTP API route definitions.

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{book, health, prometheus, ready, status, AppState};
use super::stream::subscribe_book;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Ops endpoints
        .route("/api/v1/status", get(status))
        .route("/api/v1/book", get(book))
        .route("/metrics", get(prometheus))
        // Streaming book subscription
        .route("/ws/book", get(subscribe_book))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
