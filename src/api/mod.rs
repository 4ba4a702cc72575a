//! Snapshot distribution surface: health/status endpoints, a one-shot book
//! endpoint, Prometheus metrics, and the streaming book subscription.

pub mod handlers;
pub mod routes;
pub mod stream;

pub use handlers::AppState;
pub use routes::create_router;
