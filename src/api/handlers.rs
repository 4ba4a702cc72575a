//! HTTP API handlers.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::aggregator::AggregatorHandle;
use crate::connector::{StatusBoard, VenueStatus};
use crate::metrics;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle into the aggregation task.
    pub aggregator: AggregatorHandle,
    /// Per-venue connection status.
    pub status: StatusBoard,
    /// Instrument symbol being served.
    pub symbol: String,
    /// Subscriber poll interval for new versions.
    pub poll_interval: Duration,
}

impl AppState {
    /// Create app state around an aggregator handle.
    pub fn new(
        aggregator: AggregatorHandle,
        status: StatusBoard,
        symbol: String,
        poll_interval: Duration,
    ) -> Self {
        Self {
            aggregator,
            status,
            symbol,
            poll_interval,
        }
    }

    /// Ready once the first consolidation cycle has completed.
    pub fn is_ready(&self) -> bool {
        self.aggregator.version() > 0
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether at least one consolidation cycle has completed.
    pub ready: bool,
    /// Current consolidation version.
    pub version: u64,
}

/// Status response: the served symbol plus every venue's connection state.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Instrument symbol being served.
    pub symbol: String,
    /// Current consolidation version.
    pub version: u64,
    /// Per-venue connector status, keyed by venue name.
    pub venues: BTreeMap<String, VenueStatus>,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness handler - 200 after the first consolidation cycle, 503 before.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let response = ReadyResponse {
        ready: state.is_ready(),
        version: state.aggregator.version(),
    };

    if response.ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - per-venue connection states for operators.
///
/// This is where a permanently stopped connector is surfaced: its state reads
/// `stopped` with the error that exhausted it.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let venues = state
        .status
        .iter()
        .map(|entry| (entry.key().to_string(), entry.value().clone()))
        .collect();

    Json(StatusResponse {
        symbol: state.symbol.clone(),
        version: state.aggregator.version(),
        venues,
    })
}

/// One-shot consolidated book handler.
pub async fn book(State(state): State<AppState>) -> impl IntoResponse {
    match state.aggregator.snapshot().await {
        Ok(snapshot) => Json((*snapshot).clone()).into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "aggregator unavailable".to_string(),
        )
            .into_response(),
    }
}

/// Prometheus metrics handler.
pub async fn prometheus() -> impl IntoResponse {
    metrics::render()
}
