//! Streaming book subscription over WebSocket.
//!
//! Each subscriber session polls the atomic version counter; when it moves
//! past the session's last seen version, the latest snapshot is fetched
//! through the aggregator queue and written out. Delivery is latest-wins: a
//! slow subscriber skips superseded snapshots instead of queueing them.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{debug, error};

use super::handlers::AppState;
use crate::metrics;

/// Subscription query parameters.
#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    /// Requested symbol; must match the served symbol when present.
    pub symbol: Option<String>,
}

/// WebSocket upgrade handler for `/ws/book`.
pub async fn subscribe_book(
    State(state): State<AppState>,
    Query(params): Query<SubscribeParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if !symbol_matches(&state.symbol, params.symbol.as_deref()) {
        let requested = params.symbol.unwrap_or_default();
        return (
            StatusCode::NOT_FOUND,
            format!("unknown symbol {requested}, serving {}", state.symbol),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| stream_session(state, socket))
        .into_response()
}

/// A subscription with no explicit symbol gets the served one.
fn symbol_matches(served: &str, requested: Option<&str>) -> bool {
    requested.map_or(true, |symbol| symbol.eq_ignore_ascii_case(served))
}

/// One subscriber session. Ends when the client disconnects, a write fails,
/// or the aggregator goes away; nothing is retried for a dead session.
async fn stream_session(state: AppState, mut socket: WebSocket) {
    metrics::inc_subscriber_sessions();
    debug!("Subscriber session opened");

    let mut last_seen = 0u64;

    loop {
        if state.aggregator.version() > last_seen {
            let snapshot = match state.aggregator.snapshot().await {
                Ok(snapshot) => snapshot,
                Err(_) => break,
            };

            let payload = match serde_json::to_string(&*snapshot) {
                Ok(payload) => payload,
                Err(err) => {
                    error!(error = %err, "Failed to encode snapshot");
                    break;
                }
            };

            if socket.send(Message::Text(payload)).await.is_err() {
                break;
            }

            // The snapshot may already be newer than the version we polled;
            // tracking its own stamp skips the duplicate write.
            last_seen = snapshot.version;
            metrics::inc_snapshots_streamed();
        } else {
            // Bounded wait before the next poll, watching for disconnect.
            tokio::select! {
                _ = tokio::time::sleep(state.poll_interval) => {}
                received = socket.recv() => {
                    match received {
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        _ => {}
                    }
                }
            }
        }
    }

    debug!(last_seen, "Subscriber session ended");
}
