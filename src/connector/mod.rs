//! Per-exchange connection state machine.
//!
//! One connector per configured venue. Each runs the same lifecycle:
//! resolve, TCP connect, TLS handshake (SNI + peer verification), WebSocket
//! upgrade under a handshake deadline, optional subscribe, then the read loop
//! with venue-specific keepalive. Any recoverable error tears the connection
//! down and schedules a reconnect with jittered exponential backoff; fatal
//! errors and an exhausted retry budget stop the connector permanently. A
//! stopped connector's book stays frozen in the consolidation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde::Serialize;
use strum::Display;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{client_async, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::aggregator::AggregatorHandle;
use crate::error::ConnectorError;
use crate::metrics;
use crate::orderbook::{BookEvent, OrderBook};
use crate::venue::{Keepalive, Venue};

type TlsWebSocket = WebSocketStream<tokio_native_tls::TlsStream<TcpStream>>;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Created, not yet started.
    Idle,
    /// Resolving the venue host.
    Resolving,
    /// Opening the TCP connection.
    Connecting,
    /// Performing the TLS client handshake.
    TlsHandshake,
    /// Performing the WebSocket upgrade.
    ProtocolHandshake,
    /// Writing the venue subscribe message.
    Subscribing,
    /// In the read loop, receiving data frames.
    Streaming,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
    /// Permanently stopped: fatal error or retry budget exhausted.
    Stopped,
}

/// Operator-visible status of one connector.
#[derive(Debug, Clone, Serialize)]
pub struct VenueStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Reconnect attempts since start.
    pub retries: u32,
    /// Most recent error, if any.
    pub last_error: Option<String>,
}

impl VenueStatus {
    fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            retries: 0,
            last_error: None,
        }
    }
}

/// Shared per-venue status registry backing the status endpoint.
pub type StatusBoard = Arc<DashMap<Venue, VenueStatus>>;

/// Reconnect backoff policy.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound on any single delay.
    pub max: Duration,
    /// Exponential growth factor between retries.
    pub multiplier: f64,
    /// Retries before the connector stops permanently.
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1000),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            max_retries: 10,
        }
    }
}

impl BackoffPolicy {
    /// Capped exponential delay for the given retry number (1-based),
    /// before jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(exponent as i32);
        self.max.min(Duration::from_secs_f64(scaled))
    }

    /// Delay for the given retry, jittered uniformly in [0.8, 1.2].
    pub fn delay_for(&self, retry: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        self.base_delay(retry).mul_f64(jitter)
    }
}

/// Drives one venue's connection and owns its local book entry.
pub struct ExchangeConnector {
    venue: Venue,
    host: String,
    port: u16,
    path: String,
    symbol: String,
    keepalive: Keepalive,
    keepalive_interval: Duration,
    handshake_timeout: Duration,
    policy: BackoffPolicy,
    retries: u32,
    books: Arc<DashMap<Venue, OrderBook>>,
    aggregator: AggregatorHandle,
    status: StatusBoard,
}

impl ExchangeConnector {
    /// Create a connector for `venue`, registering its book and status entry.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        venue: Venue,
        symbol: String,
        books: Arc<DashMap<Venue, OrderBook>>,
        aggregator: AggregatorHandle,
        status: StatusBoard,
        policy: BackoffPolicy,
        keepalive_interval: Duration,
        handshake_timeout: Duration,
    ) -> Self {
        let spec = venue.spec();
        books.entry(venue).or_default();
        status.insert(venue, VenueStatus::new());

        Self {
            venue,
            host: spec.host.to_string(),
            port: spec.port,
            path: venue.path(&symbol),
            symbol,
            keepalive: spec.keepalive,
            keepalive_interval,
            handshake_timeout,
            policy,
            retries: 0,
            books,
            aggregator,
            status,
        }
    }

    /// Override the venue's default endpoint (testnets, local fixtures).
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Run the connection lifecycle until a permanent stop.
    ///
    /// The retry counter is deliberately not reset on successful reads: a
    /// venue that keeps flapping exhausts its budget and stops rather than
    /// churning forever. It resets only with a fresh connector (restart).
    pub async fn run(mut self) {
        info!(venue = %self.venue, host = %self.host, "Starting connector");

        loop {
            let err = match self.connect_and_stream().await {
                Err(err) => err,
                // The read loop only exits through an error.
                Ok(()) => ConnectorError::StreamEnded,
            };

            self.record_error(&err);

            if !err.is_recoverable() {
                error!(venue = %self.venue, error = %err, "Fatal connector error, stopping");
                self.stop();
                return;
            }

            self.retries += 1;
            if self.retries > self.policy.max_retries {
                error!(
                    venue = %self.venue,
                    retries = self.retries - 1,
                    "Retry budget exhausted, stopping; last book stays frozen"
                );
                self.stop();
                return;
            }

            let delay = self.policy.delay_for(self.retries);
            warn!(
                venue = %self.venue,
                error = %err,
                retry = self.retries,
                delay_ms = delay.as_millis(),
                "Reconnecting after delay"
            );
            self.set_state(ConnectionState::Reconnecting);
            metrics::inc_ws_reconnects(self.venue);

            tokio::time::sleep(delay).await;
        }
    }

    /// One full connection attempt: handshakes, subscribe, then the read
    /// loop. Returns only on error.
    async fn connect_and_stream(&self) -> Result<(), ConnectorError> {
        self.set_state(ConnectionState::Resolving);
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(ConnectorError::Resolve)?;
        let addr = addrs
            .next()
            .ok_or_else(|| ConnectorError::NoAddress(self.host.clone()))?;

        self.set_state(ConnectionState::Connecting);
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(ConnectorError::Connect)?;
        tcp.set_nodelay(true).map_err(ConnectorError::Connect)?;

        let endpoint = Url::parse(&format!("wss://{}:{}{}", self.host, self.port, self.path))?;

        // One deadline covers TLS + upgrade; leaving this scope on success is
        // what guarantees the timer can never fire against a live connection.
        let mut ws = match timeout(self.handshake_timeout, self.handshake(endpoint, tcp)).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectorError::HandshakeTimeout),
        };

        if let Some(subscribe) = self.venue.subscribe_message(&self.symbol) {
            self.set_state(ConnectionState::Subscribing);
            ws.send(Message::Text(subscribe)).await?;
            debug!(venue = %self.venue, "Subscribed");
        }

        self.set_state(ConnectionState::Streaming);
        info!(venue = %self.venue, symbol = %self.symbol, "Streaming market data");

        self.read_loop(&mut ws).await
    }

    /// TLS client handshake with SNI and peer verification, then the
    /// WebSocket upgrade.
    async fn handshake(&self, endpoint: Url, tcp: TcpStream) -> Result<TlsWebSocket, ConnectorError> {
        self.set_state(ConnectionState::TlsHandshake);
        let connector = tokio_native_tls::TlsConnector::from(native_tls::TlsConnector::new()?);
        let tls = connector.connect(&self.host, tcp).await?;

        self.set_state(ConnectionState::ProtocolHandshake);
        let (ws, _response) = client_async(endpoint.as_str(), tls).await?;

        Ok(ws)
    }

    /// Read messages until an error, pinging on the venue's keepalive
    /// interval.
    async fn read_loop(&self, ws: &mut TlsWebSocket) -> Result<(), ConnectorError> {
        let mut keepalive = tokio::time::interval_at(
            tokio::time::Instant::now() + self.keepalive_interval,
            self.keepalive_interval,
        );

        loop {
            tokio::select! {
                frame = ws.next() => {
                    let message = frame.ok_or(ConnectorError::StreamEnded)??;
                    self.handle_frame(message)?;
                }
                _ = keepalive.tick() => {
                    match self.keepalive {
                        Keepalive::FrameLevel => {
                            ws.send(Message::Ping(b"keep-alive".to_vec())).await?;
                        }
                        Keepalive::JsonPing => {
                            ws.send(Message::Text(r#"{"op": "ping"}"#.to_string())).await?;
                        }
                    }
                    debug!(venue = %self.venue, "Ping sent");
                }
            }
        }
    }

    /// Classify one frame: data frames go through the venue decoder into the
    /// book, keepalive traffic is skipped, close frames end the connection.
    fn handle_frame(&self, message: Message) -> Result<(), ConnectorError> {
        match message {
            Message::Text(text) => {
                self.handle_text(&text);
                Ok(())
            }
            Message::Ping(_) => {
                // tungstenite queues the pong automatically.
                debug!(venue = %self.venue, "Received ping");
                Ok(())
            }
            Message::Pong(_) => {
                debug!(venue = %self.venue, "Received pong");
                Ok(())
            }
            Message::Close(frame) => Err(ConnectorError::RemoteClosed {
                reason: frame
                    .map(|f| f.reason.to_string())
                    .unwrap_or_else(|| "no close frame".to_string()),
            }),
            _ => Ok(()),
        }
    }

    /// Decode and apply one text frame, then notify the aggregator.
    ///
    /// A message that fails to parse is logged and discarded; it never
    /// terminates the connection or touches the book.
    fn handle_text(&self, text: &str) {
        let started = Instant::now();
        metrics::inc_ws_messages_received(self.venue);

        match self.venue.parse(text) {
            Ok(BookEvent::Control) => {}
            Ok(event) => {
                if let Some(mut book) = self.books.get_mut(&self.venue) {
                    book.apply(&event);
                }
                self.aggregator.notify_book_changed(self.venue);
            }
            Err(err) => {
                metrics::inc_parse_errors(self.venue);
                warn!(venue = %self.venue, error = %err, "Discarding unparseable message");
            }
        }

        metrics::record_ws_message_latency(started);
    }

    fn set_state(&self, state: ConnectionState) {
        debug!(venue = %self.venue, state = %state, "Connection state");
        if let Some(mut status) = self.status.get_mut(&self.venue) {
            status.state = state;
            status.retries = self.retries;
        }
    }

    fn record_error(&self, err: &ConnectorError) {
        if let Some(mut status) = self.status.get_mut(&self.venue) {
            status.last_error = Some(err.to_string());
        }
    }

    fn stop(&self) {
        self.set_state(ConnectionState::Stopped);
        metrics::inc_connectors_stopped(self.venue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;

    #[test]
    fn base_delay_doubles_and_caps() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.base_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.base_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.base_delay(3), Duration::from_millis(4000));
        assert_eq!(policy.base_delay(6), Duration::from_millis(30000)); // capped
        assert_eq!(policy.base_delay(10), Duration::from_millis(30000));
    }

    #[test]
    fn first_retry_delay_is_jittered_around_initial() {
        let policy = BackoffPolicy::default();

        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!(
                delay >= Duration::from_millis(800) && delay <= Duration::from_millis(1200),
                "delay {delay:?} outside [800ms, 1200ms]"
            );
        }
    }

    #[test]
    fn jitter_never_exceeds_cap_by_more_than_factor() {
        let policy = BackoffPolicy::default();

        for retry in 1..=12 {
            let delay = policy.delay_for(retry);
            assert!(delay <= Duration::from_secs(36)); // 30s * 1.2
        }
    }

    #[tokio::test]
    async fn handshake_against_non_tls_listener_is_recoverable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and immediately drop: the TLS handshake must fail.
            let _ = listener.accept().await;
        });

        let (aggregator, handle) = Aggregator::new("BTCUSDT".to_string(), 150);
        let books = aggregator.books();
        let status: StatusBoard = Arc::new(DashMap::new());

        let connector = ExchangeConnector::new(
            Venue::Okx,
            "BTCUSDT".to_string(),
            books,
            handle,
            status.clone(),
            BackoffPolicy::default(),
            Duration::from_secs(30),
            Duration::from_secs(2),
        )
        .with_endpoint("127.0.0.1", addr.port());

        let err = connector.connect_and_stream().await.unwrap_err();
        assert!(err.is_recoverable(), "unexpected fatal error: {err}");
    }

    #[tokio::test]
    async fn connect_refused_is_recoverable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // Port is now closed.

        let (aggregator, handle) = Aggregator::new("BTCUSDT".to_string(), 150);
        let books = aggregator.books();
        let status: StatusBoard = Arc::new(DashMap::new());

        let connector = ExchangeConnector::new(
            Venue::Binance,
            "BTCUSDT".to_string(),
            books,
            handle,
            status,
            BackoffPolicy::default(),
            Duration::from_secs(30),
            Duration::from_secs(2),
        )
        .with_endpoint("127.0.0.1", addr.port());

        let err = connector.connect_and_stream().await.unwrap_err();
        assert!(matches!(err, ConnectorError::Connect(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn new_connector_registers_book_and_status() {
        let (aggregator, handle) = Aggregator::new("BTCUSDT".to_string(), 150);
        let books = aggregator.books();
        let status: StatusBoard = Arc::new(DashMap::new());

        let _connector = ExchangeConnector::new(
            Venue::Bybit,
            "BTCUSDT".to_string(),
            books.clone(),
            handle,
            status.clone(),
            BackoffPolicy::default(),
            Duration::from_secs(30),
            Duration::from_secs(10),
        );

        assert!(books.contains_key(&Venue::Bybit));
        assert_eq!(
            status.get(&Venue::Bybit).unwrap().state,
            ConnectionState::Idle
        );
    }
}
