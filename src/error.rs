//! Unified error types for the feed service.

use thiserror::Error;

/// Top-level error type for the feed service.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Exchange connector error.
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Venue message parse error.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The aggregator task is no longer running.
    #[error("aggregator unavailable")]
    AggregatorUnavailable,

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection lifecycle errors for one exchange connector.
///
/// Classified into recoverable errors, which drive the reconnect-with-backoff
/// path, and fatal errors, which stop the connector permanently.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// DNS resolution failed.
    #[error("dns resolution failed: {0}")]
    Resolve(#[source] std::io::Error),

    /// The resolver returned no addresses for the host.
    #[error("no addresses resolved for {0}")]
    NoAddress(String),

    /// TCP connect failed.
    #[error("tcp connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// TLS handshake or TLS stream error.
    #[error("tls error: {0}")]
    Tls(#[from] native_tls::Error),

    /// The TLS + WebSocket upgrade did not complete within the deadline.
    #[error("handshake deadline exceeded")]
    HandshakeTimeout,

    /// WebSocket protocol or transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The peer closed the connection.
    #[error("remote closed the connection: {reason}")]
    RemoteClosed {
        /// Close reason reported by the peer, if any.
        reason: String,
    },

    /// The message stream ended without a close frame.
    #[error("websocket stream ended")]
    StreamEnded,

    /// The venue endpoint URL could not be constructed.
    #[error("invalid endpoint url: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

impl ConnectorError {
    /// Whether this error should be retried with backoff.
    ///
    /// Transport-level failures (resolve, connect, TLS, handshake timeout,
    /// read/write, remote close) are transient. Malformed endpoint URLs and
    /// rejected upgrade requests point at configuration and stop the
    /// connector permanently.
    pub fn is_recoverable(&self) -> bool {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match self {
            Self::Resolve(_)
            | Self::NoAddress(_)
            | Self::Connect(_)
            | Self::Tls(_)
            | Self::HandshakeTimeout
            | Self::RemoteClosed { .. }
            | Self::StreamEnded => true,
            Self::WebSocket(err) => {
                !matches!(err, WsError::Url(_) | WsError::HttpFormat(_))
            }
            Self::InvalidEndpoint(_) => false,
        }
    }
}

/// Per-message parse errors from venue decoders.
///
/// Always recoverable at message granularity: the offending message is logged
/// and discarded, the connection and the local book stay untouched.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Malformed JSON payload.
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    /// A structurally valid message missing an expected field.
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),

    /// A price level that could not be decoded as (price, quantity).
    #[error("bad price level: {0}")]
    BadLevel(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, FeedError>;
