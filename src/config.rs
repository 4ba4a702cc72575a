//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::connector::BackoffPolicy;
use crate::venue::Venue;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Market Data ===
    /// Comma-separated list of exchange names to connect to.
    #[serde(default = "default_exchanges")]
    pub exchanges: String,

    /// Instrument symbol in concatenated form (e.g. BTCUSDT).
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Maximum number of price levels per side in published snapshots.
    #[serde(default = "default_depth_limit")]
    pub depth_limit: usize,

    // === Connection Lifecycle ===
    /// Deadline for the TLS + WebSocket handshake, in seconds.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_s: u64,

    /// Keepalive ping interval while streaming, in seconds.
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_s: u64,

    /// Initial reconnect backoff delay in milliseconds.
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    /// Maximum reconnect backoff delay in seconds.
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay_s: u64,

    /// Reconnect attempts before a connector stops permanently.
    #[serde(default = "default_reconnect_max_retries")]
    pub reconnect_max_retries: u32,

    // === Distribution ===
    /// HTTP/WebSocket server port for subscribers and ops endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Subscriber poll interval for new versions, in milliseconds.
    #[serde(default = "default_subscriber_poll_ms")]
    pub subscriber_poll_ms: u64,

    // === Logging ===
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_exchanges() -> String {
    "binance,okx,bitget,bybit".to_string()
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_depth_limit() -> usize {
    150
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_keepalive_interval() -> u64 {
    30
}

fn default_reconnect_initial_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay() -> u64 {
    30
}

fn default_reconnect_max_retries() -> u32 {
    10
}

fn default_port() -> u16 {
    8080
}

fn default_subscriber_poll_ms() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.is_empty() || !self.symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err("SYMBOL must be a non-empty alphanumeric pair like BTCUSDT".to_string());
        }

        if self.depth_limit == 0 {
            return Err("DEPTH_LIMIT must be at least 1".to_string());
        }

        if self.reconnect_max_retries == 0 {
            return Err("RECONNECT_MAX_RETRIES must be at least 1".to_string());
        }

        if self.subscriber_poll_ms == 0 {
            return Err("SUBSCRIBER_POLL_MS must be at least 1".to_string());
        }

        Ok(())
    }

    /// Parse the configured exchange list into known venues.
    ///
    /// Unknown names are logged as warnings and skipped; they never abort the
    /// process. Duplicates collapse to one connector.
    pub fn venues(&self) -> Vec<Venue> {
        let mut venues = Vec::new();

        for name in self.exchanges.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }

            match Venue::from_str(&name.to_lowercase()) {
                Ok(venue) if venues.contains(&venue) => {
                    warn!(exchange = name, "duplicate exchange entry, skipping");
                }
                Ok(venue) => venues.push(venue),
                Err(_) => {
                    warn!(exchange = name, "unknown exchange name, skipping");
                }
            }
        }

        venues
    }

    /// Reconnect backoff policy for connectors.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(self.reconnect_initial_ms),
            max: Duration::from_secs(self.reconnect_max_delay_s),
            multiplier: 2.0,
            max_retries: self.reconnect_max_retries,
        }
    }

    /// Handshake deadline as a duration.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_s)
    }

    /// Keepalive interval as a duration.
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_s)
    }

    /// Subscriber poll interval as a duration.
    pub fn subscriber_poll_interval(&self) -> Duration {
        Duration::from_millis(self.subscriber_poll_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchanges: default_exchanges(),
            symbol: default_symbol(),
            depth_limit: default_depth_limit(),
            handshake_timeout_s: default_handshake_timeout(),
            keepalive_interval_s: default_keepalive_interval(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_delay_s: default_reconnect_max_delay(),
            reconnect_max_retries: default_reconnect_max_retries(),
            port: default_port(),
            subscriber_poll_ms: default_subscriber_poll_ms(),
            rust_log: default_log_level(),
            verbose: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_sensible() {
        let config = Config::default();
        assert_eq!(config.depth_limit, 150);
        assert_eq!(config.reconnect_max_retries, 10);
        assert_eq!(config.reconnect_initial_ms, 1000);
        assert_eq!(config.subscriber_poll_ms, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn venues_skips_unknown_names() {
        let config = Config {
            exchanges: "binance,krakken,okx".to_string(),
            ..Config::default()
        };

        let venues = config.venues();
        assert_eq!(venues, vec![Venue::Binance, Venue::Okx]);
    }

    #[test]
    fn venues_collapses_duplicates() {
        let config = Config {
            exchanges: "bybit, bybit ,BYBIT".to_string(),
            ..Config::default()
        };

        assert_eq!(config.venues(), vec![Venue::Bybit]);
    }

    #[test]
    fn venues_accepts_mixed_case() {
        let config = Config {
            exchanges: "Binance,OKX".to_string(),
            ..Config::default()
        };

        assert_eq!(config.venues(), vec![Venue::Binance, Venue::Okx]);
    }

    #[test]
    fn validate_rejects_empty_symbol() {
        let config = Config {
            symbol: String::new(),
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_depth() {
        let config = Config {
            depth_limit: 0,
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }
}
