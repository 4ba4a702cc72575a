//! Venue strategy values: endpoints, subscribe messages, keepalive modes and
//! message decoders for each supported exchange.
//!
//! Venues differ only in these values; the connector state machine in
//! [`crate::connector`] is shared by all of them.

pub mod binance;
pub mod bitget;
pub mod bybit;
pub mod okx;

use rust_decimal::Decimal;
use serde::Serialize;
use strum::{Display, EnumIter, EnumString};

use crate::error::ParseError;
use crate::orderbook::BookEvent;

/// Supported exchanges. Config entries naming anything else are skipped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter, Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    /// Binance spot depth stream.
    Binance,
    /// OKX books channel.
    Okx,
    /// Bitget spot books channel.
    Bitget,
    /// Bybit spot orderbook channel.
    Bybit,
}

/// How a venue expects to be kept alive while streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keepalive {
    /// Transport-level WebSocket ping frame.
    FrameLevel,
    /// JSON `{"op":"ping"}` text message.
    JsonPing,
}

/// Static per-venue connection parameters.
#[derive(Debug, Clone, Copy)]
pub struct VenueSpec {
    /// WebSocket host.
    pub host: &'static str,
    /// WebSocket port.
    pub port: u16,
    /// Keepalive mechanism.
    pub keepalive: Keepalive,
}

const BINANCE: VenueSpec = VenueSpec {
    host: "stream.binance.com",
    port: 9443,
    keepalive: Keepalive::FrameLevel,
};

const OKX: VenueSpec = VenueSpec {
    host: "ws.okx.com",
    port: 8443,
    keepalive: Keepalive::JsonPing,
};

const BITGET: VenueSpec = VenueSpec {
    host: "ws.bitget.com",
    port: 443,
    keepalive: Keepalive::JsonPing,
};

const BYBIT: VenueSpec = VenueSpec {
    host: "stream.bybit.com",
    port: 443,
    keepalive: Keepalive::JsonPing,
};

impl Venue {
    /// Static connection parameters for this venue.
    pub fn spec(self) -> &'static VenueSpec {
        match self {
            Venue::Binance => &BINANCE,
            Venue::Okx => &OKX,
            Venue::Bitget => &BITGET,
            Venue::Bybit => &BYBIT,
        }
    }

    /// WebSocket path for the depth stream of `symbol`.
    pub fn path(self, symbol: &str) -> String {
        match self {
            Venue::Binance => format!("/ws/{}@depth20@100ms", symbol.to_lowercase()),
            Venue::Okx => "/ws/v5/public".to_string(),
            Venue::Bitget => "/v2/ws/public".to_string(),
            Venue::Bybit => "/v5/public/spot".to_string(),
        }
    }

    /// Explicit subscribe message, if the venue requires one.
    ///
    /// Binance encodes the subscription in the stream path and returns `None`.
    pub fn subscribe_message(self, symbol: &str) -> Option<String> {
        match self {
            Venue::Binance => None,
            Venue::Okx => Some(
                serde_json::json!({
                    "op": "subscribe",
                    "args": [{"channel": "books5", "instId": dashed_instrument(symbol)}]
                })
                .to_string(),
            ),
            Venue::Bitget => Some(
                serde_json::json!({
                    "op": "subscribe",
                    "args": [{"instType": "SPOT", "channel": "books50", "instId": symbol}]
                })
                .to_string(),
            ),
            Venue::Bybit => Some(
                serde_json::json!({
                    "op": "subscribe",
                    "args": [format!("orderbook.50.{symbol}")]
                })
                .to_string(),
            ),
        }
    }

    /// Decode one raw text frame into a [`BookEvent`].
    pub fn parse(self, text: &str) -> Result<BookEvent, ParseError> {
        match self {
            Venue::Binance => binance::parse(text),
            Venue::Okx => okx::parse(text),
            Venue::Bitget => bitget::parse(text),
            Venue::Bybit => bybit::parse(text),
        }
    }
}

/// Derive the dash-separated instrument id OKX uses (BTCUSDT -> BTC-USDT).
///
/// Falls back to the concatenated form when no known quote suffix matches.
pub fn dashed_instrument(symbol: &str) -> String {
    const QUOTES: [&str; 5] = ["USDT", "USDC", "USD", "BTC", "ETH"];

    for quote in QUOTES {
        if symbol.len() > quote.len() && symbol.ends_with(quote) {
            let base = &symbol[..symbol.len() - quote.len()];
            return format!("{base}-{quote}");
        }
    }

    symbol.to_string()
}

/// Decode venue `[price, quantity, ...]` string arrays into decimal pairs.
///
/// Levels may carry trailing elements (OKX appends order counts); only the
/// first two matter. Anything shorter or non-numeric is a parse error.
pub(crate) fn parse_levels(raw: &[Vec<String>]) -> Result<Vec<(Decimal, Decimal)>, ParseError> {
    raw.iter()
        .map(|level| {
            let [price, quantity, ..] = level.as_slice() else {
                return Err(ParseError::BadLevel(format!("{level:?}")));
            };
            let price = price
                .parse::<Decimal>()
                .map_err(|_| ParseError::BadLevel(format!("{level:?}")))?;
            let quantity = quantity
                .parse::<Decimal>()
                .map_err(|_| ParseError::BadLevel(format!("{level:?}")))?;
            Ok((price, quantity))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn venue_names_round_trip() {
        for venue in Venue::iter() {
            assert_eq!(Venue::from_str(&venue.to_string()), Ok(venue));
        }
    }

    #[test]
    fn unknown_venue_name_is_rejected() {
        assert!(Venue::from_str("coinbase").is_err());
    }

    #[test]
    fn binance_path_embeds_lowercase_symbol() {
        assert_eq!(Venue::Binance.path("BTCUSDT"), "/ws/btcusdt@depth20@100ms");
        assert!(Venue::Binance.subscribe_message("BTCUSDT").is_none());
    }

    #[test]
    fn okx_subscribes_with_dashed_instrument() {
        let msg = Venue::Okx.subscribe_message("BTCUSDT").unwrap();
        assert!(msg.contains("\"books5\""));
        assert!(msg.contains("BTC-USDT"));
    }

    #[test]
    fn bybit_subscribes_to_orderbook_topic() {
        let msg = Venue::Bybit.subscribe_message("BTCUSDT").unwrap();
        assert!(msg.contains("orderbook.50.BTCUSDT"));
    }

    #[test]
    fn dashed_instrument_handles_known_quotes() {
        assert_eq!(dashed_instrument("BTCUSDT"), "BTC-USDT");
        assert_eq!(dashed_instrument("ETHBTC"), "ETH-BTC");
        assert_eq!(dashed_instrument("WEIRD"), "WEIRD");
    }

    #[test]
    fn parse_levels_accepts_trailing_elements() {
        let raw = vec![vec![
            "70400.1".to_string(),
            "1.5".to_string(),
            "0".to_string(),
            "3".to_string(),
        ]];

        let levels = parse_levels(&raw).unwrap();
        assert_eq!(levels, vec![("70400.1".parse().unwrap(), "1.5".parse().unwrap())]);
    }

    #[test]
    fn parse_levels_rejects_short_or_bad_entries() {
        assert!(parse_levels(&[vec!["70400.1".to_string()]]).is_err());
        assert!(parse_levels(&[vec!["x".to_string(), "1".to_string()]]).is_err());
    }
}
