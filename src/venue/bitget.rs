//! Bitget books channel decoder.
//!
//! The books50 channel sends one `action: "snapshot"` frame on subscribe and
//! `action: "update"` deltas afterwards:
//!
//! ```text
//! {
//!   "action": "snapshot",
//!   "arg": {"instType": "SPOT", "channel": "books50", "instId": "BTCUSDT"},
//!   "data": [{"bids": [["70400", "1.5"]], "asks": [...], "ts": "..."}]
//! }
//! ```
//!
//! Subscribe acks carry `op`/`event` fields; the JSON ping is answered with a
//! bare `pong` text frame. Both are skipped.

use serde::Deserialize;

use super::parse_levels;
use crate::error::ParseError;
use crate::orderbook::BookEvent;

#[derive(Debug, Deserialize)]
struct BitgetFrame {
    op: Option<String>,
    event: Option<String>,
    action: Option<String>,
    data: Option<Vec<BitgetBook>>,
}

#[derive(Debug, Deserialize)]
struct BitgetBook {
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
}

/// Decode one Bitget frame.
pub fn parse(text: &str) -> Result<BookEvent, ParseError> {
    let trimmed = text.trim();
    if trimmed == "pong" {
        return Ok(BookEvent::Control);
    }

    let frame: BitgetFrame = serde_json::from_str(trimmed)?;

    if frame.op.is_some() || frame.event.is_some() {
        return Ok(BookEvent::Control);
    }

    let Some(action) = frame.action.as_deref() else {
        return Ok(BookEvent::Control);
    };

    let data = frame.data.ok_or(ParseError::MissingField("data"))?;
    let book = data.first().ok_or(ParseError::MissingField("data[0]"))?;
    let bids = parse_levels(&book.bids)?;
    let asks = parse_levels(&book.asks)?;

    match action {
        "snapshot" => Ok(BookEvent::Snapshot { bids, asks }),
        "update" => Ok(BookEvent::Delta { bids, asks }),
        _ => Ok(BookEvent::Control),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_snapshot_action() {
        let msg = r#"{
            "action": "snapshot",
            "arg": {"instType": "SPOT", "channel": "books50", "instId": "BTCUSDT"},
            "data": [{
                "bids": [["70400.0", "1.5"]],
                "asks": [["70410.0", "2.0"], ["70420.0", "1.0"]],
                "ts": "1697026784000"
            }]
        }"#;

        let event = parse(msg).unwrap();
        assert_eq!(
            event,
            BookEvent::Snapshot {
                bids: vec![(dec!(70400.0), dec!(1.5))],
                asks: vec![(dec!(70410.0), dec!(2.0)), (dec!(70420.0), dec!(1.0))],
            }
        );
    }

    #[test]
    fn parses_update_action_as_delta() {
        let msg = r#"{
            "action": "update",
            "arg": {"instType": "SPOT", "channel": "books50", "instId": "BTCUSDT"},
            "data": [{"bids": [["70400.0", "0"]], "asks": []}]
        }"#;

        let event = parse(msg).unwrap();
        assert_eq!(
            event,
            BookEvent::Delta {
                bids: vec![(dec!(70400.0), dec!(0))],
                asks: vec![],
            }
        );
    }

    #[test]
    fn subscribe_ack_is_control() {
        let msg = r#"{"event": "subscribe", "arg": {"channel": "books50", "instId": "BTCUSDT"}}"#;
        assert_eq!(parse(msg).unwrap(), BookEvent::Control);

        let msg = r#"{"op": "subscribe"}"#;
        assert_eq!(parse(msg).unwrap(), BookEvent::Control);
    }

    #[test]
    fn pong_is_control() {
        assert_eq!(parse("pong").unwrap(), BookEvent::Control);
    }

    #[test]
    fn snapshot_without_data_is_error() {
        let msg = r#"{"action": "snapshot"}"#;
        assert!(matches!(parse(msg), Err(ParseError::MissingField("data"))));
    }
}
