//! Bybit spot orderbook channel decoder.
//!
//! The orderbook.50 topic sends a `type: "snapshot"` frame first, then
//! `type: "delta"` frames where quantity 0 removes a level:
//!
//! ```text
//! {
//!   "topic": "orderbook.50.BTCUSDT",
//!   "type": "delta",
//!   "data": {"s": "BTCUSDT", "b": [["70400", "0"]], "a": [["70410", "1.2"]]}
//! }
//! ```
//!
//! Subscribe confirmations and pongs arrive as `op` frames and are skipped,
//! as are frames for topics this connector did not subscribe to.

use serde::Deserialize;

use super::parse_levels;
use crate::error::ParseError;
use crate::orderbook::BookEvent;

#[derive(Debug, Deserialize)]
struct BybitFrame {
    op: Option<String>,
    topic: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<BybitBook>,
}

#[derive(Debug, Deserialize)]
struct BybitBook {
    #[serde(default)]
    b: Vec<Vec<String>>,
    #[serde(default)]
    a: Vec<Vec<String>>,
}

/// Decode one Bybit frame.
pub fn parse(text: &str) -> Result<BookEvent, ParseError> {
    let frame: BybitFrame = serde_json::from_str(text.trim())?;

    // Subscribe confirmations, pongs and other op responses.
    if frame.op.is_some() {
        return Ok(BookEvent::Control);
    }

    match frame.topic.as_deref() {
        Some(topic) if topic.starts_with("orderbook.") => {}
        _ => return Ok(BookEvent::Control),
    }

    let kind = frame.kind.ok_or(ParseError::MissingField("type"))?;
    let book = frame.data.ok_or(ParseError::MissingField("data"))?;
    let bids = parse_levels(&book.b)?;
    let asks = parse_levels(&book.a)?;

    match kind.as_str() {
        "snapshot" => Ok(BookEvent::Snapshot { bids, asks }),
        "delta" => Ok(BookEvent::Delta { bids, asks }),
        other => Err(ParseError::BadLevel(format!("unknown book type `{other}`"))),
    }
}
