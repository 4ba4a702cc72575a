//! Binance partial depth stream decoder.
//!
//! Frames look like:
//!
//! ```text
//! {
//!   "lastUpdateId": 160,
//!   "bids": [["0.0024", "10"]],
//!   "asks": [["0.0026", "100"]]
//! }
//! ```
//!
//! Levels are applied in delta mode: quantity 0 removes the price. Pong
//! payloads arrive as bare text and are skipped.

use serde::Deserialize;

use super::parse_levels;
use crate::error::ParseError;
use crate::orderbook::BookEvent;

#[derive(Debug, Deserialize)]
struct DepthFrame {
    #[serde(rename = "lastUpdateId")]
    #[allow(dead_code)]
    last_update_id: Option<u64>,
    bids: Option<Vec<Vec<String>>>,
    asks: Option<Vec<Vec<String>>>,
}

/// Decode one Binance frame.
pub fn parse(text: &str) -> Result<BookEvent, ParseError> {
    let trimmed = text.trim();
    if trimmed.starts_with("pong") {
        return Ok(BookEvent::Control);
    }

    let frame: DepthFrame = serde_json::from_str(trimmed)?;

    match (frame.bids, frame.asks) {
        (Some(bids), Some(asks)) => Ok(BookEvent::Delta {
            bids: parse_levels(&bids)?,
            asks: parse_levels(&asks)?,
        }),
        // Frames without both sides ({"pong":true}, {"result":null,"id":1}...)
        _ => Ok(BookEvent::Control),
    }
}
