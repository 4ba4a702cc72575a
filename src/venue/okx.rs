//! OKX books channel decoder.
//!
//! Data frames carry the full top of book each push:
//!
//! ```text
//! {
//!   "arg": {"channel": "books5", "instId": "BTC-USDT"},
//!   "data": [{"bids": [["70400", "1.5", "0", "3"]], "asks": [...], "ts": "..."}]
//! }
//! ```
//!
//! Applied as a full snapshot. Subscribe acks carry an `event` field and the
//! JSON ping is answered with a bare `pong` text frame; both are skipped.

use serde::Deserialize;

use super::parse_levels;
use crate::error::ParseError;
use crate::orderbook::BookEvent;

#[derive(Debug, Deserialize)]
struct OkxFrame {
    event: Option<String>,
    data: Option<Vec<OkxBook>>,
}

#[derive(Debug, Deserialize)]
struct OkxBook {
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
}

/// Decode one OKX frame.
pub fn parse(text: &str) -> Result<BookEvent, ParseError> {
    let trimmed = text.trim();
    if trimmed == "pong" {
        return Ok(BookEvent::Control);
    }

    let frame: OkxFrame = serde_json::from_str(trimmed)?;

    // Subscribe/unsubscribe/error acknowledgments.
    if frame.event.is_some() {
        return Ok(BookEvent::Control);
    }

    let Some(data) = frame.data else {
        return Ok(BookEvent::Control);
    };
    let book = data.first().ok_or(ParseError::MissingField("data[0]"))?;

    Ok(BookEvent::Snapshot {
        bids: parse_levels(&book.bids)?,
        asks: parse_levels(&book.asks)?,
    })
}
