//! Cross-venue consolidation and published snapshots.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::book::{OrderBook, PriceLevel};

/// Per-price sum of quantities across all contributing venues.
///
/// Rebuilt from scratch on every consolidation cycle rather than patched
/// incrementally: a venue removing a price level must also vanish from the
/// sum without any cross-venue delete tracking.
#[derive(Debug, Clone, Default)]
pub struct ConsolidatedBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
}

impl ConsolidatedBook {
    /// Create an empty consolidated book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all accumulated levels.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    /// Add one venue's book into the per-price sums.
    pub fn absorb(&mut self, book: &OrderBook) {
        for (&price, &quantity) in book.bids() {
            *self.bids.entry(price).or_insert(Decimal::ZERO) += quantity;
        }
        for (&price, &quantity) in book.asks() {
            *self.asks.entry(price).or_insert(Decimal::ZERO) += quantity;
        }
    }

    /// Consolidated quantity at a bid price, if present.
    pub fn bid_quantity(&self, price: Decimal) -> Option<Decimal> {
        self.bids.get(&price).copied()
    }

    /// Consolidated quantity at an ask price, if present.
    pub fn ask_quantity(&self, price: Decimal) -> Option<Decimal> {
        self.asks.get(&price).copied()
    }

    /// Build an immutable depth-limited snapshot of the current state.
    ///
    /// Takes at most `depth_limit` levels per side: bids highest-first, asks
    /// lowest-first.
    pub fn snapshot(&self, symbol: &str, version: u64, depth_limit: usize) -> BookSnapshot {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth_limit)
            .map(|(&price, &quantity)| PriceLevel::new(price, quantity))
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth_limit)
            .map(|(&price, &quantity)| PriceLevel::new(price, quantity))
            .collect();

        BookSnapshot {
            timestamp: OffsetDateTime::now_utc(),
            version,
            symbol: symbol.to_string(),
            bids,
            asks,
        }
    }
}

/// Immutable, version-stamped consolidated book view handed to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// When this snapshot was built.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Consolidation cycle that produced it.
    pub version: u64,
    /// Instrument symbol being served.
    pub symbol: String,
    /// Depth-limited bid levels, highest price first.
    pub bids: Vec<PriceLevel>,
    /// Depth-limited ask levels, lowest price first.
    pub asks: Vec<PriceLevel>,
}

impl BookSnapshot {
    /// An empty snapshot at version 0, published before the first cycle.
    pub fn empty(symbol: &str) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            version: 0,
            symbol: symbol.to_string(),
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Get the best bid level.
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Get the best ask level.
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Get the spread between best ask and best bid.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }
}
