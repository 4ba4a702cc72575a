//! Per-venue order book state and its update semantics.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Single price level in an order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Aggregate resting quantity at this price.
    pub quantity: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Decoded venue message, ready to apply to a local book.
///
/// `Control` covers subscribe-acks, pings and pongs: recognized structurally
/// by the venue decoders and never applied to the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookEvent {
    /// Full replacement of both sides.
    Snapshot {
        /// New bid levels.
        bids: Vec<(Decimal, Decimal)>,
        /// New ask levels.
        asks: Vec<(Decimal, Decimal)>,
    },
    /// Incremental update; quantity 0 removes a level. An empty side means
    /// "no change to that side".
    Delta {
        /// Changed bid levels.
        bids: Vec<(Decimal, Decimal)>,
        /// Changed ask levels.
        asks: Vec<(Decimal, Decimal)>,
    },
    /// Keepalive or protocol acknowledgment; must not touch the book.
    Control,
}

/// L2 order book for one venue.
///
/// Bids iterate descending, asks ascending. Invariant: no stored level has
/// quantity <= 0. Mutated only by the owning connector's read loop.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
}

impl OrderBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a decoded event. `Control` is a no-op.
    pub fn apply(&mut self, event: &BookEvent) {
        match event {
            BookEvent::Snapshot { bids, asks } => self.apply_snapshot(bids, asks),
            BookEvent::Delta { bids, asks } => self.apply_delta(bids, asks),
            BookEvent::Control => {}
        }
    }

    /// Replace both sides with the levels of a full snapshot.
    ///
    /// Levels with quantity <= 0 in the snapshot are dropped rather than
    /// stored; prior levels absent from the snapshot disappear.
    pub fn apply_snapshot(&mut self, bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) {
        self.bids.clear();
        self.asks.clear();

        for &(price, quantity) in bids {
            if quantity > Decimal::ZERO {
                self.bids.insert(price, quantity);
            }
        }

        for &(price, quantity) in asks {
            if quantity > Decimal::ZERO {
                self.asks.insert(price, quantity);
            }
        }
    }

    /// Apply incremental level changes; quantity <= 0 removes the level.
    pub fn apply_delta(&mut self, bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) {
        for &(price, quantity) in bids {
            if quantity <= Decimal::ZERO {
                self.bids.remove(&price);
            } else {
                self.bids.insert(price, quantity);
            }
        }

        for &(price, quantity) in asks {
            if quantity <= Decimal::ZERO {
                self.asks.remove(&price);
            } else {
                self.asks.insert(price, quantity);
            }
        }
    }

    /// Bid levels in descending price order.
    pub fn bids(&self) -> impl Iterator<Item = (&Decimal, &Decimal)> {
        self.bids.iter().rev()
    }

    /// Ask levels in ascending price order.
    pub fn asks(&self) -> impl Iterator<Item = (&Decimal, &Decimal)> {
        self.asks.iter()
    }

    /// Get the best bid level.
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .iter()
            .next_back()
            .map(|(&price, &quantity)| PriceLevel::new(price, quantity))
    }

    /// Get the best ask level.
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks
            .iter()
            .next()
            .map(|(&price, &quantity)| PriceLevel::new(price, quantity))
    }

    /// Whether both sides are empty.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Number of levels as (bids, asks).
    pub fn depth(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    /// Convert to sorted price level vectors (bids descending, asks ascending).
    pub fn to_levels(&self) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        let bids = self
            .bids()
            .map(|(&price, &quantity)| PriceLevel::new(price, quantity))
            .collect();
        let asks = self
            .asks()
            .map(|(&price, &quantity)| PriceLevel::new(price, quantity))
            .collect();

        (bids, asks)
    }
}
