//! Order book model: per-venue books and the consolidated view.

pub mod book;
pub mod consolidated;

pub use book::{BookEvent, OrderBook, PriceLevel};
pub use consolidated::{BookSnapshot, ConsolidatedBook};
