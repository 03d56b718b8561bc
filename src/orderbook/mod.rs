//! Order book module
//!
//! Maintains checksum-verified local replicas of the exchange's books from
//! `book-*` snapshots and updates.

mod book;
pub mod checksum;
mod manager;

pub use book::OrderBook;
pub use checksum::Precision;
pub use manager::OrderBookManager;

use rust_decimal::Decimal;

use crate::models::book::LevelDelta;

/// A single level in the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    pub price: Decimal,
    pub amount: Decimal,
    pub timestamp: Decimal,
}

impl From<&LevelDelta> for Level {
    fn from(delta: &LevelDelta) -> Self {
        Self {
            price: delta.price,
            amount: delta.amount,
            timestamp: delta.timestamp,
        }
    }
}
