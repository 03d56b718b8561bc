//! Order book manager
//!
//! Owns the books of every subscribed pair. The consumer task is the only
//! writer; any task may read a copy through [`OrderBookManager::get`].

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::{debug, error};

use super::OrderBook;
use crate::models::book::{BookSnapshot, BookUpdate};
use crate::{LinkError, Result};

/// Manages order books for multiple pairs.
#[derive(Debug, Default)]
pub struct OrderBookManager {
    books: RwLock<HashMap<String, OrderBook>>,
}

impl OrderBookManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the book for `pair` wholesale.
    pub fn apply_snapshot(&self, pair: &str, depth: usize, snapshot: &BookSnapshot) -> OrderBook {
        let book = OrderBook::from_snapshot(pair, depth, snapshot);
        debug!(
            pair,
            asks = snapshot.asks.len(),
            bids = snapshot.bids.len(),
            "Applied book snapshot"
        );
        let mut books = self.books.write().unwrap_or_else(PoisonError::into_inner);
        books.insert(pair.to_string(), book.clone());
        book
    }

    /// Applies an update to the book for `pair` and returns a copy of the
    /// result.
    ///
    /// # Errors
    ///
    /// - [`LinkError::ChecksumMismatch`] if verification fails; the book is
    ///   removed and must be rebuilt from a fresh snapshot
    /// - [`LinkError::MalformedMessage`] if no snapshot was received yet
    pub fn apply_update(&self, pair: &str, update: &BookUpdate) -> Result<OrderBook> {
        let mut books = self.books.write().unwrap_or_else(PoisonError::into_inner);
        let book = books.get_mut(pair).ok_or_else(|| {
            LinkError::MalformedMessage(format!("book update for {pair} before snapshot"))
        })?;

        match book.apply_update(update) {
            Ok(()) => Ok(book.clone()),
            Err(err) => {
                error!(pair, error = %err, "Discarding order book");
                books.remove(pair);
                Err(err)
            }
        }
    }

    /// Returns a copy of the book for `pair`.
    pub fn get(&self, pair: &str) -> Option<OrderBook> {
        let books = self.books.read().unwrap_or_else(PoisonError::into_inner);
        books.get(pair).cloned()
    }

    /// Drops the book for `pair`.
    pub fn remove(&self, pair: &str) -> Option<OrderBook> {
        let mut books = self.books.write().unwrap_or_else(PoisonError::into_inner);
        books.remove(pair)
    }

    /// Drops every book.
    pub fn clear(&self) {
        let mut books = self.books.write().unwrap_or_else(PoisonError::into_inner);
        books.clear();
    }

    /// Pairs with a synchronized book.
    pub fn pairs(&self) -> Vec<String> {
        let books = self.books.read().unwrap_or_else(PoisonError::into_inner);
        books.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::book::LevelDelta;

    fn delta(price: &str, amount: &str) -> LevelDelta {
        LevelDelta {
            price: price.parse().unwrap(),
            amount: amount.parse().unwrap(),
            timestamp: dec!(1534614248.123678),
            price_text: price.to_string(),
            amount_text: amount.to_string(),
            republish: false,
        }
    }

    #[test]
    fn update_before_snapshot_is_rejected() {
        let manager = OrderBookManager::new();
        let update = BookUpdate {
            asks: vec![delta("1.0", "1.0")],
            bids: Vec::new(),
            checksum: 0,
        };
        assert!(matches!(
            manager.apply_update("XBT/USD", &update),
            Err(LinkError::MalformedMessage(_))
        ));
    }

    #[test]
    fn checksum_mismatch_discards_book() {
        let manager = OrderBookManager::new();
        let snapshot = BookSnapshot {
            asks: vec![delta("5541.30000", "2.50700000")],
            bids: vec![delta("5541.20000", "1.52900000")],
        };
        manager.apply_snapshot("XBT/USD", 10, &snapshot);
        assert_eq!(manager.pairs(), vec!["XBT/USD".to_string()]);

        let update = BookUpdate {
            asks: vec![delta("5541.40000", "1.00000000")],
            bids: Vec::new(),
            checksum: 42,
        };
        assert!(matches!(
            manager.apply_update("XBT/USD", &update),
            Err(LinkError::ChecksumMismatch { .. })
        ));
        assert!(manager.get("XBT/USD").is_none());
    }
}
