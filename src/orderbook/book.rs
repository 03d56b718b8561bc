//! Local replica of one pair's book.
//!
//! Uses `BTreeMap` so both sides stay sorted: asks ascending, bids
//! descending through `Reverse`.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::Level;
use super::checksum::{self, Precision};
use crate::models::book::{BookSnapshot, BookUpdate, LevelDelta};
use crate::{LinkError, Result};

/// Order book for a single pair.
#[derive(Debug, Clone)]
pub struct OrderBook {
    pair: String,
    depth: usize,
    asks: BTreeMap<Decimal, Level>,
    bids: BTreeMap<Reverse<Decimal>, Level>,
    /// Precision of the last level received, used for the checksum.
    precision: Option<Precision>,
    /// Latest level timestamp seen.
    last_updated: Decimal,
}

impl OrderBook {
    /// Builds a book from a snapshot, truncated to `depth` levels per side.
    pub fn from_snapshot(pair: &str, depth: usize, snapshot: &BookSnapshot) -> Self {
        let mut book = Self {
            pair: pair.to_string(),
            depth,
            asks: BTreeMap::new(),
            bids: BTreeMap::new(),
            precision: None,
            last_updated: Decimal::ZERO,
        };

        for delta in &snapshot.asks {
            book.apply_ask(delta);
        }
        for delta in &snapshot.bids {
            book.apply_bid(delta);
        }
        book.truncate();
        book
    }

    /// Applies an incremental update and verifies its checksum.
    ///
    /// Ask deltas are applied before bid deltas. The checksum precision is
    /// taken from the last delta in the frame; an update without deltas
    /// reuses the previous precision.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ChecksumMismatch`] if the resulting top of book
    /// does not hash to the update's `c` value. The book is left in its
    /// post-update state and must be discarded by the caller.
    pub fn apply_update(&mut self, update: &BookUpdate) -> Result<()> {
        for delta in &update.asks {
            self.apply_ask(delta);
        }
        for delta in &update.bids {
            self.apply_bid(delta);
        }
        self.truncate();

        let computed = self.checksum();
        if computed != update.checksum {
            return Err(LinkError::ChecksumMismatch {
                pair: self.pair.clone(),
                computed,
                expected: update.checksum,
            });
        }
        Ok(())
    }

    fn apply_ask(&mut self, delta: &LevelDelta) {
        if delta.amount.is_zero() {
            self.asks.remove(&delta.price);
        } else {
            self.asks.insert(delta.price, Level::from(delta));
        }
        self.track(delta);
    }

    fn apply_bid(&mut self, delta: &LevelDelta) {
        if delta.amount.is_zero() {
            self.bids.remove(&Reverse(delta.price));
        } else {
            self.bids.insert(Reverse(delta.price), Level::from(delta));
        }
        self.track(delta);
    }

    fn track(&mut self, delta: &LevelDelta) {
        self.precision = Some(Precision::from_texts(&delta.price_text, &delta.amount_text));
        if delta.timestamp > self.last_updated {
            self.last_updated = delta.timestamp;
        }
    }

    fn truncate(&mut self) {
        while self.asks.len() > self.depth {
            self.asks.pop_last();
        }
        while self.bids.len() > self.depth {
            self.bids.pop_last();
        }
    }

    /// Checksum of the current top of book at the tracked precision.
    pub fn checksum(&self) -> u32 {
        let precision = self
            .precision
            .or_else(|| self.best_ask().or(self.best_bid()).map(|l| Precision::from_level(&l)))
            .unwrap_or(Precision {
                price: 0,
                amount: 0,
            });
        self.checksum_with(precision)
    }

    /// Checksum of the current top of book at an explicit precision.
    pub fn checksum_with(&self, precision: Precision) -> u32 {
        checksum::compute(self.asks.values(), self.bids.values(), precision)
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    /// Subscribed depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn last_updated(&self) -> Decimal {
        self.last_updated
    }

    /// Asks, best (lowest) first.
    pub fn asks(&self) -> impl Iterator<Item = &Level> {
        self.asks.values()
    }

    /// Bids, best (highest) first.
    pub fn bids(&self) -> impl Iterator<Item = &Level> {
        self.bids.values()
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks.first_key_value().map(|(_, level)| *level)
    }

    pub fn best_bid(&self) -> Option<Level> {
        self.bids.first_key_value().map(|(_, level)| *level)
    }

    /// Best ask minus best bid.
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        Some((self.best_ask()?.price + self.best_bid()?.price) / Decimal::TWO)
    }

    /// Top `n` levels per side as `(asks, bids)`.
    pub fn top(&self, n: usize) -> (Vec<Level>, Vec<Level>) {
        (
            self.asks.values().take(n).copied().collect(),
            self.bids.values().take(n).copied().collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.asks.is_empty() && self.bids.is_empty()
    }
}
