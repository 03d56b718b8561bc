//! OHLC candlestick channel models.
//!
//! Each update is a 9-element array:
//! `[time, etime, open, high, low, close, vwap, volume, count]`.

use rust_decimal::Decimal;
use serde_json::Value;

use super::wire::{decimal_at, fixed_array, u64_at};
use crate::Result;

const CANDLE_FIELDS: usize = 9;

/// A single OHLC candlestick bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    /// Time of the last update within the interval.
    pub time: Decimal,
    /// End time of the interval.
    pub end_time: Decimal,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Volume-weighted average price for this candle.
    pub vwap: Decimal,
    pub volume: Decimal,
    pub trades: u64,
}

impl Candle {
    /// Decodes an OHLC payload.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::LengthMismatch`](crate::LinkError::LengthMismatch)
    /// unless the payload has exactly nine elements.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let items = fixed_array(payload, "ohlc", CANDLE_FIELDS)?;
        Ok(Candle {
            time: decimal_at(items, 0, "ohlc")?,
            end_time: decimal_at(items, 1, "ohlc")?,
            open: decimal_at(items, 2, "ohlc")?,
            high: decimal_at(items, 3, "ohlc")?,
            low: decimal_at(items, 4, "ohlc")?,
            close: decimal_at(items, 5, "ohlc")?,
            vwap: decimal_at(items, 6, "ohlc")?,
            volume: decimal_at(items, 7, "ohlc")?,
            trades: u64_at(items, 8, "ohlc")?,
        })
    }
}

/// Extracts the interval from a data-frame channel name such as `"ohlc-5"`.
pub fn interval_from_channel_name(name: &str) -> Option<u32> {
    name.strip_prefix("ohlc-")?.parse().ok()
}
