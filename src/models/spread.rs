//! Spread channel models.

use rust_decimal::Decimal;
use serde_json::Value;

use super::wire::{decimal_at, fixed_array};
use crate::Result;

/// Best bid/ask snapshot: `[bid, ask, timestamp, bidVolume, askVolume]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spread {
    pub bid: Decimal,
    pub ask: Decimal,
    pub time: Decimal,
    pub bid_volume: Decimal,
    pub ask_volume: Decimal,
}

impl Spread {
    /// Decodes a spread payload.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::LengthMismatch`](crate::LinkError::LengthMismatch)
    /// unless the payload has exactly five elements.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let items = fixed_array(payload, "spread", 5)?;
        Ok(Spread {
            bid: decimal_at(items, 0, "spread")?,
            ask: decimal_at(items, 1, "spread")?,
            time: decimal_at(items, 2, "spread")?,
            bid_volume: decimal_at(items, 3, "spread")?,
            ask_volume: decimal_at(items, 4, "spread")?,
        })
    }
}
