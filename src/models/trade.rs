//! Trade channel models.
//!
//! Each trade is a 6-element array:
//! `[price, volume, time, side, orderType, misc]`.

use rust_decimal::Decimal;
use serde_json::Value;

use super::wire::{decimal_at, fixed_array, str_at};
use crate::{LinkError, Result};

const TRADE_FIELDS: usize = 6;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    fn from_wire(code: &str) -> Result<Self> {
        match code {
            "b" => Ok(Side::Buy),
            "s" => Ok(Side::Sell),
            other => Err(LinkError::MalformedMessage(format!(
                "unknown trade side {other:?}"
            ))),
        }
    }
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub price: Decimal,
    pub volume: Decimal,
    /// Seconds since epoch with microsecond decimals.
    pub time: Decimal,
    pub side: Side,
    /// `"m"` for market, `"l"` for limit.
    pub order_type: String,
    pub misc: String,
}

impl Trade {
    fn from_entry(entry: &Value) -> Result<Self> {
        let items = fixed_array(entry, "trade", TRADE_FIELDS)?;
        Ok(Trade {
            price: decimal_at(items, 0, "trade")?,
            volume: decimal_at(items, 1, "trade")?,
            time: decimal_at(items, 2, "trade")?,
            side: Side::from_wire(str_at(items, 3, "trade")?)?,
            order_type: str_at(items, 4, "trade")?.to_string(),
            misc: str_at(items, 5, "trade")?.to_string(),
        })
    }
}

/// Decodes a trade payload: an array of trade entries.
///
/// # Errors
///
/// Returns [`LinkError::LengthMismatch`] if any entry does not have exactly
/// six elements, or [`LinkError::MalformedMessage`] for bad values.
pub fn parse_trades(payload: &Value) -> Result<Vec<Trade>> {
    let entries = payload
        .as_array()
        .ok_or_else(|| LinkError::MalformedMessage("trade payload is not an array".into()))?;
    entries.iter().map(Trade::from_entry).collect()
}
