//! `ownTrades` channel models.
//!
//! Streams fills for the authenticated user's account. Frames carry a list
//! of `{trade_id: record}` objects and a monotonically increasing sequence.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::wire::keyed_entries;
use crate::Result;

/// A single fill.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OwnTrade {
    pub ordertxid: String,
    #[serde(default)]
    pub postxid: Option<String>,
    pub pair: String,
    pub time: Decimal,
    /// `"buy"` or `"sell"`.
    #[serde(rename = "type")]
    pub side: String,
    pub ordertype: String,
    pub price: Decimal,
    pub cost: Decimal,
    pub fee: Decimal,
    pub vol: Decimal,
    #[serde(default)]
    pub margin: Option<Decimal>,
    #[serde(default)]
    pub userref: Option<i64>,
}

/// Decodes an `ownTrades` payload into `(trade_id, fill)` pairs.
///
/// # Errors
///
/// Returns an error if the payload is not a list of keyed objects or a
/// record is missing a required field.
pub fn parse_own_trades(payload: &Value) -> Result<Vec<(String, OwnTrade)>> {
    keyed_entries(payload, "ownTrades")
}
