//! `openOrders` channel models.
//!
//! The first frame after subscribing lists every open order in full; later
//! frames carry only the fields that changed (typically `status`,
//! `vol_exec`, `cost`), so every field is optional.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::wire::keyed_entries;
use crate::Result;

/// Human-readable order description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderDescription {
    pub pair: String,
    #[serde(rename = "type")]
    pub side: String,
    pub ordertype: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub price2: Option<Decimal>,
    #[serde(default)]
    pub leverage: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub close: Option<String>,
}

/// Full or partial state of one order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OpenOrder {
    /// `pending`, `open`, `closed`, `canceled` or `expired`.
    pub status: Option<String>,
    pub refid: Option<String>,
    pub userref: Option<i64>,
    pub opentm: Option<Decimal>,
    pub descr: Option<OrderDescription>,
    pub vol: Option<Decimal>,
    pub vol_exec: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub avg_price: Option<Decimal>,
    pub stopprice: Option<Decimal>,
    pub limitprice: Option<Decimal>,
    pub misc: Option<String>,
    pub oflags: Option<String>,
    pub reason: Option<String>,
}

/// Decodes an `openOrders` payload into `(txid, order)` pairs.
///
/// # Errors
///
/// Returns an error if the payload is not a list of keyed objects.
pub fn parse_open_orders(payload: &Value) -> Result<Vec<(String, OpenOrder)>> {
    keyed_entries(payload, "openOrders")
}
