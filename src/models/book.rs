//! Order book channel models.
//!
//! A snapshot payload is `{"as": [...], "bs": [...]}`. An update carries
//! `a` and/or `b` deltas plus the checksum `c`; when both sides change in
//! one frame the exchange may split them over two payload objects. Each
//! level is `[price, volume, timestamp]`, optionally followed by `"r"` for
//! a republished level.
//!
//! Levels keep the literal wire strings because the checksum precision is
//! derived from them.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::wire::str_at;
use crate::{LinkError, Result};

/// One price level as sent by the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelDelta {
    pub price: Decimal,
    /// Zero removes the level.
    pub amount: Decimal,
    pub timestamp: Decimal,
    pub price_text: String,
    pub amount_text: String,
    pub republish: bool,
}

impl LevelDelta {
    fn from_entry(entry: &Value) -> Result<Self> {
        let items = entry
            .as_array()
            .ok_or_else(|| LinkError::MalformedMessage("book level is not an array".into()))?;
        if !(3..=4).contains(&items.len()) {
            return Err(LinkError::LengthMismatch {
                kind: "book level",
                expected: 3,
                got: items.len(),
            });
        }

        let price_text = str_at(items, 0, "book level")?;
        let amount_text = str_at(items, 1, "book level")?;
        let timestamp = str_at(items, 2, "book level")?;
        let republish = match items.get(3) {
            None => false,
            Some(Value::String(flag)) if flag == "r" => true,
            Some(other) => {
                return Err(LinkError::MalformedMessage(format!(
                    "unexpected book level flag {other}"
                )));
            }
        };

        Ok(LevelDelta {
            price: parse_decimal(price_text)?,
            amount: parse_decimal(amount_text)?,
            timestamp: parse_decimal(timestamp)?,
            price_text: price_text.to_string(),
            amount_text: amount_text.to_string(),
            republish,
        })
    }
}

fn parse_decimal(text: &str) -> Result<Decimal> {
    Decimal::from_str(text)
        .map_err(|e| LinkError::MalformedMessage(format!("invalid decimal {text:?}: {e}")))
}

fn parse_side(object: &Map<String, Value>, key: &str) -> Result<Vec<LevelDelta>> {
    match object.get(key) {
        None => Ok(Vec::new()),
        Some(Value::Array(levels)) => levels.iter().map(LevelDelta::from_entry).collect(),
        Some(_) => Err(LinkError::MalformedMessage(format!(
            "book side {key:?} is not an array"
        ))),
    }
}

/// Full book replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct BookSnapshot {
    pub asks: Vec<LevelDelta>,
    pub bids: Vec<LevelDelta>,
}

/// Incremental book change.
#[derive(Debug, Clone, PartialEq)]
pub struct BookUpdate {
    pub asks: Vec<LevelDelta>,
    pub bids: Vec<LevelDelta>,
    /// CRC32 of the top ten levels after applying this update.
    pub checksum: u32,
}

/// A decoded `book-*` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum BookMessage {
    Snapshot(BookSnapshot),
    Update(BookUpdate),
}

/// Decodes the one or two payload objects of a book data frame.
///
/// # Errors
///
/// Returns [`LinkError::MalformedMessage`] if a payload is not an object,
/// an update has no checksum, or a level cannot be parsed.
pub fn parse_book(payloads: &[Value]) -> Result<BookMessage> {
    let mut asks = Vec::new();
    let mut bids = Vec::new();
    let mut checksum = None;
    let mut snapshot = false;

    for payload in payloads {
        let object = payload
            .as_object()
            .ok_or_else(|| LinkError::MalformedMessage("book payload is not an object".into()))?;

        if object.contains_key("as") || object.contains_key("bs") {
            snapshot = true;
            asks.extend(parse_side(object, "as")?);
            bids.extend(parse_side(object, "bs")?);
            continue;
        }

        asks.extend(parse_side(object, "a")?);
        bids.extend(parse_side(object, "b")?);
        if let Some(value) = object.get("c") {
            let text = value.as_str().ok_or_else(|| {
                LinkError::MalformedMessage("book checksum is not a string".into())
            })?;
            checksum = Some(text.parse::<u32>().map_err(|e| {
                LinkError::MalformedMessage(format!("invalid book checksum {text:?}: {e}"))
            })?);
        }
    }

    if snapshot {
        return Ok(BookMessage::Snapshot(BookSnapshot { asks, bids }));
    }

    let checksum = checksum
        .ok_or_else(|| LinkError::MalformedMessage("book update without checksum".into()))?;
    Ok(BookMessage::Update(BookUpdate {
        asks,
        bids,
        checksum,
    }))
}
