//! Helpers for Kraken's positional (tagged array) payloads.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{LinkError, Result};

/// Returns the elements of `value` if it is an array of exactly `len`
/// elements.
pub(crate) fn fixed_array<'a>(value: &'a Value, kind: &'static str, len: usize) -> Result<&'a [Value]> {
    let items = value
        .as_array()
        .ok_or_else(|| LinkError::MalformedMessage(format!("{kind} payload is not an array")))?;
    if items.len() != len {
        return Err(LinkError::LengthMismatch {
            kind,
            expected: len,
            got: items.len(),
        });
    }
    Ok(items)
}

/// Returns the string at `idx`.
pub(crate) fn str_at<'a>(items: &'a [Value], idx: usize, kind: &'static str) -> Result<&'a str> {
    items[idx].as_str().ok_or_else(|| {
        LinkError::MalformedMessage(format!("{kind} element {idx} is not a string"))
    })
}

/// Parses the decimal at `idx`, accepting either a JSON string or number.
pub(crate) fn decimal_at(items: &[Value], idx: usize, kind: &'static str) -> Result<Decimal> {
    let parsed = match &items[idx] {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        LinkError::MalformedMessage(format!("{kind} element {idx} is not a decimal"))
    })
}

/// Parses the unsigned integer at `idx`, accepting either a JSON string or number.
pub(crate) fn u64_at(items: &[Value], idx: usize, kind: &'static str) -> Result<u64> {
    let parsed = match &items[idx] {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        LinkError::MalformedMessage(format!("{kind} element {idx} is not an integer"))
    })
}

/// Decodes a private-channel payload `[{id: record}, ...]` into
/// `(id, record)` pairs, preserving order.
pub(crate) fn keyed_entries<T: DeserializeOwned>(
    value: &Value,
    kind: &'static str,
) -> Result<Vec<(String, T)>> {
    let entries = value
        .as_array()
        .ok_or_else(|| LinkError::MalformedMessage(format!("{kind} payload is not an array")))?;

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let object = entry.as_object().ok_or_else(|| {
            LinkError::MalformedMessage(format!("{kind} entry is not an object"))
        })?;
        for (id, record) in object {
            out.push((id.clone(), T::deserialize(record)?));
        }
    }
    Ok(out)
}
