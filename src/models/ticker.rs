//! Ticker channel models.
//!
//! The v1 ticker payload is an object of single-letter keys, each holding a
//! positional array (`a: [price, wholeLotVolume, lotVolume]` etc.).

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::Result;

/// Best ask or bid: `[price, wholeLotVolume, lotVolume]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BestLevel(pub Decimal, pub u64, pub Decimal);

impl BestLevel {
    pub fn price(&self) -> Decimal {
        self.0
    }

    pub fn lot_volume(&self) -> Decimal {
        self.2
    }
}

/// Today's value and the rolling 24-hour value.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Window<T>(pub T, pub T);

impl<T: Copy> Window<T> {
    pub fn today(&self) -> T {
        self.0
    }

    pub fn last_24h(&self) -> T {
        self.1
    }
}

/// A decoded ticker update.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ticker {
    #[serde(rename = "a")]
    pub ask: BestLevel,
    #[serde(rename = "b")]
    pub bid: BestLevel,
    /// Last trade: `[price, lotVolume]`.
    #[serde(rename = "c")]
    pub last_trade: (Decimal, Decimal),
    #[serde(rename = "v")]
    pub volume: Window<Decimal>,
    #[serde(rename = "p")]
    pub vwap: Window<Decimal>,
    #[serde(rename = "t")]
    pub trades: Window<u64>,
    #[serde(rename = "l")]
    pub low: Window<Decimal>,
    #[serde(rename = "h")]
    pub high: Window<Decimal>,
    #[serde(rename = "o")]
    pub open: Window<Decimal>,
}

impl Ticker {
    /// Decodes a ticker payload object.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Json`](crate::LinkError::Json) if a field is
    /// missing or has the wrong arity.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        Ok(Ticker::deserialize(payload)?)
    }

    /// Ask minus bid.
    pub fn spread(&self) -> Decimal {
        self.ask.price() - self.bid.price()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    fn payload() -> Value {
        json!({
            "a": ["5525.40000", 1, "1.000"],
            "b": ["5525.10000", 1, "1.000"],
            "c": ["5525.10000", "0.00398963"],
            "v": ["2634.11501494", "3591.17907851"],
            "p": ["5631.44067", "5653.78939"],
            "t": [11493, 16267],
            "l": ["5505.00000", "5505.00000"],
            "h": ["5783.00000", "5783.00000"],
            "o": ["5760.70000", "5763.40000"]
        })
    }

    #[test]
    fn decodes_ticker_payload() {
        let ticker = Ticker::from_payload(&payload()).unwrap();
        assert_eq!(ticker.ask.price(), dec!(5525.40000));
        assert_eq!(ticker.bid.1, 1);
        assert_eq!(ticker.last_trade.1, dec!(0.00398963));
        assert_eq!(ticker.trades.last_24h(), 16267);
        assert_eq!(ticker.spread(), dec!(0.3));
    }

    #[test]
    fn rejects_missing_field() {
        let mut value = payload();
        value.as_object_mut().unwrap().remove("o");
        assert!(Ticker::from_payload(&value).is_err());
    }
}
