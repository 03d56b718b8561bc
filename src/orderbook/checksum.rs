//! CRC32 book checksum.
//!
//! The exchange hashes the top ten asks (ascending) followed by the top ten
//! bids (descending). Each level contributes its price then its amount,
//! formatted to a fixed number of decimals, with the decimal point removed
//! and leading zeros stripped.

use rust_decimal::Decimal;

use super::Level;

/// Levels per side included in the checksum.
pub const CHECKSUM_LEVELS: usize = 10;

/// Decimal places used when formatting prices and amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precision {
    pub price: u32,
    pub amount: u32,
}

impl Precision {
    /// Derives precision from the literal wire strings of one level.
    /// A value without a decimal point has precision 0.
    pub fn from_texts(price: &str, amount: &str) -> Self {
        Self {
            price: decimals(price),
            amount: decimals(amount),
        }
    }

    /// Derives precision from the scale of a parsed level.
    pub fn from_level(level: &Level) -> Self {
        Self {
            price: level.price.scale(),
            amount: level.amount.scale(),
        }
    }
}

fn decimals(text: &str) -> u32 {
    text.split_once('.')
        .map_or(0, |(_, fraction)| fraction.len() as u32)
}

/// Formats `value` to `places` decimals, drops the point and strips
/// leading zeros: `0.05005` at 5 places becomes `5005`.
pub fn format_level_value(value: Decimal, places: u32) -> String {
    let formatted = format!("{:.*}", places as usize, value.round_dp(places));
    let digits: String = formatted.chars().filter(|c| *c != '.').collect();
    digits.trim_start_matches('0').to_string()
}

/// Builds the checksum input string.
pub fn checksum_payload<'a>(
    asks: impl Iterator<Item = &'a Level>,
    bids: impl Iterator<Item = &'a Level>,
    precision: Precision,
) -> String {
    let mut payload = String::new();
    for level in asks.take(CHECKSUM_LEVELS).chain(bids.take(CHECKSUM_LEVELS)) {
        payload.push_str(&format_level_value(level.price, precision.price));
        payload.push_str(&format_level_value(level.amount, precision.amount));
    }
    payload
}

/// CRC32 (IEEE) of [`checksum_payload`].
pub fn compute<'a>(
    asks: impl Iterator<Item = &'a Level>,
    bids: impl Iterator<Item = &'a Level>,
    precision: Precision,
) -> u32 {
    crc32fast::hash(checksum_payload(asks, bids, precision).as_bytes())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn precision_from_wire_text() {
        assert_eq!(
            Precision::from_texts("0.05005", "0.00000500"),
            Precision {
                price: 5,
                amount: 8
            }
        );
        assert_eq!(Precision::from_texts("5541", "2.5").price, 0);
    }

    #[test]
    fn formats_without_point_and_leading_zeros() {
        assert_eq!(format_level_value(dec!(0.05005), 5), "5005");
        assert_eq!(format_level_value(dec!(0.00000500), 8), "500");
        assert_eq!(format_level_value(dec!(5541.3), 5), "554130000");
        assert_eq!(format_level_value(dec!(0.000005), 8), "500");
    }

    #[test]
    fn hashes_known_payload() {
        let level = |price| Level {
            price,
            amount: dec!(0.00000500),
            timestamp: Decimal::ZERO,
        };
        let asks = [level(dec!(0.05005))];
        let bids = [level(dec!(0.05000))];
        let precision = Precision {
            price: 5,
            amount: 8,
        };

        assert_eq!(
            checksum_payload(asks.iter(), bids.iter(), precision),
            "50055005000500"
        );
        assert_eq!(
            compute(asks.iter(), bids.iter(), precision),
            crc32fast::hash(b"50055005000500")
        );
    }
}
