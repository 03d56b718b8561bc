//! Shared models for Kraken WebSocket v1 messages.
//!
//! Contains channel definitions, subscription request types and the
//! common protocol messages (ping, redacted tokens). Channel payloads live
//! in the submodules.

pub mod add_order;
pub mod book;
pub mod cancel_all;
pub mod cancel_order;
pub mod candle;
pub mod events;
pub mod execution;
pub mod orders;
pub mod spread;
pub mod ticker;
pub mod trade;
pub(crate) mod wire;

use std::fmt;

use serde::{Serialize, Serializer};

use crate::{LinkError, Result};

/// Book depths the exchange accepts.
pub const VALID_DEPTHS: [u32; 5] = [10, 25, 100, 500, 1000];

/// OHLC intervals in minutes the exchange accepts.
pub const VALID_INTERVALS: [u32; 9] = [1, 5, 15, 30, 60, 240, 1440, 10080, 21600];

/// Depth used when a book subscription does not name one.
pub const DEFAULT_BOOK_DEPTH: u32 = 10;

/// Available Kraken WebSocket v1 channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Ticker,
    /// OHLC candles (wire name: `"ohlc"`, data frames `"ohlc-<interval>"`).
    Ohlc,
    Trade,
    Spread,
    /// Level-2 book (wire name: `"book"`, data frames `"book-<depth>"`).
    Book,
    /// Private fills on the authenticated connection.
    OwnTrades,
    /// Private order updates on the authenticated connection.
    OpenOrders,
}

impl Channel {
    /// Returns the wire-format channel name expected by the Kraken API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Ticker => "ticker",
            Channel::Ohlc => "ohlc",
            Channel::Trade => "trade",
            Channel::Spread => "spread",
            Channel::Book => "book",
            Channel::OwnTrades => "ownTrades",
            Channel::OpenOrders => "openOrders",
        }
    }

    /// Returns `true` for channels served on the authenticated connection.
    pub fn is_private(&self) -> bool {
        matches!(self, Channel::OwnTrades | Channel::OpenOrders)
    }

    /// Resolves a subscription name or data-frame channel name such as
    /// `"book-25"` or `"ohlc-5"`.
    pub fn from_wire(name: &str) -> Option<Self> {
        let base = name.split_once('-').map_or(name, |(base, _)| base);
        match base {
            "ticker" => Some(Channel::Ticker),
            "ohlc" => Some(Channel::Ohlc),
            "trade" => Some(Channel::Trade),
            "spread" => Some(Channel::Spread),
            "book" => Some(Channel::Book),
            "ownTrades" => Some(Channel::OwnTrades),
            "openOrders" => Some(Channel::OpenOrders),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing subscription options. Only the option matching the
/// channel is used: `depth` for books, `interval` for OHLC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub depth: Option<u32>,
    pub interval: Option<u32>,
    /// Ask the server to skip the initial snapshot (trade/ownTrades).
    pub snapshot: Option<bool>,
}

impl SubscribeOptions {
    /// Options for a book subscription of the given depth.
    #[must_use]
    pub fn depth(depth: u32) -> Self {
        Self {
            depth: Some(depth),
            ..Self::default()
        }
    }

    /// Options for an OHLC subscription of the given interval.
    #[must_use]
    pub fn interval(minutes: u32) -> Self {
        Self {
            interval: Some(minutes),
            ..Self::default()
        }
    }

    /// Validates the options against `channel` and produces the wire
    /// `subscription` object.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidDepth`] or [`LinkError::InvalidInterval`]
    /// naming the rejected value.
    pub fn to_params(self, channel: Channel) -> Result<SubscriptionParams> {
        let mut params = SubscriptionParams::named(channel);
        match channel {
            Channel::Book => {
                let depth = self.depth.unwrap_or(DEFAULT_BOOK_DEPTH);
                if !VALID_DEPTHS.contains(&depth) {
                    return Err(LinkError::InvalidDepth(depth));
                }
                params.depth = Some(depth);
            }
            Channel::Ohlc => {
                if let Some(interval) = self.interval {
                    if !VALID_INTERVALS.contains(&interval) {
                        return Err(LinkError::InvalidInterval(interval));
                    }
                    params.interval = Some(interval);
                }
            }
            _ => {}
        }
        if matches!(channel, Channel::Trade | Channel::OwnTrades) {
            params.snapshot = self.snapshot;
        }
        Ok(params)
    }
}

/// The `subscription` object of a subscribe/unsubscribe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionParams {
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<RedactedToken>,
}

impl SubscriptionParams {
    fn named(channel: Channel) -> Self {
        Self {
            name: channel.as_str(),
            depth: None,
            interval: None,
            snapshot: None,
            token: None,
        }
    }

    /// Attaches the WS token required by private channels.
    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(RedactedToken::new(token));
        self
    }
}

/// A `subscribe` or `unsubscribe` request sent to the Kraken WebSocket API.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionRequest {
    event: &'static str,
    reqid: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pair: Option<Vec<String>>,
    subscription: SubscriptionParams,
}

impl SubscriptionRequest {
    /// Builds a `subscribe` request. Private channels carry no pairs.
    #[must_use]
    pub fn subscribe(reqid: u64, pairs: &[String], subscription: SubscriptionParams) -> Self {
        Self::new("subscribe", reqid, pairs, subscription)
    }

    /// Builds an `unsubscribe` request.
    #[must_use]
    pub fn unsubscribe(reqid: u64, pairs: &[String], subscription: SubscriptionParams) -> Self {
        Self::new("unsubscribe", reqid, pairs, subscription)
    }

    fn new(
        event: &'static str,
        reqid: u64,
        pairs: &[String],
        subscription: SubscriptionParams,
    ) -> Self {
        Self {
            event,
            reqid,
            pair: (!pairs.is_empty()).then(|| pairs.to_vec()),
            subscription,
        }
    }

    /// Returns the correlation id.
    #[must_use]
    pub fn reqid(&self) -> u64 {
        self.reqid
    }
}

/// A `ping` request used to test connection liveness.
#[derive(Debug, Serialize)]
pub struct PingRequest {
    pub event: &'static str,
    pub reqid: u64,
}

impl PingRequest {
    #[must_use]
    pub fn new(reqid: u64) -> Self {
        Self {
            event: "ping",
            reqid,
        }
    }
}

/// A WS authentication token that serializes as a plain string but never
/// appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct RedactedToken(String);

impl RedactedToken {
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self(token.to_string())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RedactedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Serialize for RedactedToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
