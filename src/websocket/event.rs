use rust_decimal::Decimal;
use serde_json::Value;

use super::connection::ConnectionKind;
use crate::models::Channel;
use crate::models::candle::Candle;
use crate::models::execution::OwnTrade;
use crate::models::orders::OpenOrder;
use crate::models::spread::Spread;
use crate::models::ticker::Ticker;
use crate::models::trade::Trade;
use crate::orderbook::Level;

/// Everything the client reports to its consumer, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Ticker {
        pair: String,
        ticker: Ticker,
    },
    Ohlc {
        pair: String,
        interval: Option<u32>,
        candle: Candle,
    },
    Trades {
        pair: String,
        trades: Vec<Trade>,
    },
    Spread {
        pair: String,
        spread: Spread,
    },
    /// A book was (re)built from a snapshot.
    BookSnapshot {
        pair: String,
        best_bid: Option<Level>,
        best_ask: Option<Level>,
    },
    /// An update was applied and its checksum verified.
    BookUpdate {
        pair: String,
        best_bid: Option<Level>,
        best_ask: Option<Level>,
        checksum: u32,
    },
    /// The book was discarded; a fresh snapshot has been requested.
    BookInvalidated {
        pair: String,
        reason: String,
    },
    OwnTrades {
        sequence: Option<u64>,
        trades: Vec<(String, OwnTrade)>,
    },
    OpenOrders {
        sequence: Option<u64>,
        orders: Vec<(String, OpenOrder)>,
    },
    OrderPlaced {
        reqid: Option<u64>,
        txid: Option<String>,
        descr: Option<String>,
    },
    OrderRejected {
        reqid: Option<u64>,
        error: String,
    },
    Subscribed {
        channel: Channel,
        pair: Option<String>,
        channel_id: Option<u64>,
    },
    Unsubscribed {
        channel: Channel,
        pair: Option<String>,
    },
    SystemStatus {
        status: String,
        version: Option<String>,
    },
    /// A connection ended; its subscriptions are gone.
    Disconnected {
        kind: ConnectionKind,
        reason: String,
    },
    /// A frame with an unrecognized `event`, passed through as received.
    Unhandled {
        raw: Value,
    },
}

impl MarketEvent {
    /// The pair this event concerns, for pair-scoped events.
    pub fn pair(&self) -> Option<&str> {
        match self {
            MarketEvent::Ticker { pair, .. }
            | MarketEvent::Ohlc { pair, .. }
            | MarketEvent::Trades { pair, .. }
            | MarketEvent::Spread { pair, .. }
            | MarketEvent::BookSnapshot { pair, .. }
            | MarketEvent::BookUpdate { pair, .. }
            | MarketEvent::BookInvalidated { pair, .. } => Some(pair),
            MarketEvent::Subscribed { pair, .. } | MarketEvent::Unsubscribed { pair, .. } => {
                pair.as_deref()
            }
            _ => None,
        }
    }

    /// Mid price of a book event with both sides present.
    pub fn book_mid(&self) -> Option<Decimal> {
        match self {
            MarketEvent::BookSnapshot {
                best_bid: Some(bid),
                best_ask: Some(ask),
                ..
            }
            | MarketEvent::BookUpdate {
                best_bid: Some(bid),
                best_ask: Some(ask),
                ..
            } => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }
}
