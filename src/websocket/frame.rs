//! Classification of raw frames and decoding of channel payloads.
//!
//! Kraken v1 multiplexes three shapes over one socket:
//! - event objects tagged by `event`
//! - public data arrays `[channelID, payload(, payload), channelName, pair]`
//! - private data arrays `[[{id: record}, ...], channelName, {sequence}]`

use serde::Deserialize;
use serde_json::Value;

use crate::models::Channel;
use crate::models::book::{BookMessage, parse_book};
use crate::models::candle::Candle;
use crate::models::events::EventMessage;
use crate::models::execution::{OwnTrade, parse_own_trades};
use crate::models::orders::{OpenOrder, parse_open_orders};
use crate::models::spread::Spread;
use crate::models::ticker::Ticker;
use crate::models::trade::{Trade, parse_trades};
use crate::{LinkError, Result};

/// A public data frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicFrame {
    pub channel_id: u64,
    /// One payload, or two for book updates touching both sides.
    pub payloads: Vec<Value>,
    /// e.g. `"ticker"`, `"book-10"`, `"ohlc-5"`.
    pub channel_name: String,
    pub pair: String,
}

/// A private data frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PrivateFrame {
    pub channel_name: String,
    pub payload: Value,
    pub sequence: Option<u64>,
}

/// A classified inbound frame.
#[derive(Debug, Clone)]
pub enum Frame {
    Event(EventMessage),
    /// An event object with an unrecognized `event` discriminator.
    Unhandled(Value),
    Public(PublicFrame),
    Private(PrivateFrame),
}

/// Classifies one text frame by its top-level shape.
///
/// # Errors
///
/// Returns [`LinkError::Json`] for invalid JSON and
/// [`LinkError::MalformedMessage`] for a shape matching none of the three
/// frame kinds.
pub fn classify(text: &str) -> Result<Frame> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Object(_) => match EventMessage::deserialize(&value)? {
            EventMessage::Unknown => Ok(Frame::Unhandled(value)),
            event => Ok(Frame::Event(event)),
        },
        Value::Array(items) if items.first().is_some_and(Value::is_array) => {
            classify_private(items).map(Frame::Private)
        }
        Value::Array(items) => classify_public(items).map(Frame::Public),
        _ => Err(LinkError::MalformedMessage(
            "frame is neither an object nor an array".into(),
        )),
    }
}

fn classify_public(mut items: Vec<Value>) -> Result<PublicFrame> {
    if !(4..=5).contains(&items.len()) {
        return Err(LinkError::MalformedMessage(format!(
            "public frame has {} elements",
            items.len()
        )));
    }

    let channel_id = items[0]
        .as_u64()
        .ok_or_else(|| LinkError::MalformedMessage("channel id is not an integer".into()))?;
    let pair = take_string(items.pop(), "pair")?;
    let channel_name = take_string(items.pop(), "channel name")?;
    let payloads = items.split_off(1);

    Ok(PublicFrame {
        channel_id,
        payloads,
        channel_name,
        pair,
    })
}

fn classify_private(items: Vec<Value>) -> Result<PrivateFrame> {
    let mut items = items.into_iter();
    let payload = items.next().unwrap_or(Value::Null);
    let channel_name = take_string(items.next(), "channel name")?;
    let sequence = items
        .next()
        .and_then(|meta| meta.get("sequence").and_then(Value::as_u64));

    Ok(PrivateFrame {
        channel_name,
        payload,
        sequence,
    })
}

fn take_string(value: Option<Value>, what: &str) -> Result<String> {
    match value {
        Some(Value::String(s)) => Ok(s),
        _ => Err(LinkError::MalformedMessage(format!("{what} is not a string"))),
    }
}

/// A decoded channel payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelData {
    Ticker(Ticker),
    Ohlc(Candle),
    Trades(Vec<Trade>),
    Spread(Spread),
    Book(BookMessage),
    OwnTrades(Vec<(String, OwnTrade)>),
    OpenOrders(Vec<(String, OpenOrder)>),
}

/// Decodes the payloads of a public frame for `channel`.
///
/// # Errors
///
/// Returns the decoder's error: typically
/// [`LinkError::LengthMismatch`] or [`LinkError::MalformedMessage`].
pub fn decode_public(channel: Channel, payloads: &[Value]) -> Result<ChannelData> {
    if channel == Channel::Book {
        return parse_book(payloads).map(ChannelData::Book);
    }

    let [payload] = payloads else {
        return Err(LinkError::MalformedMessage(format!(
            "{channel} frame carries {} payloads",
            payloads.len()
        )));
    };

    match channel {
        Channel::Ticker => Ticker::from_payload(payload).map(ChannelData::Ticker),
        Channel::Ohlc => Candle::from_payload(payload).map(ChannelData::Ohlc),
        Channel::Trade => parse_trades(payload).map(ChannelData::Trades),
        Channel::Spread => Spread::from_payload(payload).map(ChannelData::Spread),
        Channel::Book | Channel::OwnTrades | Channel::OpenOrders => Err(
            LinkError::MalformedMessage(format!("{channel} data on the public connection")),
        ),
    }
}

/// Decodes the payload of a private frame.
///
/// # Errors
///
/// Returns [`LinkError::MalformedMessage`] for an unknown channel name or
/// the decoder's error.
pub fn decode_private(frame: &PrivateFrame) -> Result<ChannelData> {
    match Channel::from_wire(&frame.channel_name) {
        Some(Channel::OwnTrades) => parse_own_trades(&frame.payload).map(ChannelData::OwnTrades),
        Some(Channel::OpenOrders) => {
            parse_open_orders(&frame.payload).map(ChannelData::OpenOrders)
        }
        _ => Err(LinkError::MalformedMessage(format!(
            "unknown private channel {:?}",
            frame.channel_name
        ))),
    }
}
