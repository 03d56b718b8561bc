//! Incoming WebSocket message processing.
//!
//! Runs on the consumer task only, one frame at a time, so book updates for
//! a pair are applied in the order they arrived. Nothing here awaits; work
//! that needs the socket (book resync) is spawned.

use std::sync::{Arc, PoisonError};

use tracing::{debug, error, info, warn};

use super::SUPPORTED_WS_VERSION;
use super::client::{ClientInner, KrakenWsClient};
use super::connection::ConnectionKind;
use super::event::MarketEvent;
use super::frame::{ChannelData, Frame, PrivateFrame, PublicFrame, classify, decode_private, decode_public};
use super::subscription::AckOutcome;
use crate::LinkError;
use crate::auth::is_auth_error;
use crate::models::book::BookMessage;
use crate::models::candle::interval_from_channel_name;
use crate::models::events::{AckStatus, EventMessage, SystemStatus};
use crate::models::{Channel, DEFAULT_BOOK_DEPTH};

/// Classifies and dispatches one text frame.
pub(crate) fn handle_text(inner: &Arc<ClientInner>, kind: ConnectionKind, text: &str) {
    let frame = match classify(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(%kind, error = %e, "Dropping unparseable frame");
            return;
        }
    };

    match frame {
        Frame::Unhandled(raw) => {
            warn!(%kind, event = ?raw.get("event"), "Unhandled event");
            inner.emit(MarketEvent::Unhandled { raw });
        }
        Frame::Event(event) => handle_event(inner, kind, event),
        Frame::Public(frame) => handle_public(inner, frame),
        Frame::Private(frame) => handle_private(inner, frame),
    }
}

fn handle_event(inner: &Arc<ClientInner>, kind: ConnectionKind, event: EventMessage) {
    match &event {
        EventMessage::Heartbeat => return,
        EventMessage::Pong { reqid } => {
            debug!(%kind, ?reqid, "Received pong");
            return;
        }
        EventMessage::SystemStatus(status) => {
            handle_system_status(inner, kind, status);
            return;
        }
        EventMessage::SubscriptionStatus(status) => match inner.registry.on_ack(status) {
            AckOutcome::Subscribed(sub) => {
                info!(
                    channel = sub.channel.as_str(),
                    pair = ?sub.pair,
                    channel_id = ?sub.channel_id,
                    "Subscription confirmed"
                );
                inner.emit(MarketEvent::Subscribed {
                    channel: sub.channel,
                    pair: sub.pair,
                    channel_id: sub.channel_id,
                });
            }
            AckOutcome::Unsubscribed(sub) => {
                if let (Channel::Book, Some(pair)) = (sub.channel, sub.pair.as_deref()) {
                    inner.books.remove(pair);
                }
                info!(channel = sub.channel.as_str(), pair = ?sub.pair, "Unsubscribed");
                inner.emit(MarketEvent::Unsubscribed {
                    channel: sub.channel,
                    pair: sub.pair,
                });
            }
            AckOutcome::Rejected { channel, pair, message } => {
                warn!(channel = ?channel, ?pair, error = message.as_str(), "Subscription rejected");
                invalidate_on_auth_error(inner, &message);
            }
            AckOutcome::Unmatched => {
                debug!(reqid = ?status.reqid, pair = ?status.pair, "Acknowledgement matched no subscription");
            }
        },
        EventMessage::AddOrderStatus(status) => {
            if status.status.is_success() {
                info!(reqid = ?status.reqid, txid = ?status.txid, descr = ?status.descr, "Order placed");
                inner.emit(MarketEvent::OrderPlaced {
                    reqid: status.reqid,
                    txid: status.txid.clone(),
                    descr: status.descr.clone(),
                });
            } else {
                let error = status.error_message.clone().unwrap_or_default();
                warn!(reqid = ?status.reqid, error = error.as_str(), "Order rejected");
                invalidate_on_auth_error(inner, &error);
                inner.emit(MarketEvent::OrderRejected {
                    reqid: status.reqid,
                    error,
                });
            }
        }
        EventMessage::CancelOrderStatus(status) => {
            debug!(reqid = ?status.reqid, status = ?status.status, "Cancel acknowledged");
            if status.status == AckStatus::Error {
                invalidate_on_auth_error(inner, status.error_message.as_deref().unwrap_or(""));
            }
        }
        EventMessage::CancelAllStatus(status) => {
            debug!(reqid = ?status.reqid, count = ?status.count, "Cancel-all acknowledged");
            if status.status == AckStatus::Error {
                invalidate_on_auth_error(inner, status.error_message.as_deref().unwrap_or(""));
            }
        }
        EventMessage::Error(err) => {
            let message = err.error_message.as_deref().unwrap_or("");
            warn!(%kind, reqid = ?err.reqid, error = message, "Server reported an error");
            invalidate_on_auth_error(inner, message);
        }
        EventMessage::Unknown => return,
    }

    match event.reqid() {
        Some(reqid) => {
            if !inner.pending.complete(reqid, event) {
                debug!(reqid, "No pending request for acknowledgement");
            }
        }
        None => debug!("Acknowledgement without reqid"),
    }
}

fn handle_system_status(inner: &ClientInner, kind: ConnectionKind, status: &SystemStatus) {
    if status.status == "online" {
        info!(%kind, connection_id = ?status.connection_id, version = ?status.version, "System online");
    } else {
        warn!(%kind, status = status.status.as_str(), "Exchange is not online");
    }

    if let Some(version) = status.version.as_deref()
        && is_newer_version(version, SUPPORTED_WS_VERSION)
    {
        warn!(
            advertised = version,
            supported = SUPPORTED_WS_VERSION,
            "Server advertises a newer API version"
        );
    }

    inner.emit(MarketEvent::SystemStatus {
        status: status.status.clone(),
        version: status.version.clone(),
    });
}

fn invalidate_on_auth_error(inner: &ClientInner, message: &str) {
    if is_auth_error(message) {
        inner.rest.signing().invalidate_token();
    }
}

/// Compares dotted numeric versions; unparseable parts count as zero.
fn is_newer_version(advertised: &str, supported: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.').map(|part| part.parse().unwrap_or(0)).collect()
    };
    parse(advertised) > parse(supported)
}

fn handle_public(inner: &Arc<ClientInner>, frame: PublicFrame) {
    let Some(sub) = inner.registry.by_channel_id(frame.channel_id) else {
        debug!(
            channel_id = frame.channel_id,
            channel = frame.channel_name.as_str(),
            pair = frame.pair.as_str(),
            "Dropping frame for untracked channel id"
        );
        return;
    };
    let channel = sub.channel;

    let data = match decode_public(channel, &frame.payloads) {
        Ok(data) => data,
        Err(e) => {
            warn!(
                channel = frame.channel_name.as_str(),
                pair = frame.pair.as_str(),
                error = %e,
                "Dropping malformed frame"
            );
            return;
        }
    };

    let pair = frame.pair;
    match data {
        ChannelData::Ticker(ticker) => inner.emit(MarketEvent::Ticker { pair, ticker }),
        ChannelData::Ohlc(candle) => {
            let interval = sub
                .interval
                .or_else(|| interval_from_channel_name(&frame.channel_name));
            inner.emit(MarketEvent::Ohlc {
                pair,
                interval,
                candle,
            });
        }
        ChannelData::Trades(trades) => inner.emit(MarketEvent::Trades { pair, trades }),
        ChannelData::Spread(spread) => inner.emit(MarketEvent::Spread { pair, spread }),
        ChannelData::Book(message) => {
            let depth = sub
                .depth
                .or_else(|| depth_from_channel_name(&frame.channel_name))
                .unwrap_or(DEFAULT_BOOK_DEPTH);
            handle_book(inner, pair, depth as usize, message);
        }
        ChannelData::OwnTrades(_) | ChannelData::OpenOrders(_) => {
            warn!(pair = pair.as_str(), "Account data on a public frame");
        }
    }
}

fn depth_from_channel_name(name: &str) -> Option<u32> {
    name.strip_prefix("book-")?.parse().ok()
}

fn handle_book(inner: &Arc<ClientInner>, pair: String, depth: usize, message: BookMessage) {
    match message {
        BookMessage::Snapshot(snapshot) => {
            let book = inner.books.apply_snapshot(&pair, depth, &snapshot);
            inner.emit(MarketEvent::BookSnapshot {
                best_bid: book.best_bid(),
                best_ask: book.best_ask(),
                pair,
            });
        }
        BookMessage::Update(update) => match inner.books.apply_update(&pair, &update) {
            Ok(book) => inner.emit(MarketEvent::BookUpdate {
                best_bid: book.best_bid(),
                best_ask: book.best_ask(),
                checksum: update.checksum,
                pair,
            }),
            Err(e @ LinkError::ChecksumMismatch { .. }) => {
                error!(pair = pair.as_str(), error = %e, "Order book integrity check failed");
                inner.emit(MarketEvent::BookInvalidated {
                    pair: pair.clone(),
                    reason: e.to_string(),
                });
                spawn_resync(inner, pair);
            }
            Err(e) => {
                warn!(pair = pair.as_str(), error = %e, "Dropping book update");
            }
        },
    }
}

/// Starts an unsubscribe/subscribe cycle for `pair` off the consumer task,
/// unless one is already running.
fn spawn_resync(inner: &Arc<ClientInner>, pair: String) {
    let started = inner
        .resyncing
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(pair.clone());
    if !started {
        debug!(pair = pair.as_str(), "Resync already in progress");
        return;
    }

    let client = KrakenWsClient::from_inner(Arc::clone(inner));
    tokio::spawn(async move {
        if let Err(e) = client.resync_book(&pair).await {
            error!(pair = pair.as_str(), error = %e, "Order book resync failed");
        }
        client
            .inner()
            .resyncing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pair);
    });
}

fn handle_private(inner: &ClientInner, frame: PrivateFrame) {
    match decode_private(&frame) {
        Ok(ChannelData::OwnTrades(trades)) => {
            debug!(sequence = ?frame.sequence, count = trades.len(), "Own trades");
            inner.emit(MarketEvent::OwnTrades {
                sequence: frame.sequence,
                trades,
            });
        }
        Ok(ChannelData::OpenOrders(orders)) => {
            debug!(sequence = ?frame.sequence, count = orders.len(), "Open orders");
            inner.emit(MarketEvent::OpenOrders {
                sequence: frame.sequence,
                orders,
            });
        }
        Ok(_) => warn!(channel = frame.channel_name.as_str(), "Unexpected private payload"),
        Err(e) => warn!(
            channel = frame.channel_name.as_str(),
            error = %e,
            "Dropping malformed private frame"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::config::KrakenConfig;
    use crate::models::{SubscribeOptions, SubscriptionParams};

    fn client() -> (KrakenWsClient, UnboundedReceiver<MarketEvent>) {
        let (client, events, _inbound) = KrakenWsClient::build(KrakenConfig::default()).unwrap();
        (client, events)
    }

    fn params(channel: Channel, options: SubscribeOptions) -> SubscriptionParams {
        options.to_params(channel).unwrap()
    }

    fn subscribe(client: &KrakenWsClient, channel: Channel, pair: &str, channel_id: u64, reqid: u64) {
        let inner = client.inner();
        inner
            .registry
            .begin_subscribe(
                channel,
                &[pair.to_string()],
                &params(channel, SubscribeOptions::default()),
                reqid,
            )
            .unwrap();
        let ack = serde_json::json!({
            "channelID": channel_id,
            "channelName": channel.as_str(),
            "event": "subscriptionStatus",
            "pair": pair,
            "reqid": reqid,
            "status": "subscribed",
            "subscription": {"name": channel.as_str()}
        });
        handle_text(inner, ConnectionKind::Public, &ack.to_string());
    }

    #[tokio::test]
    async fn subscribed_ack_completes_request_and_emits_event() {
        let (client, mut events) = client();
        let response = client
            .inner()
            .pending
            .register(1, 1, ConnectionKind::Public)
            .unwrap();

        subscribe(&client, Channel::Ticker, "XBT/USD", 42, 1);

        let acks = response.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(acks.len(), 1);
        assert!(matches!(
            events.try_recv().unwrap(),
            MarketEvent::Subscribed {
                channel: Channel::Ticker,
                channel_id: Some(42),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn routes_trades_by_channel_id() {
        let (client, mut events) = client();
        subscribe(&client, Channel::Trade, "XBT/USD", 337, 1);
        let _ = events.try_recv();

        let frame = r#"[337,[["5541.20000","0.15850568","1534614057.321597","s","l",""]],"trade","XBT/USD"]"#;
        handle_text(client.inner(), ConnectionKind::Public, frame);

        let MarketEvent::Trades { pair, trades } = events.try_recv().unwrap() else {
            panic!("expected trades");
        };
        assert_eq!(pair, "XBT/USD");
        assert_eq!(trades.len(), 1);
    }

    #[tokio::test]
    async fn untracked_channel_id_is_dropped() {
        let (client, mut events) = client();
        subscribe(&client, Channel::Trade, "XBT/USD", 337, 1);
        let _ = events.try_recv();

        let book = r#"[999,{"as":[["1.00000","5.00000000","1534614248.123678"]],"bs":[["0.90000","5.00000000","1534614248.123678"]]},"book-10","DOGE/USD"]"#;
        handle_text(client.inner(), ConnectionKind::Public, book);

        assert!(events.try_recv().is_err());
        assert!(client.order_book("DOGE/USD").is_none());
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped_and_pipeline_continues() {
        let (client, mut events) = client();
        subscribe(&client, Channel::Trade, "XBT/USD", 337, 1);
        let _ = events.try_recv();

        let bad = r#"[337,[["5541.20000","0.15850568","1534614057.321597"]],"trade","XBT/USD"]"#;
        handle_text(client.inner(), ConnectionKind::Public, bad);
        assert!(events.try_recv().is_err());

        let good = r#"[337,[["5541.20000","0.15850568","1534614057.321597","b","m",""]],"trade","XBT/USD"]"#;
        handle_text(client.inner(), ConnectionKind::Public, good);
        assert!(matches!(events.try_recv().unwrap(), MarketEvent::Trades { .. }));
    }

    #[tokio::test]
    async fn unknown_event_is_passed_through() {
        let (client, mut events) = client();
        handle_text(
            client.inner(),
            ConnectionKind::Public,
            r#"{"event":"somethingNew","value":1}"#,
        );

        let MarketEvent::Unhandled { raw } = events.try_recv().unwrap() else {
            panic!("expected unhandled event");
        };
        assert_eq!(raw["value"], 1);
    }

    #[tokio::test]
    async fn heartbeat_emits_nothing() {
        let (client, mut events) = client();
        handle_text(client.inner(), ConnectionKind::Public, r#"{"event":"heartbeat"}"#);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejected_order_emits_rejection() {
        let (client, mut events) = client();
        let response = client
            .inner()
            .pending
            .register(8, 1, ConnectionKind::Authenticated)
            .unwrap();

        handle_text(
            client.inner(),
            ConnectionKind::Authenticated,
            r#"{"event":"addOrderStatus","reqid":8,"status":"error","errorMessage":"EOrder:Order minimum not met"}"#,
        );

        assert_eq!(response.wait(Duration::from_secs(1)).await.unwrap().len(), 1);
        let MarketEvent::OrderRejected { reqid, error } = events.try_recv().unwrap() else {
            panic!("expected rejection");
        };
        assert_eq!(reqid, Some(8));
        assert_eq!(error, "EOrder:Order minimum not met");
    }

    #[tokio::test]
    async fn private_frames_emit_account_events() {
        let (client, mut events) = client();
        let frame = r#"[[{"OGTT3Y-C6I3P-XRI6HX":{"status":"open"}}],"openOrders",{"sequence":7}]"#;
        handle_text(client.inner(), ConnectionKind::Authenticated, frame);

        let MarketEvent::OpenOrders { sequence, orders } = events.try_recv().unwrap() else {
            panic!("expected open orders");
        };
        assert_eq!(sequence, Some(7));
        assert_eq!(orders.len(), 1);
    }

    #[test]
    fn version_comparison_is_numeric() {
        assert!(is_newer_version("1.10.0", "1.9.0"));
        assert!(!is_newer_version("1.9.0", "1.9.0"));
        assert!(!is_newer_version("1.8.2", "1.9.0"));
    }
}
