//! Channel subscription and unsubscription operations.
//!
//! [`SubscriptionRegistry`] tracks one entry per `(channel, pair)` through
//! `Pending -> Subscribed -> Unsubscribing`. Entries are created by the
//! caller before the request is sent and moved along by the acknowledgements
//! the event handler feeds into [`SubscriptionRegistry::on_ack`]. Private
//! channels have no pair and are keyed by an empty pair string.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use super::client::KrakenWsClient;
use super::connection::{Connection, ConnectionKind};
use super::pending::SubscribeOutcome;
use crate::models::events::{AckStatus, EventMessage, SubscriptionStatus};
use crate::models::{Channel, SubscribeOptions, SubscriptionParams, SubscriptionRequest};
use crate::{LinkError, Result};

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Request sent, acknowledgement outstanding.
    Pending,
    Subscribed,
    /// Unsubscribe sent, acknowledgement outstanding.
    Unsubscribing,
}

/// One `(channel, pair)` subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub channel: Channel,
    /// `None` for private channels.
    pub pair: Option<String>,
    pub depth: Option<u32>,
    pub interval: Option<u32>,
    pub state: SubscriptionState,
    /// Server-assigned id, known once subscribed (public channels only).
    pub channel_id: Option<u64>,
    /// Correlation id of the request that last changed this entry.
    pub reqid: u64,
}

impl Subscription {
    fn pair_key(&self) -> &str {
        self.pair.as_deref().unwrap_or("")
    }

    /// Options that recreate this subscription.
    pub fn options(&self) -> SubscribeOptions {
        SubscribeOptions {
            depth: self.depth,
            interval: self.interval,
            snapshot: None,
        }
    }

    pub fn connection_kind(&self) -> ConnectionKind {
        if self.channel.is_private() {
            ConnectionKind::Authenticated
        } else {
            ConnectionKind::Public
        }
    }
}

/// What an acknowledgement did to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Subscribed(Subscription),
    Unsubscribed(Subscription),
    /// The server refused the request for this pair.
    Rejected {
        channel: Option<Channel>,
        pair: Option<String>,
        message: String,
    },
    /// No registry entry matched the acknowledgement.
    Unmatched,
}

type Key = (Channel, String);

#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<Key, Subscription>,
    by_channel_id: HashMap<u64, Key>,
}

impl RegistryState {
    fn find_key(&self, ack: &SubscriptionStatus) -> Option<Key> {
        let pair = ack.pair.as_deref().unwrap_or("");

        if let Some(reqid) = ack.reqid
            && let Some(key) = self
                .entries
                .iter()
                .find(|(_, sub)| sub.reqid == reqid && sub.pair_key() == pair)
                .map(|(key, _)| key.clone())
        {
            return Some(key);
        }

        let name = ack
            .subscription
            .as_ref()
            .map(|s| s.name.as_str())
            .or(ack.channel_name.as_deref())?;
        let key = (Channel::from_wire(name)?, pair.to_string());
        self.entries.contains_key(&key).then_some(key)
    }

    fn remove(&mut self, key: &Key) -> Option<Subscription> {
        let sub = self.entries.remove(key)?;
        if let Some(id) = sub.channel_id {
            self.by_channel_id.remove(&id);
        }
        Some(sub)
    }
}

/// Per-client registry of subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `Pending` entries for every pair of a subscribe request.
    ///
    /// Nothing is recorded unless every pair is free.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::DuplicateSubscription`] for the first pair that
    /// already has an entry in any state.
    pub fn begin_subscribe(
        &self,
        channel: Channel,
        pairs: &[String],
        params: &SubscriptionParams,
        reqid: u64,
    ) -> Result<()> {
        let mut state = self.lock();
        let keys = keys_for(channel, pairs);

        if let Some((_, pair)) = keys.iter().find(|key| state.entries.contains_key(*key)) {
            return Err(LinkError::DuplicateSubscription {
                channel: channel.to_string(),
                pair: pair.clone(),
            });
        }

        for key in keys {
            let pair = (!key.1.is_empty()).then(|| key.1.clone());
            state.entries.insert(
                key,
                Subscription {
                    channel,
                    pair,
                    depth: params.depth,
                    interval: params.interval,
                    state: SubscriptionState::Pending,
                    channel_id: None,
                    reqid,
                },
            );
        }
        Ok(())
    }

    /// Moves every pair of an unsubscribe request to `Unsubscribing`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::SubscriptionNotFound`] for the first pair without
    /// a `Subscribed` entry; nothing is changed in that case.
    pub fn begin_unsubscribe(
        &self,
        channel: Channel,
        pairs: &[String],
        reqid: u64,
    ) -> Result<Vec<Subscription>> {
        let mut state = self.lock();
        let keys = keys_for(channel, pairs);

        let missing = keys.iter().find(|key| {
            state
                .entries
                .get(*key)
                .is_none_or(|sub| sub.state != SubscriptionState::Subscribed)
        });
        if let Some((_, pair)) = missing {
            return Err(LinkError::SubscriptionNotFound {
                channel: channel.to_string(),
                pair: pair.clone(),
            });
        }

        let mut changed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(sub) = state.entries.get_mut(&key) {
                sub.state = SubscriptionState::Unsubscribing;
                sub.reqid = reqid;
                changed.push(sub.clone());
            }
        }
        Ok(changed)
    }

    /// Applies a `subscriptionStatus` acknowledgement.
    pub fn on_ack(&self, ack: &SubscriptionStatus) -> AckOutcome {
        let mut state = self.lock();
        let Some(key) = state.find_key(ack) else {
            return match ack.status {
                AckStatus::Error => AckOutcome::Rejected {
                    channel: ack
                        .subscription
                        .as_ref()
                        .and_then(|s| Channel::from_wire(&s.name)),
                    pair: ack.pair.clone(),
                    message: ack.error_message.clone().unwrap_or_default(),
                },
                _ => AckOutcome::Unmatched,
            };
        };

        match ack.status {
            AckStatus::Subscribed => {
                let channel_id = ack.channel_id;
                let Some(sub) = state.entries.get_mut(&key) else {
                    return AckOutcome::Unmatched;
                };
                sub.state = SubscriptionState::Subscribed;
                sub.channel_id = channel_id;
                let sub = sub.clone();
                if let Some(id) = channel_id {
                    state.by_channel_id.insert(id, key);
                }
                AckOutcome::Subscribed(sub)
            }
            AckStatus::Unsubscribed => match state.remove(&key) {
                Some(sub) => AckOutcome::Unsubscribed(sub),
                None => AckOutcome::Unmatched,
            },
            AckStatus::Error | AckStatus::Ok => {
                let channel = Some(key.0);
                match state.entries.get(&key).map(|sub| sub.state) {
                    Some(SubscriptionState::Unsubscribing) => {
                        if let Some(sub) = state.entries.get_mut(&key) {
                            sub.state = SubscriptionState::Subscribed;
                        }
                    }
                    _ => {
                        state.remove(&key);
                    }
                }
                AckOutcome::Rejected {
                    channel,
                    pair: ack.pair.clone(),
                    message: ack.error_message.clone().unwrap_or_default(),
                }
            }
        }
    }

    /// Rolls back the entries of `reqid` that no acknowledgement settled:
    /// `Pending` entries are dropped and `Unsubscribing` entries return to
    /// `Subscribed`. Settled entries are left alone.
    pub fn abort(&self, reqid: u64) {
        let mut state = self.lock();
        let keys: Vec<Key> = state
            .entries
            .iter()
            .filter(|(_, sub)| sub.reqid == reqid)
            .map(|(key, _)| key.clone())
            .collect();

        for key in keys {
            let current = state.entries.get(&key).map(|sub| sub.state);
            match current {
                Some(SubscriptionState::Pending) => {
                    state.remove(&key);
                }
                Some(SubscriptionState::Unsubscribing) => {
                    if let Some(sub) = state.entries.get_mut(&key) {
                        sub.state = SubscriptionState::Subscribed;
                    }
                }
                _ => {}
            }
        }
    }

    /// Looks up the subscription a public data frame belongs to.
    pub fn by_channel_id(&self, channel_id: u64) -> Option<Subscription> {
        let state = self.lock();
        let key = state.by_channel_id.get(&channel_id)?;
        state.entries.get(key).cloned()
    }

    /// Returns the entry for `(channel, pair)`; use `""` for private channels.
    pub fn get(&self, channel: Channel, pair: &str) -> Option<Subscription> {
        self.lock().entries.get(&(channel, pair.to_string())).cloned()
    }

    /// All entries, in no particular order.
    pub fn all(&self) -> Vec<Subscription> {
        self.lock().entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry served by a connection of `kind`.
    pub fn remove_connection(&self, kind: ConnectionKind) -> Vec<Subscription> {
        let mut state = self.lock();
        let keys: Vec<Key> = state
            .entries
            .iter()
            .filter(|(_, sub)| sub.connection_kind() == kind)
            .map(|(key, _)| key.clone())
            .collect();
        keys.iter().filter_map(|key| state.remove(key)).collect()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.by_channel_id.clear();
    }
}

fn keys_for(channel: Channel, pairs: &[String]) -> Vec<Key> {
    if pairs.is_empty() {
        vec![(channel, String::new())]
    } else {
        pairs.iter().map(|pair| (channel, pair.clone())).collect()
    }
}

impl KrakenWsClient {
    /// Subscribes to `channel` for every pair in `pairs` with one request.
    ///
    /// Private channels (`ownTrades`, `openOrders`) take no pairs and are
    /// sent over the authenticated connection with the current WS token.
    /// Returns once every pair has been acknowledged.
    ///
    /// # Errors
    ///
    /// - [`LinkError::InvalidDepth`] / [`LinkError::InvalidInterval`] before
    ///   anything is sent
    /// - [`LinkError::DuplicateSubscription`] if a pair already has an entry
    /// - [`LinkError::Subscription`] naming every pair the server refused
    /// - [`LinkError::Auth`] if the server rejected the token
    /// - [`LinkError::Timeout`] or a transport error
    pub async fn subscribe(
        &self,
        channel: Channel,
        pairs: &[&str],
        options: SubscribeOptions,
    ) -> Result<()> {
        let mut params = options.to_params(channel)?;
        let pairs: Vec<String> = pairs.iter().map(|p| (*p).to_string()).collect();
        check_pairs(channel, &pairs)?;

        let inner = self.inner();
        let connection = if channel.is_private() {
            let (connection, token) = inner.authenticated().await?;
            params = params.with_token(&token);
            connection
        } else {
            inner.public_connection()?
        };

        let reqid = inner.next_reqid();
        inner.registry.begin_subscribe(channel, &pairs, &params, reqid)?;
        debug!(channel = channel.as_str(), ?pairs, reqid, "Sending subscribe request");
        let acks = match self
            .await_acks(&connection, reqid, pairs.len().max(1), || {
                SubscriptionRequest::subscribe(reqid, &pairs, params)
            })
            .await
        {
            Ok(acks) => acks,
            Err(err) => {
                inner.registry.abort(reqid);
                return Err(err);
            }
        };

        let mut outcome = SubscribeOutcome::new(pairs.len().max(1));
        for ack in &acks {
            outcome.record(ack);
        }
        debug_assert!(outcome.is_complete());
        // A generic error event settles no entry by itself.
        if !outcome.failures().is_empty() {
            inner.registry.abort(reqid);
        }
        match outcome.into_result(channel.as_str()) {
            Ok(()) => {
                info!(channel = channel.as_str(), ?pairs, "Subscribed to channel");
                Ok(())
            }
            Err(err) => {
                warn!(channel = channel.as_str(), error = %err, "Subscription failed");
                Err(err)
            }
        }
    }

    /// Unsubscribes `channel` for every pair in `pairs`.
    ///
    /// Pairs subscribed with different depths or intervals are sent as
    /// separate requests, since one request carries one option set.
    ///
    /// # Errors
    ///
    /// - [`LinkError::SubscriptionNotFound`] if a pair is not `Subscribed`
    /// - [`LinkError::Subscription`] naming every pair the server refused
    /// - [`LinkError::Timeout`] or a transport error
    pub async fn unsubscribe(&self, channel: Channel, pairs: &[&str]) -> Result<()> {
        let pairs: Vec<String> = pairs.iter().map(|p| (*p).to_string()).collect();
        check_pairs(channel, &pairs)?;

        let inner = self.inner();
        let mut groups: Vec<(SubscribeOptions, Vec<String>)> = Vec::new();
        for (_, pair) in keys_for(channel, &pairs) {
            let sub = inner
                .registry
                .get(channel, &pair)
                .filter(|sub| sub.state == SubscriptionState::Subscribed)
                .ok_or_else(|| LinkError::SubscriptionNotFound {
                    channel: channel.to_string(),
                    pair: pair.clone(),
                })?;
            let options = sub.options();
            match groups.iter_mut().find(|(o, _)| *o == options) {
                Some((_, group)) => group.extend(sub.pair),
                None => groups.push((options, sub.pair.into_iter().collect())),
            }
        }

        let connection = if channel.is_private() {
            inner.authenticated_connection()?
        } else {
            inner.public_connection()?
        };

        let mut outcome = SubscribeOutcome::new(pairs.len().max(1));
        for (options, group) in groups {
            let mut params = options.to_params(channel)?;
            if channel.is_private() {
                let token = inner.rest.ws_token().await?;
                params = params.with_token(&token);
            }

            let reqid = inner.next_reqid();
            inner.registry.begin_unsubscribe(channel, &group, reqid)?;
            let acks = match self
                .await_acks(&connection, reqid, group.len().max(1), || {
                    SubscriptionRequest::unsubscribe(reqid, &group, params)
                })
                .await
            {
                Ok(acks) => acks,
                Err(err) => {
                    inner.registry.abort(reqid);
                    return Err(err);
                }
            };
            for ack in &acks {
                outcome.record(ack);
            }
            // Pairs still `Unsubscribing` were answered by a generic error.
            inner.registry.abort(reqid);
        }

        outcome.into_result(channel.as_str())?;
        info!(channel = channel.as_str(), ?pairs, "Unsubscribed from channel");
        Ok(())
    }

    /// Drops and re-requests the book subscription for `pair`, so the
    /// server sends a fresh snapshot.
    ///
    /// Does nothing unless the book is currently `Subscribed`.
    ///
    /// # Errors
    ///
    /// Returns the error of the unsubscribe or subscribe step.
    pub async fn resync_book(&self, pair: &str) -> Result<()> {
        let Some(sub) = self
            .inner()
            .registry
            .get(Channel::Book, pair)
            .filter(|sub| sub.state == SubscriptionState::Subscribed)
        else {
            debug!(pair, "No live book subscription to resync");
            return Ok(());
        };

        info!(pair, depth = ?sub.depth, "Resynchronizing order book");
        self.unsubscribe(Channel::Book, &[pair]).await?;
        self.subscribe(Channel::Book, &[pair], sub.options()).await
    }

    /// Registers `reqid`, sends the request and waits for `expected`
    /// acknowledgements.
    async fn await_acks(
        &self,
        connection: &Connection,
        reqid: u64,
        expected: usize,
        request: impl FnOnce() -> SubscriptionRequest,
    ) -> Result<Vec<EventMessage>> {
        let inner = self.inner();
        let response = inner.pending.register(reqid, expected, connection.kind())?;
        connection.send_json(&request()).await?;
        response.wait(inner.config.request_timeout).await
    }
}

fn check_pairs(channel: Channel, pairs: &[String]) -> Result<()> {
    if channel.is_private() && !pairs.is_empty() {
        return Err(LinkError::InvalidRequest(format!(
            "{channel} is an account channel and takes no pairs"
        )));
    }
    if !channel.is_private() && pairs.is_empty() {
        return Err(LinkError::InvalidRequest(format!(
            "{channel} requires at least one pair"
        )));
    }
    if let Some(dup) = pairs
        .iter()
        .enumerate()
        .find(|(i, p)| pairs[..*i].contains(p))
        .map(|(_, p)| p)
    {
        return Err(LinkError::InvalidRequest(format!("pair {dup} listed twice")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(channel: Channel, options: SubscribeOptions) -> SubscriptionParams {
        options.to_params(channel).unwrap()
    }

    fn status(json: serde_json::Value) -> SubscriptionStatus {
        serde_json::from_value(json).unwrap()
    }

    fn pairs(items: &[&str]) -> Vec<String> {
        items.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn successful_ack_marks_subscribed_and_indexes_channel_id() {
        let registry = SubscriptionRegistry::new();
        let p = params(Channel::Ticker, SubscribeOptions::default());
        registry
            .begin_subscribe(Channel::Ticker, &pairs(&["XBT/USD"]), &p, 1)
            .unwrap();

        let outcome = registry.on_ack(&status(serde_json::json!({
            "channelID": 42,
            "channelName": "ticker",
            "event": "subscriptionStatus",
            "pair": "XBT/USD",
            "reqid": 1,
            "status": "subscribed",
            "subscription": {"name": "ticker"}
        })));

        assert!(matches!(outcome, AckOutcome::Subscribed(_)));
        let sub = registry.by_channel_id(42).unwrap();
        assert_eq!(sub.pair.as_deref(), Some("XBT/USD"));
        assert_eq!(sub.state, SubscriptionState::Subscribed);
    }

    #[test]
    fn failed_ack_leaves_no_entry() {
        let registry = SubscriptionRegistry::new();
        let p = params(Channel::Ticker, SubscribeOptions::default());
        registry
            .begin_subscribe(Channel::Ticker, &pairs(&["XBT/USD", "FOO/BAR"]), &p, 2)
            .unwrap();

        let outcome = registry.on_ack(&status(serde_json::json!({
            "errorMessage": "Currency pair not supported",
            "event": "subscriptionStatus",
            "pair": "FOO/BAR",
            "reqid": 2,
            "status": "error",
            "subscription": {"name": "ticker"}
        })));

        assert!(matches!(outcome, AckOutcome::Rejected { .. }));
        assert!(registry.get(Channel::Ticker, "FOO/BAR").is_none());
        assert_eq!(
            registry.get(Channel::Ticker, "XBT/USD").unwrap().state,
            SubscriptionState::Pending
        );
    }

    #[test]
    fn duplicate_subscribe_adds_nothing() {
        let registry = SubscriptionRegistry::new();
        let p = params(Channel::Book, SubscribeOptions::depth(25));
        registry
            .begin_subscribe(Channel::Book, &pairs(&["XBT/USD"]), &p, 1)
            .unwrap();

        let err = registry
            .begin_subscribe(Channel::Book, &pairs(&["ETH/USD", "XBT/USD"]), &p, 2)
            .unwrap_err();
        assert!(matches!(err, LinkError::DuplicateSubscription { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unsubscribe_requires_subscribed_entry() {
        let registry = SubscriptionRegistry::new();
        let err = registry
            .begin_unsubscribe(Channel::Trade, &pairs(&["XBT/USD"]), 1)
            .unwrap_err();
        assert!(matches!(err, LinkError::SubscriptionNotFound { .. }));
    }

    #[test]
    fn unsubscribe_ack_removes_entry() {
        let registry = SubscriptionRegistry::new();
        let p = params(Channel::Ohlc, SubscribeOptions::interval(5));
        registry
            .begin_subscribe(Channel::Ohlc, &pairs(&["XBT/USD"]), &p, 1)
            .unwrap();
        registry.on_ack(&status(serde_json::json!({
            "channelID": 7,
            "channelName": "ohlc-5",
            "pair": "XBT/USD",
            "reqid": 1,
            "status": "subscribed",
            "subscription": {"name": "ohlc", "interval": 5}
        })));

        let changed = registry
            .begin_unsubscribe(Channel::Ohlc, &pairs(&["XBT/USD"]), 2)
            .unwrap();
        assert_eq!(changed[0].state, SubscriptionState::Unsubscribing);

        let outcome = registry.on_ack(&status(serde_json::json!({
            "channelID": 7,
            "channelName": "ohlc-5",
            "pair": "XBT/USD",
            "reqid": 2,
            "status": "unsubscribed",
            "subscription": {"name": "ohlc", "interval": 5}
        })));
        assert!(matches!(outcome, AckOutcome::Unsubscribed(_)));
        assert!(registry.is_empty());
        assert!(registry.by_channel_id(7).is_none());
    }

    #[test]
    fn abort_rolls_back_pending_entries() {
        let registry = SubscriptionRegistry::new();
        let p = params(Channel::Spread, SubscribeOptions::default());
        registry
            .begin_subscribe(Channel::Spread, &pairs(&["XBT/USD", "ETH/USD"]), &p, 9)
            .unwrap();
        registry.abort(9);
        assert!(registry.is_empty());
    }

    #[test]
    fn abort_keeps_settled_entries_and_restores_unsubscribing() {
        let registry = SubscriptionRegistry::new();
        let p = params(Channel::Trade, SubscribeOptions::default());
        registry
            .begin_subscribe(Channel::Trade, &pairs(&["XBT/USD", "ETH/USD"]), &p, 3)
            .unwrap();
        registry.on_ack(&status(serde_json::json!({
            "channelID": 11,
            "channelName": "trade",
            "pair": "XBT/USD",
            "reqid": 3,
            "status": "subscribed",
            "subscription": {"name": "trade"}
        })));

        registry.abort(3);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(Channel::Trade, "XBT/USD").unwrap().state,
            SubscriptionState::Subscribed
        );

        registry
            .begin_unsubscribe(Channel::Trade, &pairs(&["XBT/USD"]), 4)
            .unwrap();
        registry.abort(4);
        let sub = registry.get(Channel::Trade, "XBT/USD").unwrap();
        assert_eq!(sub.state, SubscriptionState::Subscribed);
        assert_eq!(registry.by_channel_id(11), Some(sub));
    }

    #[test]
    fn private_channels_are_keyed_without_pair() {
        let registry = SubscriptionRegistry::new();
        let p = params(Channel::OwnTrades, SubscribeOptions::default());
        registry.begin_subscribe(Channel::OwnTrades, &[], &p, 3).unwrap();

        let outcome = registry.on_ack(&status(serde_json::json!({
            "channelName": "ownTrades",
            "reqid": 3,
            "status": "subscribed",
            "subscription": {"name": "ownTrades"}
        })));
        assert!(matches!(outcome, AckOutcome::Subscribed(ref sub) if sub.pair.is_none()));

        let removed = registry.remove_connection(ConnectionKind::Authenticated);
        assert_eq!(removed.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn pair_lists_are_validated() {
        assert!(check_pairs(Channel::Ticker, &[]).is_err());
        assert!(check_pairs(Channel::OpenOrders, &pairs(&["XBT/USD"])).is_err());
        assert!(check_pairs(Channel::Trade, &pairs(&["XBT/USD", "XBT/USD"])).is_err());
        assert!(check_pairs(Channel::Trade, &pairs(&["XBT/USD", "ETH/USD"])).is_ok());
    }
}
