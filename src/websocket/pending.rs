//! Request/acknowledgement correlation over the socket.
//!
//! Every request carries a client-chosen `reqid`. The sender registers the
//! id with the number of acknowledgements it expects before sending, then
//! awaits a [`PendingResponse`]. The event handler feeds every reqid-bearing
//! event into [`PendingRequests::complete`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use super::connection::ConnectionKind;
use crate::error::PairFailure;
use crate::models::events::{AckStatus, EventMessage};
use crate::{LinkError, Result};

type Responder = oneshot::Sender<Result<Vec<EventMessage>>>;

struct Entry {
    expected: usize,
    kind: ConnectionKind,
    received: Vec<EventMessage>,
    tx: Responder,
}

/// Outstanding requests of one client, shared by its connections.
#[derive(Clone, Default)]
pub struct PendingRequests {
    entries: Arc<Mutex<HashMap<u64, Entry>>>,
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("outstanding", &self.len())
            .finish()
    }
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `id` as waiting for `expected` acknowledgements on a
    /// connection of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::DuplicateRequestId`] if `id` is still pending.
    pub fn register(
        &self,
        id: u64,
        expected: usize,
        kind: ConnectionKind,
    ) -> Result<PendingResponse> {
        let mut entries = self.lock();
        if entries.contains_key(&id) {
            return Err(LinkError::DuplicateRequestId(id));
        }

        let (tx, rx) = oneshot::channel();
        entries.insert(
            id,
            Entry {
                expected: expected.max(1),
                kind,
                received: Vec::with_capacity(expected),
                tx,
            },
        );

        Ok(PendingResponse {
            id,
            rx: Some(rx),
            entries: self.clone(),
        })
    }

    /// Records an acknowledgement for `id`.
    ///
    /// A generic `error` event resolves the request at once, since the
    /// server sends no further acknowledgements after it. Returns `false`
    /// if nothing was waiting on `id`.
    pub fn complete(&self, id: u64, message: EventMessage) -> bool {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(&id) else {
            return false;
        };

        let terminal = matches!(message, EventMessage::Error(_));
        entry.received.push(message);
        if terminal || entry.received.len() >= entry.expected {
            if let Some(entry) = entries.remove(&id) {
                let _ = entry.tx.send(Ok(entry.received));
            }
        }
        true
    }

    /// Fails every outstanding request with [`LinkError::ConnectionClosed`].
    pub fn fail_all(&self, reason: &str) {
        let drained: Vec<_> = self.lock().drain().collect();
        for (id, entry) in drained {
            debug!(reqid = id, reason, "Failing pending request");
            let _ = entry.tx.send(Err(LinkError::ConnectionClosed(reason.to_string())));
        }
    }

    /// Fails the outstanding requests sent over a connection of `kind`.
    pub fn fail_connection(&self, kind: ConnectionKind, reason: &str) {
        let mut entries = self.lock();
        let ids: Vec<u64> = entries
            .iter()
            .filter(|(_, entry)| entry.kind == kind)
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            if let Some(entry) = entries.remove(&id) {
                debug!(reqid = id, %kind, reason, "Failing pending request");
                let _ = entry.tx.send(Err(LinkError::ConnectionClosed(reason.to_string())));
            }
        }
    }

    /// Drops `id` without resolving it.
    pub fn remove(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to one registered request. Dropping it unregisters the id.
pub struct PendingResponse {
    id: u64,
    rx: Option<oneshot::Receiver<Result<Vec<EventMessage>>>>,
    entries: PendingRequests,
}

impl PendingResponse {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits until every expected acknowledgement arrived.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Timeout`] after `timeout`; the entry is removed
    /// - [`LinkError::ConnectionClosed`] if the connection went away first
    pub async fn wait(mut self, timeout: Duration) -> Result<Vec<EventMessage>> {
        let Some(rx) = self.rx.take() else {
            return Err(LinkError::ConnectionClosed("response already consumed".into()));
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(LinkError::ConnectionClosed(
                "request dropped before completion".into(),
            )),
            Err(_) => {
                self.entries.remove(self.id);
                Err(LinkError::Timeout { req_id: self.id })
            }
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if self.rx.is_some() {
            self.entries.remove(self.id);
        }
    }
}

/// Aggregates the per-pair acknowledgements of one subscribe or
/// unsubscribe call.
#[derive(Debug, Default)]
pub struct SubscribeOutcome {
    expected: usize,
    acknowledged: usize,
    failures: Vec<PairFailure>,
}

impl SubscribeOutcome {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            ..Self::default()
        }
    }

    /// Folds one acknowledgement into the outcome.
    pub fn record(&mut self, message: &EventMessage) {
        match message {
            EventMessage::SubscriptionStatus(status) => {
                self.acknowledged += 1;
                if status.status == AckStatus::Error {
                    self.failures.push(PairFailure {
                        pair: status.pair.clone().unwrap_or_default(),
                        message: status.error_message.clone().unwrap_or_default(),
                    });
                }
            }
            EventMessage::Error(err) => {
                self.acknowledged = self.expected;
                self.failures.push(PairFailure {
                    pair: String::new(),
                    message: err.error_message.clone().unwrap_or_default(),
                });
            }
            _ => {}
        }
    }

    pub fn is_complete(&self) -> bool {
        self.acknowledged >= self.expected
    }

    pub fn failures(&self) -> &[PairFailure] {
        &self.failures
    }

    /// Resolves the outcome for `channel`.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Auth`] if any failure is an authentication error
    /// - [`LinkError::Subscription`] listing every failing pair otherwise
    pub fn into_result(self, channel: &str) -> Result<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        if let Some(auth) = self
            .failures
            .iter()
            .find(|f| crate::auth::is_auth_error(&f.message))
        {
            return Err(LinkError::Auth(auth.message.clone()));
        }
        Err(LinkError::Subscription {
            channel: channel.to_string(),
            failures: self.failures,
        })
    }
}

/// Aggregates the per-order acknowledgements of a multi-order cancel.
#[derive(Debug)]
pub struct BatchCancel {
    total: usize,
    successful: usize,
    failed: Vec<String>,
    first_error: Option<String>,
}

impl BatchCancel {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            successful: 0,
            failed: Vec::new(),
            first_error: None,
        }
    }

    pub fn record_success(&mut self) {
        self.successful += 1;
    }

    pub fn record_failure(&mut self, txid: &str, error: Option<&str>) {
        self.failed.push(txid.to_string());
        if self.first_error.is_none() {
            self.first_error = error.map(str::to_string);
        }
    }

    /// Returns `true` once every order has been accounted for.
    pub fn is_complete(&self) -> bool {
        self.successful + self.failed.len() >= self.total
    }

    /// Number of cancelled orders, or [`LinkError::BatchCancel`] if any
    /// order failed.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::BatchCancel`] naming every failed txid.
    pub fn into_result(self) -> Result<usize> {
        if self.failed.is_empty() {
            Ok(self.successful)
        } else {
            Err(LinkError::BatchCancel {
                failed: self.failed,
                successful: self.successful,
                first_error: self.first_error,
            })
        }
    }
}
