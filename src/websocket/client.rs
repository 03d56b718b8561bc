//! The client facade.
//!
//! One [`KrakenWsClient`] owns up to two sockets (public and
//! authenticated), a single inbound queue both feed, and one consumer task
//! draining that queue in order. Subscriptions, pending requests and order
//! books live in the client, never in process globals, so independent
//! clients in one process do not interfere.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::{Connection, ConnectionKind, InboundFrame};
use super::event::MarketEvent;
use super::handler;
use super::pending::PendingRequests;
use super::subscription::{Subscription, SubscriptionRegistry};
use crate::auth::{Credentials, SigningContext};
use crate::config::KrakenConfig;
use crate::orderbook::{OrderBook, OrderBookManager};
use crate::rest::RestClient;
use crate::tls::build_tls_config;
use crate::{LinkError, Result};

/// Shared state behind every [`KrakenWsClient`] handle.
pub(crate) struct ClientInner {
    pub(crate) config: KrakenConfig,
    tls: Arc<rustls::ClientConfig>,
    pub(crate) rest: RestClient,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) pending: PendingRequests,
    pub(crate) books: OrderBookManager,
    req_ids: Arc<AtomicU64>,
    public: Mutex<Option<Arc<Connection>>>,
    private: Mutex<Option<Arc<Connection>>>,
    /// Serializes dialing of the authenticated socket.
    private_dial: tokio::sync::Mutex<()>,
    /// Pairs with a resync in flight.
    pub(crate) resyncing: Mutex<HashSet<String>>,
    events: mpsc::UnboundedSender<MarketEvent>,
    inbound: mpsc::UnboundedSender<InboundFrame>,
    shutdown: CancellationToken,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ClientInner {
    pub(crate) fn next_reqid(&self) -> u64 {
        self.req_ids.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn emit(&self, event: MarketEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    fn slot(&self, kind: ConnectionKind) -> &Mutex<Option<Arc<Connection>>> {
        match kind {
            ConnectionKind::Public => &self.public,
            ConnectionKind::Authenticated => &self.private,
        }
    }

    fn live(&self, kind: ConnectionKind) -> Option<Arc<Connection>> {
        lock(self.slot(kind)).clone().filter(|c| c.is_open())
    }

    /// The public connection.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NotConnected`] if it is closed.
    pub(crate) fn public_connection(&self) -> Result<Arc<Connection>> {
        self.live(ConnectionKind::Public)
            .ok_or(LinkError::NotConnected(ConnectionKind::Public.as_str()))
    }

    /// The authenticated connection, without dialing.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NotConnected`] if it is closed.
    pub(crate) fn authenticated_connection(&self) -> Result<Arc<Connection>> {
        self.live(ConnectionKind::Authenticated)
            .ok_or(LinkError::NotConnected(ConnectionKind::Authenticated.as_str()))
    }

    /// Returns the authenticated connection and a current WS token, dialing
    /// the socket first if needed.
    ///
    /// # Errors
    ///
    /// - [`LinkError::MissingCredentials`] without API credentials
    /// - the token request's error
    /// - a dial error
    pub(crate) async fn authenticated(&self) -> Result<(Arc<Connection>, String)> {
        if !self.rest.signing().has_credentials() {
            return Err(LinkError::MissingCredentials);
        }

        let _dial = self.private_dial.lock().await;
        let token = self.rest.ws_token().await?;
        if let Some(connection) = self.live(ConnectionKind::Authenticated) {
            return Ok((connection, token));
        }

        let connection = self.open(ConnectionKind::Authenticated).await?;
        Ok((connection, token))
    }

    async fn open(&self, kind: ConnectionKind) -> Result<Arc<Connection>> {
        let url = match kind {
            ConnectionKind::Public => &self.config.websocket_url,
            ConnectionKind::Authenticated => &self.config.websocket_auth_url,
        };
        let connection = Connection::open(
            kind,
            url,
            Arc::clone(&self.tls),
            self.inbound.clone(),
            self.config.ping_interval,
            Arc::clone(&self.req_ids),
            &self.shutdown,
        )
        .await?;

        *lock(self.slot(kind)) = Some(Arc::clone(&connection));
        Ok(connection)
    }

    /// Tears down everything that depended on the lost connection.
    pub(crate) fn connection_lost(&self, kind: ConnectionKind, reason: &str) {
        let stale = {
            let mut slot = lock(self.slot(kind));
            match slot.as_ref() {
                Some(connection) if !connection.is_open() => slot.take(),
                _ => None,
            }
        };
        if stale.is_none() {
            debug!(%kind, "Ignoring close of a replaced connection");
            return;
        }

        self.pending.fail_connection(kind, reason);
        let dropped = self.registry.remove_connection(kind);
        match kind {
            ConnectionKind::Public => self.books.clear(),
            ConnectionKind::Authenticated => self.rest.signing().invalidate_token(),
        }

        warn!(%kind, reason, subscriptions = dropped.len(), "Connection lost");
        self.emit(MarketEvent::Disconnected {
            kind,
            reason: reason.to_string(),
        });
    }
}

/// Async client for the Kraken WebSocket v1 API.
///
/// Cheap to clone; all clones share one set of connections.
#[derive(Clone)]
pub struct KrakenWsClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for KrakenWsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KrakenWsClient")
            .field("public", &self.is_connected(ConnectionKind::Public))
            .field("authenticated", &self.is_connected(ConnectionKind::Authenticated))
            .field("subscriptions", &self.inner.registry.len())
            .finish()
    }
}

impl KrakenWsClient {
    /// Connects to the public endpoint and, when credentials are configured,
    /// to the authenticated endpoint.
    ///
    /// Returns the client and the receiver every [`MarketEvent`] is
    /// delivered on. A failure to open the authenticated socket is logged;
    /// it is dialed again on the first private call.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] if the TLS setup or the public dial fails.
    pub async fn connect(
        config: KrakenConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<MarketEvent>)> {
        let (client, events, inbound) = Self::build(config)?;
        client.inner.open(ConnectionKind::Public).await?;

        tokio::spawn(consume(
            Arc::downgrade(&client.inner),
            inbound,
            client.inner.shutdown.clone(),
        ));

        if client.inner.rest.signing().has_credentials() {
            if let Err(e) = client.inner.authenticated().await {
                warn!(error = %e, "Authenticated connection not established");
            }
        }

        info!("Kraken client connected");
        Ok((client, events))
    }

    /// Builds a client without dialing anything.
    pub(crate) fn build(
        config: KrakenConfig,
    ) -> Result<(
        Self,
        mpsc::UnboundedReceiver<MarketEvent>,
        mpsc::UnboundedReceiver<InboundFrame>,
    )> {
        let tls = build_tls_config(config.ca_pem.as_deref())?;
        let credentials = config
            .api_key
            .as_ref()
            .zip(config.api_secret.as_ref())
            .map(|(key, secret)| Credentials::new(key.as_str(), secret.as_str()));
        let signing = Arc::new(SigningContext::new(credentials));
        let rest = RestClient::new(&config.rest_url, tls.clone(), signing, config.request_timeout)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let inner = ClientInner {
            config,
            tls: Arc::new(tls),
            rest,
            registry: SubscriptionRegistry::new(),
            pending: PendingRequests::new(),
            books: OrderBookManager::new(),
            req_ids: Arc::new(AtomicU64::new(1)),
            public: Mutex::new(None),
            private: Mutex::new(None),
            private_dial: tokio::sync::Mutex::new(()),
            resyncing: Mutex::new(HashSet::new()),
            events: events_tx,
            inbound: inbound_tx,
            shutdown: CancellationToken::new(),
        };

        Ok((
            Self {
                inner: Arc::new(inner),
            },
            events_rx,
            inbound_rx,
        ))
    }

    pub(crate) fn inner(&self) -> &Arc<ClientInner> {
        &self.inner
    }

    pub(crate) fn from_inner(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }

    /// A copy of the synchronized book for `pair`, if one is live.
    pub fn order_book(&self, pair: &str) -> Option<OrderBook> {
        self.inner.books.get(pair)
    }

    /// Every subscription the client tracks, in any state.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.registry.all()
    }

    /// The REST client sharing this client's signing context.
    pub fn rest(&self) -> &RestClient {
        &self.inner.rest
    }

    pub fn is_connected(&self, kind: ConnectionKind) -> bool {
        self.inner.live(kind).is_some()
    }

    /// Closes both connections and fails every outstanding request.
    ///
    /// The client is unusable afterwards.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        self.inner.pending.fail_all("client closed");
        self.inner.registry.clear();
        self.inner.books.clear();

        for kind in [ConnectionKind::Public, ConnectionKind::Authenticated] {
            let connection = lock(self.inner.slot(kind)).take();
            if let Some(connection) = connection {
                connection.close().await;
            }
        }
        info!("Kraken client closed");
    }
}

/// Drains the inbound queue in arrival order.
async fn consume(
    inner: Weak<ClientInner>,
    mut inbound: mpsc::UnboundedReceiver<InboundFrame>,
    shutdown: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => break,
            frame = inbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };
        match frame {
            InboundFrame::Text { kind, text } => handler::handle_text(&inner, kind, &text),
            InboundFrame::Closed { kind, reason } => inner.connection_lost(kind, &reason),
        }
    }
    debug!("Consumer task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_client_has_no_connections() {
        let (client, _events, _inbound) = KrakenWsClient::build(KrakenConfig::default()).unwrap();
        assert!(!client.is_connected(ConnectionKind::Public));
        assert!(client.subscriptions().is_empty());
        assert!(matches!(
            client.inner().public_connection(),
            Err(LinkError::NotConnected("public"))
        ));
    }

    #[tokio::test]
    async fn private_calls_require_credentials() {
        let (client, _events, _inbound) = KrakenWsClient::build(KrakenConfig::default()).unwrap();
        assert!(matches!(
            client.inner().authenticated().await,
            Err(LinkError::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn request_ids_are_unique() {
        let (client, _events, _inbound) = KrakenWsClient::build(KrakenConfig::default()).unwrap();
        let a = client.inner().next_reqid();
        let b = client.inner().next_reqid();
        assert_ne!(a, b);
    }
}
