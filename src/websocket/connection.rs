//! WebSocket connection lifecycle management.
//!
//! A [`Connection`] owns the write half of one socket. Opening it spawns a
//! read task that forwards every text frame, unmodified, onto the inbound
//! queue shared by all connections of a client, and a ping task that keeps
//! the socket alive. Both tasks stop when the connection's
//! [`CancellationToken`] is cancelled, either by [`Connection::close`] or by
//! the client shutting down.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tungstenite::Message;

use super::{WsReader, WsWriter, connect, ping};
use crate::{LinkError, Result};

/// Which of the two Kraken endpoints a connection talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// `ws.kraken.com`: public market data.
    Public,
    /// `ws-auth.kraken.com`: private channels and order actions.
    Authenticated,
}

impl ConnectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionKind::Public => "public",
            ConnectionKind::Authenticated => "authenticated",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item on the shared inbound queue.
#[derive(Debug)]
pub enum InboundFrame {
    /// A text frame exactly as received.
    Text { kind: ConnectionKind, text: String },
    /// The socket ended or errored.
    Closed { kind: ConnectionKind, reason: String },
}

/// One live socket.
pub struct Connection {
    kind: ConnectionKind,
    writer: Mutex<WsWriter>,
    shutdown: CancellationToken,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Dials `url` and starts the read and ping tasks.
    ///
    /// The connection's shutdown token is a child of `parent`, so
    /// cancelling the client cancels every connection.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] if the connection or TLS handshake fails.
    pub async fn open(
        kind: ConnectionKind,
        url: &str,
        tls_config: Arc<rustls::ClientConfig>,
        inbound: mpsc::UnboundedSender<InboundFrame>,
        ping_interval: Duration,
        req_ids: Arc<AtomicU64>,
        parent: &CancellationToken,
    ) -> Result<Arc<Self>> {
        info!(%kind, url, "Connecting to WebSocket");
        let (write, read) = connect(url, tls_config).await?;

        let shutdown = parent.child_token();
        let connection = Arc::new(Self {
            kind,
            writer: Mutex::new(write),
            shutdown: shutdown.clone(),
        });

        tokio::spawn(read_loop(kind, read, inbound, shutdown));
        tokio::spawn(ping_loop(
            Arc::downgrade(&connection),
            ping_interval,
            req_ids,
        ));

        Ok(connection)
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// Returns `false` once the socket ended or [`Connection::close`] ran.
    pub fn is_open(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Serializes `message` and sends it as a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NotConnected`] if the connection is closed, or a
    /// transport error if the send fails.
    pub async fn send_json<T: Serialize>(&self, message: &T) -> Result<()> {
        let json = serde_json::to_string(message)?;
        if !self.is_open() {
            return Err(LinkError::NotConnected(self.kind.as_str()));
        }
        let mut writer = self.writer.lock().await;
        writer.send(Message::Text(json.into())).await?;
        Ok(())
    }

    async fn send_ping(&self, reqid: u64) -> Result<()> {
        let mut writer = self.writer.lock().await;
        ping(&mut writer, reqid).await
    }

    /// Stops the read and ping tasks and sends a close frame.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.send(Message::Close(None)).await {
            debug!(kind = %self.kind, error = %e, "Close frame not sent");
        }
        let _ = writer.close().await;
        info!(kind = %self.kind, "WebSocket connection closed");
    }
}

/// Forwards text frames until the socket ends or shutdown is requested.
async fn read_loop(
    kind: ConnectionKind,
    mut read: WsReader,
    inbound: mpsc::UnboundedSender<InboundFrame>,
    shutdown: CancellationToken,
) {
    let reason = loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                debug!(%kind, "Read loop cancelled");
                return;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let frame = InboundFrame::Text {
                        kind,
                        text: text.as_str().to_owned(),
                    };
                    if inbound.send(frame).is_err() {
                        debug!(%kind, "Inbound queue closed");
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or_else(
                        || "closed by server".to_string(),
                        |f| format!("closed by server: {}", f.reason.as_str()),
                    );
                }
                Some(Ok(_)) => {} // Binary/Ping/Pong frames
                Some(Err(e)) => {
                    warn!(%kind, error = %e, "WebSocket error");
                    break e.to_string();
                }
                None => break "stream ended".to_string(),
            }
        }
    };

    warn!(%kind, reason = reason.as_str(), "WebSocket connection lost");
    shutdown.cancel();
    let _ = inbound.send(InboundFrame::Closed { kind, reason });
}

/// Sends an application-level ping every `interval`. A failed ping is
/// logged and does not close the connection.
async fn ping_loop(connection: Weak<Connection>, interval: Duration, req_ids: Arc<AtomicU64>) {
    let Some(shutdown) = connection.upgrade().map(|c| c.shutdown.clone()) else {
        return;
    };

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                let Some(connection) = connection.upgrade() else {
                    return;
                };
                let reqid = req_ids.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = connection.send_ping(reqid).await {
                    warn!(kind = %connection.kind, error = %e, "Ping failed");
                }
            }
        }
    }
}
