//! Async WebSocket client for the Kraken WebSocket v1 API.
//!
//! This module is organized by concern:
//! - [`connection`] - Socket transport: read pump and keepalive pings
//! - [`frame`] - Classification of raw frames and channel payload decoding
//! - [`subscription`] - Subscription registry
//! - [`pending`] - Request/acknowledgement correlation
//! - `handler` - Event handling and channel data routing
//! - `trading` - Order actions
//! - `client` - The [`KrakenWsClient`] facade tying it together

mod client;
pub mod connection;
mod event;
pub mod frame;
mod handler;
pub mod pending;
pub mod subscription;
mod trading;

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tracing::{debug, info};
use tungstenite::Message;

use crate::Result;
use crate::models::PingRequest;

pub use client::KrakenWsClient;
pub use connection::{Connection, ConnectionKind, InboundFrame};
pub use event::MarketEvent;
pub use pending::{BatchCancel, PendingRequests, PendingResponse, SubscribeOutcome};
pub use subscription::{Subscription, SubscriptionRegistry, SubscriptionState};
pub use trading::OrderPlaced;

/// Version of the WebSocket API this client was written against.
pub const SUPPORTED_WS_VERSION: &str = "1.9.0";

/// Write half of a Kraken WebSocket connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a Kraken WebSocket connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Establishes a WebSocket connection to the given URL.
///
/// `wss://` URLs are dialed through rustls with `tls_config`; plain `ws://`
/// URLs (local test servers) skip TLS.
///
/// # Errors
///
/// Returns a [`LinkError`](crate::LinkError) if the connection or TLS
/// handshake fails.
pub async fn connect(url: &str, tls_config: Arc<rustls::ClientConfig>) -> Result<(WsWriter, WsReader)> {
    let connector = url
        .starts_with("wss://")
        .then(|| Connector::Rustls(tls_config));
    let (ws_stream, _) = connect_async_tls_with_config(url, None, false, connector).await?;
    info!(url, "WebSocket handshake completed");

    Ok(ws_stream.split())
}

/// Sends a ping message over the WebSocket to test connection liveness.
///
/// # Errors
///
/// Returns a [`LinkError`](crate::LinkError) if sending the message fails.
pub async fn ping(write: &mut WsWriter, reqid: u64) -> Result<()> {
    let request = PingRequest::new(reqid);
    let json = serde_json::to_string(&request)?;
    write.send(Message::Text(json.into())).await?;
    debug!(reqid, "Sent ping");

    Ok(())
}
