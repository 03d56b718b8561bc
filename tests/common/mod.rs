//! Shared test utilities: stub WebSocket and REST servers.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tungstenite::Message;

use krakenlink::config::KrakenConfig;
use krakenlink::websocket::MarketEvent;

/// Kraken WebSocket v1 public endpoint URL.
pub const KRAKEN_WS_URL: &str = "wss://ws.kraken.com";

/// Base64 secret used by every stub that needs signed requests.
pub const TEST_SECRET: &str = "kQH5HW/8p1uGOVjbgWA7FunAmGO8lsSUXNsu3eow76sz84Q18fWxnyRzBHCd3pd5nE9qa99HAZtuZuj6F1huXg==";
pub const TEST_KEY: &str = "test-api-key";

/// Computes the frames a stub WebSocket server sends back for one
/// client request.
pub type Responder = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

enum StubCommand {
    Frame(String),
    Disconnect,
}

/// A stub WebSocket server serving one connection at a time.
pub struct WsStub {
    pub url: String,
    commands: mpsc::UnboundedSender<StubCommand>,
    connections: Arc<AtomicUsize>,
}

impl WsStub {
    /// Sends an unsolicited frame to the connected client.
    pub fn push(&self, frame: Value) {
        self.push_raw(&frame.to_string());
    }

    /// Sends a raw text frame to the connected client.
    pub fn push_raw(&self, text: &str) {
        self.commands
            .send(StubCommand::Frame(text.to_string()))
            .expect("stub server stopped");
    }

    /// Drops the current connection without a close handshake. The server
    /// keeps accepting new connections.
    pub fn disconnect(&self) {
        self.commands
            .send(StubCommand::Disconnect)
            .expect("stub server stopped");
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Starts a stub WebSocket server on `127.0.0.1:0`.
///
/// Each connection is greeted with an `online` systemStatus; pings are
/// answered with pongs and every other request with `responder`.
pub async fn spawn_ws_server(responder: Responder) -> WsStub {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub server");
    let addr = listener.local_addr().expect("Failed to read local address");
    let (command_tx, mut command_rx) = mpsc::unbounded_channel();
    let connections = Arc::new(AtomicUsize::new(0));

    let accepted = Arc::clone(&connections);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            accepted.fetch_add(1, Ordering::SeqCst);
            serve_connection(ws, &responder, &mut command_rx).await;
        }
    });

    WsStub {
        url: format!("ws://{addr}"),
        commands: command_tx,
        connections,
    }
}

/// Serves one connection until either side drops it. The connection
/// outlives the [`WsStub`] handle.
async fn serve_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    responder: &Responder,
    commands: &mut mpsc::UnboundedReceiver<StubCommand>,
) {
    let mut commands_open = true;
    let (mut write, mut read) = ws.split();

    let greeting = json!({
        "connectionID": 8628615390848610000u64,
        "event": "systemStatus",
        "status": "online",
        "version": "1.9.0"
    });
    let _ = write.send(Message::Text(greeting.to_string().into())).await;

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let request: Value = serde_json::from_str(text.as_str())
                        .expect("Client sent invalid JSON");
                    let replies = if request["event"] == "ping" {
                        vec![json!({"event": "pong", "reqid": request["reqid"]})]
                    } else {
                        responder(&request)
                    };
                    for reply in replies {
                        if write.send(Message::Text(reply.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            command = commands.recv(), if commands_open => match command {
                Some(StubCommand::Frame(frame)) => {
                    if write.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                Some(StubCommand::Disconnect) => return,
                None => commands_open = false,
            },
        }
    }
}

/// Acknowledges subscribe and unsubscribe requests pair by pair,
/// refusing the pairs listed in `unsupported`.
pub fn subscription_responder(unsupported: &'static [&'static str]) -> Responder {
    let next_channel_id = Arc::new(AtomicU64::new(100));
    Arc::new(move |request: &Value| {
        let event = request["event"].as_str().unwrap_or_default();
        if event != "subscribe" && event != "unsubscribe" {
            return Vec::new();
        }
        let name = request["subscription"]["name"].as_str().unwrap_or_default();
        let channel_name = match (name, &request["subscription"]) {
            ("book", sub) => format!("book-{}", sub["depth"].as_u64().unwrap_or(10)),
            ("ohlc", sub) => format!("ohlc-{}", sub["interval"].as_u64().unwrap_or(1)),
            _ => name.to_string(),
        };

        let pairs: Vec<Option<String>> = match request["pair"].as_array() {
            Some(pairs) => pairs
                .iter()
                .map(|p| p.as_str().map(str::to_string))
                .collect(),
            None => vec![None],
        };

        pairs
            .into_iter()
            .map(|pair| {
                let mut ack = json!({
                    "event": "subscriptionStatus",
                    "reqid": request["reqid"],
                    "channelName": channel_name,
                    "subscription": request["subscription"].clone(),
                });
                if let Some(pair) = &pair {
                    ack["pair"] = json!(pair);
                }
                if pair.as_deref().is_some_and(|p| unsupported.contains(&p)) {
                    ack["status"] = json!("error");
                    ack["errorMessage"] = json!("Currency pair not supported");
                } else if event == "subscribe" {
                    ack["status"] = json!("subscribed");
                    if pair.is_some() {
                        ack["channelID"] = json!(next_channel_id.fetch_add(1, Ordering::Relaxed));
                    }
                } else {
                    ack["status"] = json!("unsubscribed");
                }
                ack
            })
            .collect()
    })
}

/// A client configuration pointing at local stubs.
pub fn stub_config(websocket_url: &str) -> KrakenConfig {
    KrakenConfig {
        websocket_url: websocket_url.to_string(),
        request_timeout: Duration::from_secs(2),
        ..KrakenConfig::default()
    }
}

/// Receives events until `matches` accepts one, failing after two seconds.
pub async fn next_event(
    events: &mut mpsc::UnboundedReceiver<MarketEvent>,
    matches: impl Fn(&MarketEvent) -> bool,
) -> MarketEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("Event stream ended");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("Timed out waiting for event")
}

/// Starts an axum REST stub serving `router` on `127.0.0.1:0` and returns
/// its base URL.
pub async fn spawn_rest_server(router: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind REST stub");
    let addr = listener.local_addr().expect("Failed to read local address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("REST stub failed");
    });
    format!("http://{addr}")
}
