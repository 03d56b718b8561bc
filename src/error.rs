//! Crate-level error types.
//!
//! [`LinkError`] unifies every error source (transport, protocol, server,
//! integrity, authentication, partial batch failures) behind a single enum
//! so callers can match on the variant they care about while still using
//! the `?` operator for easy propagation.

use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// TLS configuration could not be built.
    #[error("tls error: {0}")]
    Tls(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// An HTTP request failed at the transport level.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame had an unexpected shape or field type.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A fixed-length tagged array had the wrong number of elements.
    #[error("{kind} length mismatch: expected {expected} elements, got {got}")]
    LengthMismatch {
        kind: &'static str,
        expected: usize,
        got: usize,
    },

    /// The server reported one or more hard errors.
    #[error("api error: {}", .0.join(", "))]
    Api(Vec<String>),

    /// The local order book diverged from the exchange.
    #[error("checksum mismatch for {pair}: computed {computed}, expected {expected}")]
    ChecksumMismatch {
        pair: String,
        computed: u32,
        expected: u32,
    },

    /// Signing failed or the exchange rejected our credentials or token.
    #[error("authentication error: {0}")]
    Auth(String),

    /// An authenticated call was made without API credentials.
    #[error("missing API credentials")]
    MissingCredentials,

    /// No live connection of the required kind.
    #[error("not connected: {0}")]
    NotConnected(&'static str),

    /// The connection shut down while a request was outstanding.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// No response arrived for a correlated request in time.
    #[error("timed out waiting for response to request {req_id}")]
    Timeout { req_id: u64 },

    /// A correlation id was registered while still pending.
    #[error("request id {0} is already pending")]
    DuplicateRequestId(u64),

    /// The caller passed arguments the protocol cannot express.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Book depth outside the protocol's permitted set.
    #[error("invalid book depth {0}, expected one of 10, 25, 100, 500, 1000")]
    InvalidDepth(u32),

    /// OHLC interval outside the protocol's permitted set.
    #[error("invalid ohlc interval {0}, expected one of 1, 5, 15, 30, 60, 240, 1440, 10080, 21600")]
    InvalidInterval(u32),

    /// The (channel, pair) tuple already has a live subscription.
    #[error("already subscribed to {channel} for {pair}")]
    DuplicateSubscription { channel: String, pair: String },

    /// No subscription exists for the (channel, pair) tuple.
    #[error("no subscription to {channel} for {pair}")]
    SubscriptionNotFound { channel: String, pair: String },

    /// Some pairs of a subscribe or unsubscribe call failed.
    #[error("{channel} subscription failed for {}", format_failures(.failures))]
    Subscription {
        channel: String,
        failures: Vec<PairFailure>,
    },

    /// Some orders of a multi-order cancel failed.
    #[error(
        "cancel failed for {} order(s) [{}], {successful} succeeded: {}",
        .failed.len(),
        .failed.join(", "),
        .first_error.as_deref().unwrap_or("no error message")
    )]
    BatchCancel {
        failed: Vec<String>,
        successful: usize,
        first_error: Option<String>,
    },

    /// An order action was rejected by the exchange or failed validation.
    #[error("order error: {0}")]
    Order(String),
}

/// A single failing pair within an aggregated subscription error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairFailure {
    pub pair: String,
    pub message: String,
}

impl fmt::Display for PairFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.pair, self.message)
    }
}

fn format_failures(failures: &[PairFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl LinkError {
    /// Returns `true` for errors that mean the socket is gone.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::WebSocket(_) | Self::Http(_) | Self::ConnectionClosed(_) | Self::NotConnected(_)
        )
    }
}
