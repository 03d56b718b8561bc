//! Cancel all orders models.
//!
//! Cancels every open order of the account, including untriggered orders.
//! The `cancelAllStatus` acknowledgement reports how many were cancelled.

use serde::Serialize;

/// The `cancelAll` request message.
#[derive(Debug, Clone, Serialize)]
pub struct CancelAllRequest {
    event: &'static str,
    token: super::RedactedToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    reqid: Option<u64>,
}

impl CancelAllRequest {
    /// Creates a new `cancelAll` request.
    #[must_use]
    pub fn new(token: &str, reqid: Option<u64>) -> Self {
        Self {
            event: "cancelAll",
            token: super::RedactedToken::new(token),
            reqid,
        }
    }

    /// Returns the request ID if set.
    #[must_use]
    pub fn reqid(&self) -> Option<u64> {
        self.reqid
    }
}
