//! Cancel order models.
//!
//! Like `addOrder`, `cancelOrder` is a one-shot request answered by a
//! single `cancelOrderStatus` event. The exchange accepts several ids per
//! request but acknowledges them with one status, so the client sends one
//! request per id to learn which ones failed.

use serde::Serialize;

use crate::LinkError;

/// The `cancelOrder` request message.
#[derive(Debug, Clone, Serialize)]
pub struct CancelOrderRequest {
    event: &'static str,
    token: super::RedactedToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    reqid: Option<u64>,
    txid: Vec<String>,
}

impl CancelOrderRequest {
    /// Returns the request ID if set.
    #[must_use]
    pub fn reqid(&self) -> Option<u64> {
        self.reqid
    }

    /// Returns the order ids (txid or userref) to cancel.
    #[must_use]
    pub fn txids(&self) -> &[String] {
        &self.txid
    }
}

/// Builder for constructing `cancelOrder` requests.
#[derive(Debug, Clone, Default)]
pub struct CancelOrderBuilder {
    txids: Vec<String>,
    reqid: Option<u64>,
}

impl CancelOrderBuilder {
    /// Creates a builder to cancel orders by Kraken transaction id.
    #[must_use]
    pub fn by_txids(txids: Vec<String>) -> Self {
        Self {
            txids,
            reqid: None,
        }
    }

    /// Creates a builder to cancel a single order.
    #[must_use]
    pub fn by_txid(txid: &str) -> Self {
        Self::by_txids(vec![txid.to_string()])
    }

    /// Creates a builder to cancel every order carrying `userref`.
    #[must_use]
    pub fn by_userref(userref: i32) -> Self {
        Self::by_txids(vec![userref.to_string()])
    }

    /// Sets the request ID for correlation.
    #[must_use]
    pub fn with_reqid(mut self, reqid: u64) -> Self {
        self.reqid = Some(reqid);
        self
    }

    /// Validates and builds the full request.
    ///
    /// # Errors
    ///
    /// Returns an error if no order identifiers are provided.
    pub fn build_request(self, token: &str) -> Result<CancelOrderRequest, CancelOrderError> {
        if self.txids.is_empty() {
            return Err(CancelOrderError::NoOrderIdentifier);
        }
        if self.txids.iter().any(|id| id.trim().is_empty()) {
            return Err(CancelOrderError::EmptyOrderIdentifier);
        }

        Ok(CancelOrderRequest {
            event: "cancelOrder",
            token: super::RedactedToken::new(token),
            reqid: self.reqid,
            txid: self.txids,
        })
    }
}

/// Errors that can occur when building a `cancelOrder` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOrderError {
    /// At least one order identifier must be provided.
    NoOrderIdentifier,
    EmptyOrderIdentifier,
}

impl std::fmt::Display for CancelOrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoOrderIdentifier => write!(f, "at least one txid must be provided"),
            Self::EmptyOrderIdentifier => write!(f, "txid must not be empty"),
        }
    }
}

impl std::error::Error for CancelOrderError {}

impl From<CancelOrderError> for LinkError {
    fn from(err: CancelOrderError) -> Self {
        LinkError::Order(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_cancel_by_txid() {
        let request = CancelOrderBuilder::by_txid("OM5CRX-N2HAL-GFGWE9")
            .with_reqid(123456789)
            .build_request("test_token")
            .unwrap();

        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["event"], "cancelOrder");
        assert_eq!(value["reqid"], 123456789);
        assert_eq!(value["token"], "test_token");
        assert_eq!(value["txid"], serde_json::json!(["OM5CRX-N2HAL-GFGWE9"]));
    }

    #[test]
    fn serialize_cancel_by_userref() {
        let request = CancelOrderBuilder::by_userref(42)
            .build_request("test_token")
            .unwrap();

        assert_eq!(request.txids(), ["42".to_string()]);
        assert!(serde_json::to_value(&request).unwrap().get("reqid").is_none());
    }

    #[test]
    fn validate_requires_identifier() {
        assert_eq!(
            CancelOrderBuilder::by_txids(Vec::new())
                .build_request("token")
                .unwrap_err(),
            CancelOrderError::NoOrderIdentifier
        );
        assert_eq!(
            CancelOrderBuilder::by_txid("")
                .build_request("token")
                .unwrap_err(),
            CancelOrderError::EmptyOrderIdentifier
        );
    }
}
