//! Order actions over the authenticated connection.
//!
//! Every action carries the current WS token and a fresh `reqid`, and
//! returns once the matching `*Status` acknowledgement arrived.

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tracing::{info, warn};

use super::client::KrakenWsClient;
use super::pending::BatchCancel;
use crate::auth::is_auth_error;
use crate::models::add_order::AddOrderBuilder;
use crate::models::cancel_all::CancelAllRequest;
use crate::models::cancel_order::{CancelOrderBuilder, CancelOrderError};
use crate::models::events::{AckStatus, EventMessage};
use crate::{LinkError, Result};

/// A placed order, as acknowledged by the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPlaced {
    pub txid: String,
    /// Human-readable order summary, e.g. `"buy 0.01 XBTUSD @ limit 9000"`.
    pub descr: Option<String>,
}

/// Maps a failed acknowledgement to the error callers see.
fn rejection(message: Option<&str>) -> LinkError {
    let message = message.unwrap_or("request rejected").to_string();
    if is_auth_error(&message) {
        LinkError::Auth(message)
    } else {
        LinkError::Order(message)
    }
}

fn single_ack(mut acks: Vec<EventMessage>) -> Result<EventMessage> {
    acks.pop()
        .ok_or_else(|| LinkError::MalformedMessage("empty acknowledgement".into()))
}

impl KrakenWsClient {
    /// Places an order.
    ///
    /// The client assigns the request id; one set on the builder is
    /// replaced.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Order`] if the builder fails validation or the
    ///   exchange rejects the order
    /// - [`LinkError::Auth`] if the exchange rejects the token
    /// - [`LinkError::MissingCredentials`], [`LinkError::Timeout`] or a
    ///   transport error
    pub async fn add_order(&self, order: AddOrderBuilder) -> Result<OrderPlaced> {
        let inner = self.inner();
        let (connection, token) = inner.authenticated().await?;
        let reqid = inner.next_reqid();
        let request = order.with_reqid(reqid).build_request(&token)?;

        let response = inner.pending.register(reqid, 1, connection.kind())?;
        connection.send_json(&request).await?;
        info!(reqid, pair = request.pair(), "Sent addOrder request");

        match single_ack(response.wait(inner.config.request_timeout).await?)? {
            EventMessage::AddOrderStatus(status) if status.status.is_success() => {
                let txid = status
                    .txid
                    .ok_or_else(|| LinkError::MalformedMessage("addOrderStatus without txid".into()))?;
                Ok(OrderPlaced {
                    txid,
                    descr: status.descr,
                })
            }
            other => Err(rejection(other.error_message())),
        }
    }

    /// Cancels one order by txid or userref.
    ///
    /// # Errors
    ///
    /// See [`KrakenWsClient::cancel_orders`]; a refusal surfaces as
    /// [`LinkError::Order`].
    pub async fn cancel_order(&self, txid: &str) -> Result<()> {
        match self.cancel_orders(&[txid.to_string()]).await {
            Ok(_) => Ok(()),
            Err(LinkError::BatchCancel { first_error, .. }) => Err(rejection(first_error.as_deref())),
            Err(e) => Err(e),
        }
    }

    /// Cancels several orders, sending one request per txid so each
    /// failure can be attributed.
    ///
    /// Returns the number of cancelled orders once every acknowledgement
    /// is in.
    ///
    /// # Errors
    ///
    /// - [`LinkError::BatchCancel`] naming every txid the exchange refused
    /// - [`LinkError::Order`] for an empty list
    /// - [`LinkError::Timeout`] or a transport error, which abandon the
    ///   remaining acknowledgements
    pub async fn cancel_orders(&self, txids: &[String]) -> Result<usize> {
        if txids.is_empty() {
            return Err(CancelOrderError::NoOrderIdentifier.into());
        }

        let inner = self.inner();
        let (connection, token) = inner.authenticated().await?;
        let timeout = inner.config.request_timeout;

        let mut waiting = FuturesUnordered::new();
        for txid in txids {
            let reqid = inner.next_reqid();
            let request = CancelOrderBuilder::by_txid(txid)
                .with_reqid(reqid)
                .build_request(&token)?;
            let response = inner.pending.register(reqid, 1, connection.kind())?;
            connection.send_json(&request).await?;
            waiting.push(async move { (txid, response.wait(timeout).await) });
        }
        info!(count = txids.len(), "Sent cancelOrder requests");

        let mut batch = BatchCancel::new(txids.len());
        while let Some((txid, result)) = waiting.next().await {
            match single_ack(result?)? {
                EventMessage::CancelOrderStatus(status) if status.status != AckStatus::Error => {
                    batch.record_success();
                }
                other => {
                    warn!(txid = txid.as_str(), error = ?other.error_message(), "Cancel refused");
                    batch.record_failure(txid, other.error_message());
                }
            }
        }

        debug_assert!(batch.is_complete());
        batch.into_result()
    }

    /// Cancels every open order of the account and returns how many were
    /// cancelled.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Order`] or [`LinkError::Auth`] if the exchange refuses
    /// - [`LinkError::Timeout`] or a transport error
    pub async fn cancel_all(&self) -> Result<u64> {
        let inner = self.inner();
        let (connection, token) = inner.authenticated().await?;
        let reqid = inner.next_reqid();
        let request = CancelAllRequest::new(&token, Some(reqid));

        let response = inner.pending.register(reqid, 1, connection.kind())?;
        connection.send_json(&request).await?;
        info!(reqid, "Sent cancelAll request");

        match single_ack(response.wait(inner.config.request_timeout).await?)? {
            EventMessage::CancelAllStatus(status) if status.status.is_success() => {
                let count = status.count.unwrap_or(0);
                info!(count, "Cancelled all orders");
                Ok(count)
            }
            other => Err(rejection(other.error_message())),
        }
    }
}
