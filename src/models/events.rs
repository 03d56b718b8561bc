//! Event frames: JSON objects discriminated by their `event` member.

use serde::Deserialize;

/// Outcome carried in the `status` member of acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Error,
    Subscribed,
    Unsubscribed,
}

impl AckStatus {
    /// Returns `true` for every status other than `error`.
    pub fn is_success(self) -> bool {
        self != AckStatus::Error
    }
}

/// `systemStatus`, sent once after connecting and on every status change.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemStatus {
    #[serde(rename = "connectionID", default)]
    pub connection_id: Option<u64>,
    /// `online`, `maintenance`, `cancel_only`, `limit_only` or `post_only`.
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// `subscription` object echoed in a [`SubscriptionStatus`].
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionDetail {
    pub name: String,
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub interval: Option<u32>,
}

/// `subscriptionStatus`, one per pair of a subscribe/unsubscribe request.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionStatus {
    /// Absent on private channels and on errors.
    #[serde(rename = "channelID", default)]
    pub channel_id: Option<u64>,
    #[serde(rename = "channelName", default)]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub pair: Option<String>,
    #[serde(default)]
    pub reqid: Option<u64>,
    pub status: AckStatus,
    #[serde(default)]
    pub subscription: Option<SubscriptionDetail>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

/// `addOrderStatus`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddOrderStatus {
    #[serde(default)]
    pub reqid: Option<u64>,
    pub status: AckStatus,
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub descr: Option<String>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

/// `cancelOrderStatus`.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelOrderStatus {
    #[serde(default)]
    pub reqid: Option<u64>,
    pub status: AckStatus,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

/// `cancelAllStatus`.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelAllStatus {
    #[serde(default)]
    pub reqid: Option<u64>,
    pub status: AckStatus,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

/// Generic `error` event, e.g. for a request the server could not parse.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    pub reqid: Option<u64>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

/// Every event frame the client understands.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EventMessage {
    Heartbeat,
    Pong {
        #[serde(default)]
        reqid: Option<u64>,
    },
    SystemStatus(SystemStatus),
    SubscriptionStatus(SubscriptionStatus),
    AddOrderStatus(AddOrderStatus),
    CancelOrderStatus(CancelOrderStatus),
    CancelAllStatus(CancelAllStatus),
    Error(ErrorEvent),
    /// Any `event` value not listed above.
    #[serde(other)]
    Unknown,
}

impl EventMessage {
    /// Correlation id echoed by the server, if any.
    pub fn reqid(&self) -> Option<u64> {
        match self {
            EventMessage::Pong { reqid } => *reqid,
            EventMessage::SubscriptionStatus(s) => s.reqid,
            EventMessage::AddOrderStatus(s) => s.reqid,
            EventMessage::CancelOrderStatus(s) => s.reqid,
            EventMessage::CancelAllStatus(s) => s.reqid,
            EventMessage::Error(e) => e.reqid,
            EventMessage::Heartbeat | EventMessage::SystemStatus(_) | EventMessage::Unknown => None,
        }
    }

    /// Error message carried by a failed acknowledgement.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            EventMessage::SubscriptionStatus(s) => s.error_message.as_deref(),
            EventMessage::AddOrderStatus(s) => s.error_message.as_deref(),
            EventMessage::CancelOrderStatus(s) => s.error_message.as_deref(),
            EventMessage::CancelAllStatus(s) => s.error_message.as_deref(),
            EventMessage::Error(e) => e.error_message.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subscription_ack() {
        let raw = r#"{"channelID":10001,"channelName":"book-10","event":"subscriptionStatus","pair":"XBT/EUR","reqid":42,"status":"subscribed","subscription":{"depth":10,"name":"book"}}"#;
        let EventMessage::SubscriptionStatus(ack) = serde_json::from_str(raw).unwrap() else {
            panic!("expected subscriptionStatus");
        };
        assert_eq!(ack.channel_id, Some(10001));
        assert_eq!(ack.pair.as_deref(), Some("XBT/EUR"));
        assert_eq!(ack.status, AckStatus::Subscribed);
        assert_eq!(ack.subscription.unwrap().depth, Some(10));
    }

    #[test]
    fn parses_subscription_error() {
        let raw = r#"{"errorMessage":"Currency pair not supported","event":"subscriptionStatus","pair":"XBT/BTC","reqid":3,"status":"error","subscription":{"name":"ticker"}}"#;
        let event: EventMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(event.reqid(), Some(3));
        assert_eq!(event.error_message(), Some("Currency pair not supported"));
    }

    #[test]
    fn parses_order_acks() {
        let raw = r#"{"descr":"buy 0.01 XBTUSD @ limit 9000","event":"addOrderStatus","reqid":5,"status":"ok","txid":"ONPNXH-KMKMU-F4MR5V"}"#;
        let EventMessage::AddOrderStatus(ack) = serde_json::from_str(raw).unwrap() else {
            panic!("expected addOrderStatus");
        };
        assert!(ack.status.is_success());
        assert_eq!(ack.txid.as_deref(), Some("ONPNXH-KMKMU-F4MR5V"));

        let raw = r#"{"count":2,"event":"cancelAllStatus","status":"ok","reqid":9}"#;
        let EventMessage::CancelAllStatus(ack) = serde_json::from_str(raw).unwrap() else {
            panic!("expected cancelAllStatus");
        };
        assert_eq!(ack.count, Some(2));
    }

    #[test]
    fn unknown_event_does_not_fail() {
        let event: EventMessage = serde_json::from_str(r#"{"event":"somethingNew"}"#).unwrap();
        assert!(matches!(event, EventMessage::Unknown));
    }

    #[test]
    fn parses_heartbeat_and_status() {
        assert!(matches!(
            serde_json::from_str::<EventMessage>(r#"{"event":"heartbeat"}"#).unwrap(),
            EventMessage::Heartbeat
        ));
        let raw = r#"{"connectionID":8628615390848610000,"event":"systemStatus","status":"online","version":"1.0.0"}"#;
        let EventMessage::SystemStatus(status) = serde_json::from_str(raw).unwrap() else {
            panic!("expected systemStatus");
        };
        assert_eq!(status.status, "online");
        assert_eq!(status.version.as_deref(), Some("1.0.0"));
    }
}
