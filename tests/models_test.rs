//! Serialization tests for request messages and the Channel enum.

use krakenlink::models::add_order::{AddOrderBuilder, OrderFlag, OrderSide, TimeInForce};
use krakenlink::models::cancel_all::CancelAllRequest;
use krakenlink::models::cancel_order::CancelOrderBuilder;
use krakenlink::models::{Channel, PingRequest, SubscribeOptions, SubscriptionRequest};
use rust_decimal_macros::dec;

fn to_value<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).expect("Failed to serialize")
}

#[test]
fn test_channel_wire_names_round_trip() {
    for channel in [
        Channel::Ticker,
        Channel::Ohlc,
        Channel::Trade,
        Channel::Spread,
        Channel::Book,
        Channel::OwnTrades,
        Channel::OpenOrders,
    ] {
        assert_eq!(Channel::from_wire(channel.as_str()), Some(channel));
    }
    assert_eq!(Channel::from_wire("book-25"), Some(Channel::Book));
    assert_eq!(Channel::from_wire("ohlc-1440"), Some(Channel::Ohlc));
    assert_eq!(Channel::from_wire("level3"), None);
}

#[test]
fn test_ping_request_serializes() {
    let value = to_value(&PingRequest::new(42));
    assert_eq!(value["event"], "ping");
    assert_eq!(value["reqid"], 42);
}

#[test]
fn test_book_subscribe_request_serializes() {
    let params = SubscribeOptions::depth(25)
        .to_params(Channel::Book)
        .expect("Depth 25 is valid");
    let pairs = vec!["XBT/USD".to_string(), "ETH/USD".to_string()];
    let value = to_value(&SubscriptionRequest::subscribe(7, &pairs, params));

    assert_eq!(value["event"], "subscribe");
    assert_eq!(value["reqid"], 7);
    assert_eq!(value["pair"][1], "ETH/USD");
    assert_eq!(value["subscription"]["name"], "book");
    assert_eq!(value["subscription"]["depth"], 25);
    assert!(value["subscription"].get("interval").is_none());
}

#[test]
fn test_private_subscribe_request_carries_token_and_no_pair() {
    let params = SubscribeOptions::default()
        .to_params(Channel::OwnTrades)
        .expect("Default options are valid")
        .with_token("WW91ciBhdXRoZW50aWNhdGlvbiB0b2tlbiBnb2VzIGhlcmUu");
    let request = SubscriptionRequest::subscribe(1, &[], params);
    let value = to_value(&request);

    assert!(value.get("pair").is_none());
    assert_eq!(value["subscription"]["name"], "ownTrades");
    assert_eq!(
        value["subscription"]["token"],
        "WW91ciBhdXRoZW50aWNhdGlvbiB0b2tlbiBnb2VzIGhlcmUu"
    );
    assert!(!format!("{request:?}").contains("WW91ciBhdXRo"));
}

#[test]
fn test_invalid_interval_is_rejected() {
    assert!(SubscribeOptions::interval(7).to_params(Channel::Ohlc).is_err());
    assert!(SubscribeOptions::interval(21600).to_params(Channel::Ohlc).is_ok());
}

#[test]
fn test_add_order_request_serializes() {
    let request = AddOrderBuilder::limit(OrderSide::Sell, "XBT/USD", dec!(1.25), dec!(30000.5))
        .with_flag(OrderFlag::Post)
        .with_time_in_force(TimeInForce::Ioc)
        .with_userref(17)
        .with_validate(true)
        .with_reqid(9)
        .build_request("token")
        .expect("Order is valid");
    let value = to_value(&request);

    assert_eq!(value["event"], "addOrder");
    assert_eq!(value["ordertype"], "limit");
    assert_eq!(value["type"], "sell");
    assert_eq!(value["pair"], "XBT/USD");
    assert_eq!(value["volume"], "1.25");
    assert_eq!(value["price"], "30000.5");
    assert_eq!(value["oflags"], "post");
    assert_eq!(value["timeinforce"], "IOC");
    assert_eq!(value["userref"], 17);
    assert_eq!(value["validate"], "true");
    assert_eq!(value["reqid"], 9);
}

#[test]
fn test_stop_loss_limit_requires_secondary_price() {
    let result = AddOrderBuilder::new(
        krakenlink::models::add_order::OrderType::StopLossLimit,
        OrderSide::Buy,
        "XBT/USD",
        dec!(1),
    )
    .with_price(dec!(100))
    .build_request("token");
    assert!(result.is_err());
}

#[test]
fn test_cancel_order_request_serializes() {
    let request = CancelOrderBuilder::by_txid("OGTT3Y-C6I3P-XRI6HX")
        .with_reqid(3)
        .build_request("token")
        .expect("Cancel is valid");
    let value = to_value(&request);

    assert_eq!(value["event"], "cancelOrder");
    assert_eq!(value["txid"][0], "OGTT3Y-C6I3P-XRI6HX");
    assert_eq!(value["token"], "token");
}

#[test]
fn test_cancel_all_request_serializes() {
    let value = to_value(&CancelAllRequest::new("token", Some(5)));
    assert_eq!(value["event"], "cancelAll");
    assert_eq!(value["reqid"], 5);
}
