//! Add order models.
//!
//! Provides types for placing orders over the authenticated WebSocket
//! connection. Unlike subscription channels, `addOrder` is a one-shot
//! request answered by a single `addOrderStatus` event.

use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

use crate::LinkError;

/// Order type specifying how the order should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    TakeProfit,
    StopLossLimit,
    TakeProfitLimit,
    TrailingStop,
    TrailingStopLimit,
    SettlePosition,
}

impl OrderType {
    fn requires_price(self) -> bool {
        !matches!(self, OrderType::Market | OrderType::SettlePosition)
    }

    fn requires_price2(self) -> bool {
        matches!(
            self,
            OrderType::StopLossLimit | OrderType::TakeProfitLimit | OrderType::TrailingStopLimit
        )
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Time in force specifying how long the order remains active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Good 'til cancelled (default).
    Gtc,
    /// Good 'til date (requires an expire time).
    Gtd,
    /// Immediate or cancel.
    Ioc,
}

/// Order flags sent as the comma-separated `oflags` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFlag {
    /// Post-only.
    Post,
    /// Prefer fee in base currency.
    Fcib,
    /// Prefer fee in quote currency.
    Fciq,
    /// No market price protection.
    Nompp,
    /// Volume expressed in quote currency.
    Viqc,
}

impl OrderFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderFlag::Post => "post",
            OrderFlag::Fcib => "fcib",
            OrderFlag::Fciq => "fciq",
            OrderFlag::Nompp => "nompp",
            OrderFlag::Viqc => "viqc",
        }
    }
}

/// Close order placed once the primary order fills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseOrder {
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub price2: Option<Decimal>,
}

fn bool_as_str<S: Serializer>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_str(if *v { "true" } else { "false" }),
        None => serializer.serialize_none(),
    }
}

/// The `addOrder` request message.
#[derive(Debug, Clone, Serialize)]
pub struct AddOrderRequest {
    event: &'static str,
    token: super::RedactedToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    reqid: Option<u64>,
    ordertype: OrderType,
    #[serde(rename = "type")]
    side: OrderSide,
    pair: String,
    volume: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price2: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    leverage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    oflags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeinforce: Option<TimeInForce>,
    #[serde(skip_serializing_if = "Option::is_none")]
    starttm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiretm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    userref: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reduce_only: Option<bool>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "bool_as_str"
    )]
    validate: Option<bool>,
    #[serde(rename = "close[ordertype]", skip_serializing_if = "Option::is_none")]
    close_ordertype: Option<OrderType>,
    #[serde(rename = "close[price]", skip_serializing_if = "Option::is_none")]
    close_price: Option<Decimal>,
    #[serde(rename = "close[price2]", skip_serializing_if = "Option::is_none")]
    close_price2: Option<Decimal>,
}

impl AddOrderRequest {
    /// Returns the request ID if set.
    #[must_use]
    pub fn reqid(&self) -> Option<u64> {
        self.reqid
    }

    /// Returns the pair the order is placed on.
    #[must_use]
    pub fn pair(&self) -> &str {
        &self.pair
    }
}

/// Builder for constructing `addOrder` requests with validation.
#[derive(Debug, Clone)]
pub struct AddOrderBuilder {
    order_type: OrderType,
    side: OrderSide,
    pair: String,
    volume: Decimal,
    price: Option<Decimal>,
    price2: Option<Decimal>,
    leverage: Option<u32>,
    oflags: Vec<OrderFlag>,
    time_in_force: Option<TimeInForce>,
    start_time: Option<String>,
    expire_time: Option<String>,
    userref: Option<i32>,
    reduce_only: Option<bool>,
    validate: Option<bool>,
    close: Option<CloseOrder>,
    reqid: Option<u64>,
}

impl AddOrderBuilder {
    /// Creates a new builder for a market order.
    #[must_use]
    pub fn market(side: OrderSide, pair: &str, volume: Decimal) -> Self {
        Self::new(OrderType::Market, side, pair, volume)
    }

    /// Creates a new builder for a limit order.
    #[must_use]
    pub fn limit(side: OrderSide, pair: &str, volume: Decimal, price: Decimal) -> Self {
        Self::new(OrderType::Limit, side, pair, volume).with_price(price)
    }

    /// Creates a new builder for a stop-loss order triggered at `trigger`.
    #[must_use]
    pub fn stop_loss(side: OrderSide, pair: &str, volume: Decimal, trigger: Decimal) -> Self {
        Self::new(OrderType::StopLoss, side, pair, volume).with_price(trigger)
    }

    /// Creates a new builder for a stop-loss limit order.
    #[must_use]
    pub fn stop_loss_limit(
        side: OrderSide,
        pair: &str,
        volume: Decimal,
        trigger: Decimal,
        limit: Decimal,
    ) -> Self {
        Self::new(OrderType::StopLossLimit, side, pair, volume)
            .with_price(trigger)
            .with_price2(limit)
    }

    /// Creates a new builder for a take-profit order triggered at `trigger`.
    #[must_use]
    pub fn take_profit(side: OrderSide, pair: &str, volume: Decimal, trigger: Decimal) -> Self {
        Self::new(OrderType::TakeProfit, side, pair, volume).with_price(trigger)
    }

    /// Creates a new builder for a take-profit limit order.
    #[must_use]
    pub fn take_profit_limit(
        side: OrderSide,
        pair: &str,
        volume: Decimal,
        trigger: Decimal,
        limit: Decimal,
    ) -> Self {
        Self::new(OrderType::TakeProfitLimit, side, pair, volume)
            .with_price(trigger)
            .with_price2(limit)
    }

    /// Creates a builder for an arbitrary order type.
    #[must_use]
    pub fn new(order_type: OrderType, side: OrderSide, pair: &str, volume: Decimal) -> Self {
        Self {
            order_type,
            side,
            pair: pair.to_string(),
            volume,
            price: None,
            price2: None,
            leverage: None,
            oflags: Vec::new(),
            time_in_force: None,
            start_time: None,
            expire_time: None,
            userref: None,
            reduce_only: None,
            validate: None,
            close: None,
            reqid: None,
        }
    }

    /// Sets the primary price (limit or trigger price).
    #[must_use]
    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    /// Sets the secondary price (limit price of `*-limit` orders).
    #[must_use]
    pub fn with_price2(mut self, price: Decimal) -> Self {
        self.price2 = Some(price);
        self
    }

    /// Sets the desired leverage.
    #[must_use]
    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = Some(leverage);
        self
    }

    /// Adds an order flag.
    #[must_use]
    pub fn with_flag(mut self, flag: OrderFlag) -> Self {
        if !self.oflags.contains(&flag) {
            self.oflags.push(flag);
        }
        self
    }

    /// Sets the time in force.
    #[must_use]
    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = Some(tif);
        self
    }

    /// Sets the scheduled start time (`0`, `+<seconds>` or a unix timestamp).
    #[must_use]
    pub fn with_start_time(mut self, start: &str) -> Self {
        self.start_time = Some(start.to_string());
        self
    }

    /// Sets the expiration time (required for GTD orders).
    #[must_use]
    pub fn with_expire_time(mut self, expire: &str) -> Self {
        self.expire_time = Some(expire.to_string());
        self
    }

    /// Sets the user reference.
    #[must_use]
    pub fn with_userref(mut self, userref: i32) -> Self {
        self.userref = Some(userref);
        self
    }

    /// Sets the reduce-only flag.
    #[must_use]
    pub fn with_reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = Some(reduce_only);
        self
    }

    /// Sets validate mode (dry-run without placing order).
    #[must_use]
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = Some(validate);
        self
    }

    /// Attaches a close order.
    #[must_use]
    pub fn with_close(mut self, close: CloseOrder) -> Self {
        self.close = Some(close);
        self
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
    /// Returns an error if required fields are missing for the order type.
    pub fn build_request(self, token: &str) -> Result<AddOrderRequest, AddOrderError> {
        self.validate()?;

        let oflags = (!self.oflags.is_empty()).then(|| {
            self.oflags
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(",")
        });
        let (close_ordertype, close_price, close_price2) = match self.close {
            Some(close) => (Some(close.order_type), close.price, close.price2),
            None => (None, None, None),
        };

        Ok(AddOrderRequest {
            event: "addOrder",
            token: super::RedactedToken::new(token),
            reqid: self.reqid,
            ordertype: self.order_type,
            side: self.side,
            pair: self.pair,
            volume: self.volume,
            price: self.price,
            price2: self.price2,
            leverage: self.leverage.map(|l| l.to_string()),
            oflags,
            timeinforce: self.time_in_force,
            starttm: self.start_time,
            expiretm: self.expire_time,
            userref: self.userref,
            reduce_only: self.reduce_only,
            validate: self.validate,
            close_ordertype,
            close_price,
            close_price2,
        })
    }

    fn validate(&self) -> Result<(), AddOrderError> {
        if self.pair.trim().is_empty() {
            return Err(AddOrderError::MissingPair);
        }

        if self.volume <= Decimal::ZERO {
            return Err(AddOrderError::InvalidVolume(self.volume));
        }

        if self.order_type.requires_price() && self.price.is_none() {
            return Err(AddOrderError::MissingPrice(self.order_type));
        }

        if self.order_type.requires_price2() && self.price2.is_none() {
            return Err(AddOrderError::MissingSecondaryPrice(self.order_type));
        }

        if self.time_in_force == Some(TimeInForce::Gtd) && self.expire_time.is_none() {
            return Err(AddOrderError::MissingExpireTime);
        }

        if let Some(close) = &self.close
            && close.order_type.requires_price()
            && close.price.is_none()
        {
            return Err(AddOrderError::MissingClosePrice(close.order_type));
        }

        Ok(())
    }
}

/// Errors that can occur when building an `addOrder` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOrderError {
    MissingPair,
    /// Volume must be strictly positive.
    InvalidVolume(Decimal),
    /// Price is required for this order type.
    MissingPrice(OrderType),
    /// Secondary price is required for this order type.
    MissingSecondaryPrice(OrderType),
    /// Expire time is required for GTD orders.
    MissingExpireTime,
    /// Close order of this type needs a price.
    MissingClosePrice(OrderType),
}

impl std::fmt::Display for AddOrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPair => write!(f, "pair is required"),
            Self::InvalidVolume(v) => write!(f, "volume must be positive, got {v}"),
            Self::MissingPrice(ot) => write!(f, "price required for {ot:?} orders"),
            Self::MissingSecondaryPrice(ot) => write!(f, "price2 required for {ot:?} orders"),
            Self::MissingExpireTime => write!(f, "expire time required for GTD orders"),
            Self::MissingClosePrice(ot) => write!(f, "close price required for {ot:?} close orders"),
        }
    }
}

impl std::error::Error for AddOrderError {}

impl From<AddOrderError> for LinkError {
    fn from(err: AddOrderError) -> Self {
        LinkError::Order(err.to_string())
    }
}
