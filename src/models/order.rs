//! Order model as reported by the brokerage, plus the request used to place one.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Direction of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// Order type. Only simple limit and market orders are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Limit,
    /// Anything else the brokerage may report (stop, trailing_stop, ...)
    #[serde(other)]
    Other,
}

/// How long an order stays working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
}

/// An order owned by the brokerage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Brokerage-assigned order ID
    pub id: String,

    /// Our own idempotency key, if we set one
    #[serde(default)]
    pub client_order_id: Option<String>,

    pub symbol: String,

    pub side: OrderSide,

    #[serde(rename = "type")]
    pub kind: OrderKind,

    /// Requested quantity in shares
    #[serde(default, deserialize_with = "null_as_zero")]
    pub qty: Decimal,

    /// Quantity filled so far
    #[serde(default, deserialize_with = "null_as_zero")]
    pub filled_qty: Decimal,

    /// Average price of the filled quantity
    #[serde(default)]
    pub filled_avg_price: Option<Decimal>,

    #[serde(default)]
    pub limit_price: Option<Decimal>,

    pub submitted_at: DateTime<Utc>,

    /// Brokerage status string (new, accepted, partially_filled, filled, ...)
    #[serde(default)]
    pub status: String,
}

// Notional orders report `qty: null`.
fn null_as_zero<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Decimal>::deserialize(deserializer)?.unwrap_or_default())
}

impl Order {
    /// Time elapsed since submission.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.submitted_at
    }

    /// True for a buy order that has been working for longer than `max_age`.
    pub fn is_stale_buy(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.side == OrderSide::Buy && self.age(now) > max_age
    }
}

/// Parameters for a new order submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    #[serde(with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    pub time_in_force: TimeInForce,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::str_option"
    )]
    pub limit_price: Option<Decimal>,
    pub client_order_id: String,
}

impl OrderRequest {
    /// Day limit buy at `price`.
    pub fn limit_buy(symbol: &str, qty: Decimal, price: Decimal) -> Self {
        Self::new(symbol, OrderSide::Buy, OrderKind::Limit, qty, Some(price))
    }

    /// Day limit sell at `price`.
    pub fn limit_sell(symbol: &str, qty: Decimal, price: Decimal) -> Self {
        Self::new(symbol, OrderSide::Sell, OrderKind::Limit, qty, Some(price))
    }

    /// Day market sell, used to bail out of a position.
    pub fn market_sell(symbol: &str, qty: Decimal) -> Self {
        Self::new(symbol, OrderSide::Sell, OrderKind::Market, qty, None)
    }

    fn new(
        symbol: &str,
        side: OrderSide,
        kind: OrderKind,
        qty: Decimal,
        limit_price: Option<Decimal>,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            kind,
            qty,
            time_in_force: TimeInForce::Day,
            limit_price,
            client_order_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}
