//! Brokerage gateway: the contract the trading core depends on, and its
//! Alpaca implementation (REST for queries and commands, websockets for the
//! live bar and order-update streams).

mod alpaca_client;
#[cfg(test)]
pub mod mock;
mod stream;
mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{Bar, MarketClock, Order, OrderRequest, Position};

pub use alpaca_client::AlpacaClient;
pub use stream::{AlpacaStream, StreamConfig};

/// Errors returned by gateway calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The brokerage refused an order submission.
    #[error("order rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request failed ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("stream error: {0}")]
    Stream(String),
}

impl GatewayError {
    /// Worth retrying: transport failures, throttling and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            GatewayError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Bar granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFrame {
    Minute,
}

impl TimeFrame {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::Minute => "1Min",
        }
    }
}

/// Market data and order entry capability.
///
/// One handle is shared by every symbol trader, so implementations must be
/// safe for interleaved calls.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Historical bars in `[start, end)`, oldest first.
    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, GatewayError>;

    /// Price of the most recent trade.
    async fn get_last_trade(&self, symbol: &str) -> Result<Decimal, GatewayError>;

    async fn get_clock(&self) -> Result<MarketClock, GatewayError>;

    /// Open orders across all symbols.
    async fn list_orders(&self) -> Result<Vec<Order>, GatewayError>;

    /// Open positions across all symbols.
    async fn list_positions(&self) -> Result<Vec<Position>, GatewayError>;

    /// Place an order. A refusal is reported as [`GatewayError::Rejected`].
    async fn submit_order(&self, request: &OrderRequest) -> Result<Order, GatewayError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError>;

    async fn get_order(&self, order_id: &str) -> Result<Order, GatewayError>;

    /// Look an order up by the client order id we sent; `None` if the
    /// brokerage never accepted it.
    async fn get_order_by_client_id(&self, client_order_id: &str) -> Result<Option<Order>, GatewayError>;

    /// Position in `symbol`, `None` when flat.
    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, GatewayError>;
}
