//! Wire types for the Alpaca REST and streaming APIs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Bar, TradeUpdate};

/// Bar as returned by the market data API.
#[derive(Debug, Clone, Deserialize)]
pub struct BarResponse {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: f64,
}

impl From<BarResponse> for Bar {
    fn from(b: BarResponse) -> Self {
        Bar {
            timestamp: b.timestamp,
            open: b.open,
            high: b.high,
            low: b.low,
            close: b.close,
            volume: b.volume,
        }
    }
}

/// Page of bars from /v2/stocks/{symbol}/bars.
#[derive(Debug, Clone, Deserialize)]
pub struct BarsPage {
    #[serde(default)]
    pub bars: Option<Vec<BarResponse>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Response from /v2/stocks/{symbol}/trades/latest.
#[derive(Debug, Clone, Deserialize)]
pub struct LatestTradeResponse {
    pub trade: TradeResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeResponse {
    #[serde(rename = "p")]
    pub price: Decimal,
}

/// Error body returned by the trading API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}

/// Bar pushed on the market data stream.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamBar {
    #[serde(rename = "S")]
    pub symbol: String,
    #[serde(flatten)]
    pub bar: BarResponse,
}

/// One element of a market data stream frame (frames are JSON arrays).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "T")]
pub enum DataMessage {
    #[serde(rename = "success")]
    Success { msg: String },
    #[serde(rename = "error")]
    Error { code: i64, msg: String },
    #[serde(rename = "subscription")]
    Subscription {
        #[serde(default)]
        bars: Vec<String>,
    },
    #[serde(rename = "b")]
    Bar(StreamBar),
    #[serde(other)]
    Other,
}

/// Frame on the trade updates stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "stream", content = "data")]
pub enum TradingMessage {
    #[serde(rename = "authorization")]
    Authorization {
        status: String,
        #[serde(default)]
        action: String,
    },
    #[serde(rename = "listening")]
    Listening {
        #[serde(default)]
        streams: Vec<String>,
    },
    #[serde(rename = "trade_updates")]
    TradeUpdate(TradeUpdate),
}

/// Authentication for the market data stream.
#[derive(Debug, Serialize)]
pub struct DataAuthRequest<'a> {
    pub action: &'static str,
    pub key: &'a str,
    pub secret: &'a str,
}

/// Bar subscription for the market data stream.
#[derive(Debug, Serialize)]
pub struct DataSubscribeRequest<'a> {
    pub action: &'static str,
    pub bars: &'a [String],
}

/// Authentication for the trade updates stream.
#[derive(Debug, Serialize)]
pub struct TradingAuthRequest<'a> {
    pub action: &'static str,
    pub data: TradingAuthData<'a>,
}

#[derive(Debug, Serialize)]
pub struct TradingAuthData<'a> {
    pub key_id: &'a str,
    pub secret_key: &'a str,
}

/// Stream selection for the trade updates stream.
#[derive(Debug, Serialize)]
pub struct ListenRequest {
    pub action: &'static str,
    pub data: ListenStreams,
}

#[derive(Debug, Serialize)]
pub struct ListenStreams {
    pub streams: Vec<&'static str>,
}
