//! Alpaca REST client for market data, account state and order entry.
//!
//! Read requests are retried with exponential backoff on transient failures.
//! Order submission is sent exactly once: a refusal comes back as
//! [`GatewayError::Rejected`] and the caller decides what to do next.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::AlpacaConfig;
use crate::models::{Bar, MarketClock, Order, OrderRequest, Position};

use super::types::{ApiErrorBody, BarsPage, LatestTradeResponse};
use super::{Gateway, GatewayError, TimeFrame};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(10);
const BARS_PAGE_LIMIT: u32 = 10_000;

/// Client for the Alpaca trading and market data APIs.
pub struct AlpacaClient {
    http: Client,
    trading_url: String,
    data_url: String,
    feed: String,
}

impl AlpacaClient {
    /// Create a new client authenticated with the configured key pair.
    pub fn new(config: &AlpacaConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("apca-api-key-id"),
            HeaderValue::from_str(&config.key_id).context("Invalid APCA_API_KEY_ID")?,
        );
        let mut secret =
            HeaderValue::from_str(&config.secret_key).context("Invalid APCA_API_SECRET_KEY")?;
        secret.set_sensitive(true);
        headers.insert(HeaderName::from_static("apca-api-secret-key"), secret);

        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            trading_url: config.trading_url.clone(),
            data_url: config.data_url.clone(),
            feed: config.feed.clone(),
        })
    }

    fn retry_policy() -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_elapsed_time(Some(MAX_RETRY_ELAPSED))
            .build()
    }

    /// Run `op` until it succeeds, fails permanently, or the retry budget runs out.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        backoff::future::retry_notify(
            Self::retry_policy(),
            || {
                let fut = op();
                async move {
                    fut.await.map_err(|e| {
                        if e.is_transient() {
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
                }
            },
            |e: GatewayError, delay: Duration| {
                warn!(request = %what, error = %e, retry_in = ?delay, "Retrying request");
            },
        )
        .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        debug!(url = %url, "GET");
        self.with_retry(url, || async move {
            let resp = self.http.get(url).query(query).send().await?;
            Self::decode(resp).await
        })
        .await
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, GatewayError> {
        let status = resp.status();
        if !status.is_success() {
            let message = Self::error_message(resp).await;
            if status == StatusCode::NOT_FOUND {
                return Err(GatewayError::NotFound(message));
            }
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        resp.json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn error_message(resp: Response) -> String {
        let text = resp.text().await.unwrap_or_default();
        serde_json::from_str::<ApiErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text)
    }

    fn rfc3339(ts: DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

#[async_trait]
impl Gateway for AlpacaClient {
    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, GatewayError> {
        let url = format!("{}/v2/stocks/{}/bars", self.data_url, symbol);
        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeframe", timeframe.as_str().to_string()),
                ("start", Self::rfc3339(start)),
                ("end", Self::rfc3339(end)),
                ("adjustment", "raw".to_string()),
                ("feed", self.feed.clone()),
                ("limit", BARS_PAGE_LIMIT.to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            let page: BarsPage = self.get_json(&url, &query).await?;
            bars.extend(page.bars.unwrap_or_default().into_iter().map(Bar::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(symbol = %symbol, count = bars.len(), "Loaded bars");
        Ok(bars)
    }

    async fn get_last_trade(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        let url = format!("{}/v2/stocks/{}/trades/latest", self.data_url, symbol);
        let query = [("feed", self.feed.clone())];
        let resp: LatestTradeResponse = self.get_json(&url, &query).await?;
        Ok(resp.trade.price)
    }

    async fn get_clock(&self) -> Result<MarketClock, GatewayError> {
        let url = format!("{}/v2/clock", self.trading_url);
        self.get_json(&url, &[]).await
    }

    async fn list_orders(&self) -> Result<Vec<Order>, GatewayError> {
        let url = format!("{}/v2/orders", self.trading_url);
        let query = [("status", "open".to_string()), ("limit", "500".to_string())];
        self.get_json(&url, &query).await
    }

    async fn list_positions(&self) -> Result<Vec<Position>, GatewayError> {
        let url = format!("{}/v2/positions", self.trading_url);
        self.get_json(&url, &[]).await
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<Order, GatewayError> {
        let url = format!("{}/v2/orders", self.trading_url);
        debug!(
            symbol = %request.symbol,
            side = request.side.as_str(),
            qty = %request.qty,
            "POST order"
        );

        let resp = self.http.post(&url).json(request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: Self::error_message(resp).await,
            });
        }

        resp.json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError> {
        let url = format!("{}/v2/orders/{}", self.trading_url, order_id);
        let url = url.as_str();
        self.with_retry(url, || async move {
            let resp = self.http.delete(url).send().await?;
            let status = resp.status();
            if status.is_success() {
                return Ok(());
            }
            let message = Self::error_message(resp).await;
            if status == StatusCode::NOT_FOUND {
                return Err(GatewayError::NotFound(message));
            }
            Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            })
        })
        .await
    }

    async fn get_order(&self, order_id: &str) -> Result<Order, GatewayError> {
        let url = format!("{}/v2/orders/{}", self.trading_url, order_id);
        self.get_json(&url, &[]).await
    }

    async fn get_order_by_client_id(&self, client_order_id: &str) -> Result<Option<Order>, GatewayError> {
        let url = format!("{}/v2/orders:by_client_order_id", self.trading_url);
        let query = [("client_order_id", client_order_id.to_string())];
        match self.get_json(&url, &query).await {
            Ok(order) => Ok(Some(order)),
            Err(GatewayError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, GatewayError> {
        let url = format!("{}/v2/positions/{}", self.trading_url, symbol);
        match self.get_json(&url, &[]).await {
            Ok(position) => Ok(Some(position)),
            Err(GatewayError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
