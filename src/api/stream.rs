//! Alpaca websocket streams: minute bars and trade updates.
//!
//! Each stream runs its own reconnect loop and forwards parsed events into
//! the shared inbound channel. The loops end once the receiving side of the
//! channel is dropped.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use crate::config::AlpacaConfig;
use crate::models::{Bar, StreamEvent};

use super::types::{
    DataAuthRequest, DataMessage, DataSubscribeRequest, ListenRequest, ListenStreams,
    TradingAuthData, TradingAuthRequest, TradingMessage,
};
use super::GatewayError;

/// Connection settings for both streams.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub key_id: String,
    pub secret_key: String,
    pub data_url: String,
    pub trading_url: String,
    /// Symbols to receive bars for
    pub symbols: Vec<String>,
    pub connect_timeout: Duration,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl StreamConfig {
    pub fn new(alpaca: &AlpacaConfig, symbols: Vec<String>) -> Self {
        Self {
            key_id: alpaca.key_id.clone(),
            secret_key: alpaca.secret_key.clone(),
            data_url: alpaca.data_feed_stream_url(),
            trading_url: alpaca.trading_stream_url(),
            symbols,
            connect_timeout: Duration::from_secs(10),
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
        }
    }
}

/// Which of the two streams a session serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feed {
    Bars,
    TradeUpdates,
}

impl Feed {
    fn name(&self) -> &'static str {
        match self {
            Feed::Bars => "market data",
            Feed::TradeUpdates => "trade updates",
        }
    }
}

/// Why a session ended.
enum SessionEnd {
    /// Nobody listens anymore; stop for good.
    ReceiverGone,
    /// Connection problem; reconnect.
    Failed(GatewayError),
}

impl From<GatewayError> for SessionEnd {
    fn from(e: GatewayError) -> Self {
        SessionEnd::Failed(e)
    }
}

/// Live event source backed by the two Alpaca websockets.
pub struct AlpacaStream {
    config: StreamConfig,
}

impl AlpacaStream {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    /// Run both streams until the channel closes.
    pub async fn run<T>(&self, tx: mpsc::Sender<T>)
    where
        T: From<StreamEvent> + Send + 'static,
    {
        tokio::join!(
            self.run_feed(Feed::Bars, tx.clone()),
            self.run_feed(Feed::TradeUpdates, tx),
        );
    }

    async fn run_feed<T>(&self, feed: Feed, tx: mpsc::Sender<T>)
    where
        T: From<StreamEvent> + Send + 'static,
    {
        let mut reconnect_delay = self.config.initial_reconnect_delay;

        loop {
            let started = tokio::time::Instant::now();
            match self.run_session(feed, &tx).await {
                SessionEnd::ReceiverGone => {
                    info!(feed = feed.name(), "Event channel closed, stopping stream");
                    return;
                }
                SessionEnd::Failed(e) => {
                    // A session that stayed up for a while resets the backoff.
                    if started.elapsed() > self.config.max_reconnect_delay {
                        reconnect_delay = self.config.initial_reconnect_delay;
                    }
                    warn!(
                        feed = feed.name(),
                        error = %e,
                        retry_in = ?reconnect_delay,
                        "Stream disconnected, reconnecting"
                    );
                    tokio::time::sleep(reconnect_delay).await;
                    reconnect_delay = (reconnect_delay * 2).min(self.config.max_reconnect_delay);
                }
            }
        }
    }

    async fn run_session<T>(&self, feed: Feed, tx: &mpsc::Sender<T>) -> SessionEnd
    where
        T: From<StreamEvent> + Send + 'static,
    {
        match self.session(feed, tx).await {
            Ok(()) => SessionEnd::Failed(GatewayError::Stream("stream ended".to_string())),
            Err(end) => end,
        }
    }

    async fn session<T>(&self, feed: Feed, tx: &mpsc::Sender<T>) -> Result<(), SessionEnd>
    where
        T: From<StreamEvent> + Send + 'static,
    {
        let url = match feed {
            Feed::Bars => &self.config.data_url,
            Feed::TradeUpdates => &self.config.trading_url,
        };
        info!(feed = feed.name(), url = %url, "Connecting stream");

        let (ws, _) = match timeout(self.config.connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(GatewayError::Stream(e.to_string()).into()),
            Err(_) => return Err(GatewayError::Stream("connect timeout".to_string()).into()),
        };
        let (mut write, mut read) = ws.split();

        for request in self.handshake(feed)? {
            write
                .send(Message::Text(request))
                .await
                .map_err(|e| GatewayError::Stream(e.to_string()))?;
        }

        while let Some(msg) = read.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(_) => {
                        debug!(feed = feed.name(), "Non-UTF8 binary frame ignored");
                        continue;
                    }
                },
                Ok(Message::Ping(data)) => {
                    write
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| GatewayError::Stream(e.to_string()))?;
                    continue;
                }
                Ok(Message::Close(frame)) => {
                    return Err(GatewayError::Stream(format!("closed by server: {:?}", frame)).into());
                }
                Ok(_) => continue,
                Err(e) => return Err(GatewayError::Stream(e.to_string()).into()),
            };

            let events = match feed {
                Feed::Bars => parse_data_frame(&text)?,
                Feed::TradeUpdates => parse_trading_frame(&text).into_iter().collect(),
            };

            for event in events {
                if tx.send(T::from(event)).await.is_err() {
                    return Err(SessionEnd::ReceiverGone);
                }
            }
        }

        Ok(())
    }

    /// Messages to send right after connecting.
    fn handshake(&self, feed: Feed) -> Result<Vec<String>, GatewayError> {
        let encode = |value: serde_json::Result<String>| {
            value.map_err(|e| GatewayError::Decode(e.to_string()))
        };

        match feed {
            Feed::Bars => Ok(vec![
                encode(serde_json::to_string(&DataAuthRequest {
                    action: "auth",
                    key: &self.config.key_id,
                    secret: &self.config.secret_key,
                }))?,
                encode(serde_json::to_string(&DataSubscribeRequest {
                    action: "subscribe",
                    bars: &self.config.symbols,
                }))?,
            ]),
            Feed::TradeUpdates => Ok(vec![
                encode(serde_json::to_string(&TradingAuthRequest {
                    action: "authenticate",
                    data: TradingAuthData {
                        key_id: &self.config.key_id,
                        secret_key: &self.config.secret_key,
                    },
                }))?,
                encode(serde_json::to_string(&ListenRequest {
                    action: "listen",
                    data: ListenStreams {
                        streams: vec!["trade_updates"],
                    },
                }))?,
            ]),
        }
    }
}

/// Parse one market data frame into bar events.
///
/// Server-side errors (bad auth, over the connection limit) end the session.
fn parse_data_frame(text: &str) -> Result<Vec<StreamEvent>, GatewayError> {
    let messages: Vec<DataMessage> = match serde_json::from_str(text) {
        Ok(messages) => messages,
        Err(e) => {
            warn!(error = %e, "Unparseable market data frame");
            return Ok(Vec::new());
        }
    };

    let mut events = Vec::new();
    for message in messages {
        match message {
            DataMessage::Bar(stream_bar) => events.push(StreamEvent::Bar {
                symbol: stream_bar.symbol,
                bar: Bar::from(stream_bar.bar),
            }),
            DataMessage::Success { msg } => info!(msg = %msg, "Market data stream"),
            DataMessage::Subscription { bars } => {
                info!(bars = ?bars, "Subscribed to bars");
            }
            DataMessage::Error { code, msg } => {
                error!(code, msg = %msg, "Market data stream error");
                return Err(GatewayError::Stream(format!("{} ({})", msg, code)));
            }
            DataMessage::Other => {}
        }
    }
    Ok(events)
}

/// Parse one trade updates frame.
fn parse_trading_frame(text: &str) -> Option<StreamEvent> {
    match serde_json::from_str::<TradingMessage>(text) {
        Ok(TradingMessage::TradeUpdate(update)) => Some(StreamEvent::TradeUpdate(update)),
        Ok(TradingMessage::Authorization { status, action }) => {
            if status == "authorized" {
                info!(action = %action, "Trade updates stream authorized");
            } else {
                error!(status = %status, "Trade updates stream not authorized");
            }
            None
        }
        Ok(TradingMessage::Listening { streams }) => {
            info!(streams = ?streams, "Listening for trade updates");
            None
        }
        Err(e) => {
            debug!(error = %e, "Ignoring trade stream frame");
            None
        }
    }
}
