//! Bot runner: wires the gateway, the fleet and the two event producers.
//!
//! Handles:
//! - Reconciling every configured symbol with the brokerage at startup
//! - Streaming bars and order updates into the dispatcher
//! - Ticking the periodic checkup sweep
//! - Stopping on Ctrl+C (working orders are left to the next startup)

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::api::{AlpacaClient, AlpacaStream, Gateway, StreamConfig};
use crate::config::{AlpacaConfig, SymbolSelection};
use crate::models::{MarketClock, Order, Position};
use crate::trading::{
    take_position, take_working_order, FleetDispatcher, FleetEvent, StrategyConfig, TradingState,
};

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Symbols to trade and the cash per entry
    pub selections: Vec<SymbolSelection>,

    /// Strategy constants
    pub strategy: StrategyConfig,

    /// Capacity of the inbound event channel
    pub channel_capacity: usize,
}

impl BotConfig {
    pub fn new(selections: Vec<SymbolSelection>) -> Self {
        Self {
            selections,
            strategy: StrategyConfig::default(),
            channel_capacity: 1024,
        }
    }
}

/// Main bot runner.
pub struct Bot {
    config: BotConfig,
    alpaca: AlpacaConfig,
    gateway: Arc<dyn Gateway>,
}

impl Bot {
    pub fn new(config: BotConfig, alpaca: AlpacaConfig) -> Result<Self> {
        config.strategy.validate()?;
        let gateway: Arc<dyn Gateway> = Arc::new(AlpacaClient::new(&alpaca)?);
        Ok(Self {
            config,
            alpaca,
            gateway,
        })
    }

    /// Run until Ctrl+C or until every producer has stopped.
    pub async fn run(&self) -> Result<()> {
        let mut fleet = FleetDispatcher::start(
            &self.config.selections,
            &self.config.strategy,
            self.gateway.clone(),
            Utc::now(),
        )
        .await
        .context("Failed to start fleet")?;

        let (tx, rx) = mpsc::channel::<FleetEvent>(self.config.channel_capacity);

        let stream = AlpacaStream::new(StreamConfig::new(&self.alpaca, fleet.symbols()));
        let stream_tx = tx.clone();
        let stream_task = tokio::spawn(async move { stream.run(stream_tx).await });

        let period = Duration::from_secs(self.config.strategy.sweep_interval_secs);
        let sweep_task = tokio::spawn(run_sweep_timer(period, tx));

        info!(
            symbols = ?fleet.symbols(),
            sweep_secs = period.as_secs(),
            "Bot running"
        );

        tokio::select! {
            _ = fleet.run(rx) => {
                warn!("All event producers stopped");
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                }
                info!("Shutdown signal received");
            }
        }

        stream_task.abort();
        sweep_task.abort();
        fleet.log_states();
        info!("Bot stopped");
        Ok(())
    }

    /// What each trader would recover from right now.
    pub async fn status(&self) -> Result<BotStatus> {
        collect_status(self.gateway.as_ref(), &self.config.selections, Utc::now()).await
    }
}

/// Push a sweep event every `period` until the channel closes.
pub async fn run_sweep_timer(period: Duration, tx: mpsc::Sender<FleetEvent>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; startup already reconciled.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if tx.send(FleetEvent::Sweep).await.is_err() {
            return;
        }
    }
}

/// Recovered view of one symbol.
#[derive(Debug, Clone)]
pub struct SymbolStatus {
    pub symbol: String,
    pub lot: Decimal,
    pub state: TradingState,
    pub order: Option<Order>,
    pub position: Option<Position>,
}

/// Market clock plus the recovered view of every configured symbol.
#[derive(Debug, Clone)]
pub struct BotStatus {
    pub clock: MarketClock,
    pub as_of: DateTime<Utc>,
    pub symbols: Vec<SymbolStatus>,
}

/// Query the brokerage and infer each symbol's state the way startup does.
pub async fn collect_status(
    gateway: &dyn Gateway,
    selections: &[SymbolSelection],
    now: DateTime<Utc>,
) -> Result<BotStatus> {
    let clock = gateway.get_clock().await.context("Failed to get market clock")?;
    let mut orders = gateway.list_orders().await.context("Failed to list orders")?;
    let mut positions = gateway
        .list_positions()
        .await
        .context("Failed to list positions")?;

    let symbols = selections
        .iter()
        .map(|selection| {
            let order = take_working_order(&mut orders, &selection.symbol);
            let position = take_position(&mut positions, &selection.symbol);
            let (state, _) = TradingState::recover(order.as_ref(), position.as_ref());
            SymbolStatus {
                symbol: selection.symbol.clone(),
                lot: selection.lot,
                state,
                order,
                position,
            }
        })
        .collect();

    Ok(BotStatus {
        clock,
        as_of: now,
        symbols,
    })
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Market ===")?;
        writeln!(f, "As of:       {}", self.as_of.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "Open:        {}", if self.clock.is_open { "Yes" } else { "No" })?;
        writeln!(f, "Next open:   {}", self.clock.next_open)?;
        writeln!(f, "Next close:  {}", self.clock.next_close)?;

        writeln!(f, "\n=== Symbols ===")?;
        writeln!(
            f,
            "{:<8} {:>10} {:<15} {:<28} {:<20}",
            "SYMBOL", "LOT", "STATE", "ORDER", "POSITION"
        )?;
        writeln!(f, "{}", "-".repeat(85))?;

        for s in &self.symbols {
            let order = s
                .order
                .as_ref()
                .map(|o| {
                    format!(
                        "{} {} {:?} @ {}",
                        o.side.as_str(),
                        o.qty,
                        o.kind,
                        o.limit_price
                            .map(|p| p.to_string())
                            .unwrap_or_else(|| "mkt".to_string())
                    )
                })
                .unwrap_or_else(|| "-".to_string());
            let position = s
                .position
                .as_ref()
                .map(|p| format!("{} @ {}", p.qty, p.avg_entry_price))
                .unwrap_or_else(|| "-".to_string());

            writeln!(
                f,
                "{:<8} {:>10} {:<15} {:<28} {:<20}",
                s.symbol,
                s.lot,
                s.state.to_string(),
                order,
                position
            )?;
        }
        Ok(())
    }
}
