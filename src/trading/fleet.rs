//! Fleet dispatcher: routes inbound events to the symbol traders and drives
//! the periodic checkup sweep.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::Gateway;
use crate::config::SymbolSelection;
use crate::models::{Order, Position, StreamEvent};

use super::{StrategyConfig, SymbolTrader};

/// Everything the dispatcher loop consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum FleetEvent {
    /// A bar or order update from the gateway stream.
    Stream(StreamEvent),
    /// Sweep timer tick.
    Sweep,
}

impl From<StreamEvent> for FleetEvent {
    fn from(event: StreamEvent) -> Self {
        FleetEvent::Stream(event)
    }
}

/// Owns one trader per configured symbol.
pub struct FleetDispatcher {
    traders: HashMap<String, SymbolTrader>,
    gateway: Arc<dyn Gateway>,
}

impl FleetDispatcher {
    /// Build the fleet from the brokerage's current clock, orders and positions.
    pub async fn start(
        selections: &[SymbolSelection],
        config: &StrategyConfig,
        gateway: Arc<dyn Gateway>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let clock = gateway.get_clock().await.context("Failed to get market clock")?;
        let mut orders = gateway.list_orders().await.context("Failed to list orders")?;
        let mut positions = gateway
            .list_positions()
            .await
            .context("Failed to list positions")?;

        info!(
            is_open = clock.is_open,
            next_close = %clock.next_close,
            orders = orders.len(),
            positions = positions.len(),
            "Reconciling with brokerage"
        );

        let mut traders = HashMap::with_capacity(selections.len());
        for selection in selections {
            let order = take_working_order(&mut orders, &selection.symbol);
            let position = take_position(&mut positions, &selection.symbol);
            let trader = SymbolTrader::start(
                selection,
                config,
                gateway.clone(),
                clock.next_close,
                order,
                position,
                now,
            )
            .await;
            traders.insert(selection.symbol.clone(), trader);
        }

        Ok(Self::from_traders(traders.into_values(), gateway))
    }

    pub fn from_traders(
        traders: impl IntoIterator<Item = SymbolTrader>,
        gateway: Arc<dyn Gateway>,
    ) -> Self {
        let traders = traders
            .into_iter()
            .map(|t| (t.symbol().to_string(), t))
            .collect();
        Self { traders, gateway }
    }

    #[cfg(test)]
    pub fn trader(&self, symbol: &str) -> Option<&SymbolTrader> {
        self.traders.get(symbol)
    }

    /// Configured symbols, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.traders.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Route one event. Events for unknown symbols are dropped.
    pub async fn dispatch(&mut self, event: FleetEvent, now: DateTime<Utc>) {
        match event {
            FleetEvent::Stream(StreamEvent::Bar { symbol, bar }) => {
                if let Some(trader) = self.traders.get_mut(&symbol) {
                    trader.on_bar(bar, now).await;
                }
            }
            FleetEvent::Stream(StreamEvent::TradeUpdate(update)) => {
                if let Some(trader) = self.traders.get_mut(&update.order.symbol) {
                    trader.on_order_update(&update, now).await;
                }
            }
            FleetEvent::Sweep => self.sweep(now).await,
        }
    }

    /// Refresh every trader's session clock and run its checkup with the
    /// position just fetched from the brokerage. Does nothing while the
    /// market is closed.
    pub async fn sweep(&mut self, now: DateTime<Utc>) {
        let clock = match self.gateway.get_clock().await {
            Ok(clock) => clock,
            Err(e) => {
                warn!(error = %e, "Sweep skipped: clock unavailable");
                return;
            }
        };
        if !clock.is_open {
            debug!(next_open = %clock.next_open, "Market closed, sweep skipped");
            return;
        }

        let positions = match self.gateway.list_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(error = %e, "Sweep skipped: positions unavailable");
                return;
            }
        };
        let mut positions: HashMap<String, Position> = positions
            .into_iter()
            .map(|p| (p.symbol.clone(), p))
            .collect();

        for (symbol, trader) in self.traders.iter_mut() {
            trader.update_next_close(clock.next_close);
            trader.checkup(positions.remove(symbol), now).await;
        }
    }

    /// Log where every trader stands; working orders stay at the brokerage.
    pub fn log_states(&self) {
        for symbol in self.symbols() {
            if let Some(trader) = self.traders.get(&symbol) {
                info!(symbol = %symbol, state = %trader.state(), "Trader stopped");
            }
        }
    }

    /// Consume events until every producer has gone away.
    pub async fn run(&mut self, mut rx: mpsc::Receiver<FleetEvent>) {
        info!(symbols = ?self.symbols(), "Dispatcher running");
        while let Some(event) = rx.recv().await {
            self.dispatch(event, Utc::now()).await;
        }
        info!("Event channel closed, dispatcher stopped");
    }
}

/// Remove and return the most recent open order for `symbol`.
pub fn take_working_order(orders: &mut Vec<Order>, symbol: &str) -> Option<Order> {
    let mut mine: Vec<Order> = Vec::new();
    orders.retain(|o| {
        if o.symbol == symbol {
            mine.push(o.clone());
            false
        } else {
            true
        }
    });

    if mine.len() > 1 {
        warn!(
            symbol = %symbol,
            count = mine.len(),
            "Several open orders, tracking the most recent"
        );
    }
    mine.into_iter().max_by_key(|o| o.submitted_at)
}

/// Remove and return the position in `symbol`.
pub fn take_position(positions: &mut Vec<Position>, symbol: &str) -> Option<Position> {
    let index = positions.iter().position(|p| p.symbol == symbol)?;
    Some(positions.swap_remove(index))
}
