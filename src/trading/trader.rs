//! Symbol trader: the per-symbol state machine.
//!
//! A trader owns its bar history, its last-known order and position, and its
//! [`TradingState`]. Bars, order updates and periodic checkups are turned into
//! [`TraderEvent`]s and run through the transition table; the resulting action
//! is executed here against the gateway. Handlers never fail: every gateway
//! error is logged and the next bar or checkup drives recovery.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::api::{Gateway, GatewayError, TimeFrame};
use crate::config::SymbolSelection;
use crate::models::{Bar, Order, OrderRequest, Position, TradeEvent, TradeUpdate};

use super::sizing::{entry_limit_price, exit_limit_price, lot_quantity};
use super::state::{transition, Action, Guards, TraderEvent, TradingState};
use super::{BarSeries, OrderSnapshot, SessionClock, SignalEvaluator, StrategyConfig};

/// Trading state machine for one symbol.
pub struct SymbolTrader {
    symbol: String,
    lot: Decimal,
    config: StrategyConfig,
    gateway: Arc<dyn Gateway>,

    bars: BarSeries,
    evaluator: SignalEvaluator,
    snapshot: OrderSnapshot,
    session: SessionClock,
    state: TradingState,

    /// Submission whose outcome is unknown after a transport failure. No new
    /// order is placed until it is found at the brokerage or ruled out.
    unconfirmed: Option<OrderRequest>,
}

impl SymbolTrader {
    /// Build a trader from already loaded history and the brokerage's current
    /// order and position for the symbol.
    pub fn new(
        selection: &SymbolSelection,
        config: &StrategyConfig,
        gateway: Arc<dyn Gateway>,
        bars: BarSeries,
        snapshot: OrderSnapshot,
        next_close: DateTime<Utc>,
    ) -> Self {
        let (state, mismatch) = TradingState::recover(snapshot.order(), snapshot.position());
        if let (Some(expected), Some(order)) = (mismatch, snapshot.order()) {
            warn!(
                symbol = %selection.symbol,
                order_id = %order.id,
                side = order.side.as_str(),
                expected = expected.as_str(),
                state = %state,
                "Working order side does not match recovered state"
            );
        }

        info!(
            symbol = %selection.symbol,
            lot = %selection.lot,
            state = %state,
            bars = bars.len(),
            "Trader ready"
        );

        Self {
            symbol: selection.symbol.clone(),
            lot: selection.lot,
            config: config.clone(),
            gateway,
            bars,
            evaluator: SignalEvaluator::new(config.ma_window),
            snapshot,
            session: SessionClock::new(next_close, config),
            state,
            unconfirmed: None,
        }
    }

    /// Seed today's history from the session open and recover the state.
    ///
    /// A history that cannot be loaded is not fatal; the trader starts with
    /// an empty series and fills it from the live stream.
    pub async fn start(
        selection: &SymbolSelection,
        config: &StrategyConfig,
        gateway: Arc<dyn Gateway>,
        next_close: DateTime<Utc>,
        order: Option<Order>,
        position: Option<Position>,
        now: DateTime<Utc>,
    ) -> Self {
        let from = session_open(config, now);
        let history = if from < now {
            match gateway
                .get_bars(&selection.symbol, TimeFrame::Minute, from, now)
                .await
            {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(symbol = %selection.symbol, error = %e, "Failed to load bar history");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let bars = BarSeries::from_history(&selection.symbol, config.history_capacity, history);
        if bars.is_empty() {
            info!(symbol = %selection.symbol, "No history yet, waiting for live bars");
        }
        let snapshot = OrderSnapshot::reconcile(order, position);
        Self::new(selection, config, gateway, bars, snapshot, next_close)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn state(&self) -> TradingState {
        self.state
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> &OrderSnapshot {
        &self.snapshot
    }

    #[cfg(test)]
    pub fn bars(&self) -> &BarSeries {
        &self.bars
    }

    #[cfg(test)]
    pub fn session(&self) -> &SessionClock {
        &self.session
    }

    pub fn update_next_close(&mut self, next_close: DateTime<Utc>) {
        if self.session.next_close() != next_close {
            debug!(
                symbol = %self.symbol,
                from = %self.session.next_close(),
                to = %next_close,
                "Next close moved"
            );
        }
        self.session.update_next_close(next_close);
    }

    /// A minute bar closed.
    pub async fn on_bar(&mut self, bar: Bar, now: DateTime<Utc>) {
        if !self.bars.append(bar) {
            return;
        }
        if self.state != TradingState::ToBuy || !self.session.entry_allowed(now) {
            return;
        }

        let Some(sample) = self.evaluator.sample(&self.bars) else {
            return;
        };
        debug!(
            symbol = %self.symbol,
            closes = ?sample.closes,
            means = ?sample.means,
            "Crossover sample"
        );

        if sample.fires() {
            info!(symbol = %self.symbol, close = sample.closes[1], "Buy signal");
            self.handle(TraderEvent::BuySignal, None, now).await;
        }
    }

    /// An order update arrived on the trade stream.
    pub async fn on_order_update(&mut self, update: &TradeUpdate, now: DateTime<Utc>) {
        let adopted = self.unconfirmed.as_ref().is_some_and(|pending| {
            update.order.client_order_id.as_deref() == Some(pending.client_order_id.as_str())
        });
        if adopted {
            if let Some(request) = self.unconfirmed.take() {
                self.track(update.order.clone(), &request);
            }
        }

        let event = match update.event {
            TradeEvent::Fill => TraderEvent::Fill,
            TradeEvent::PartialFill => TraderEvent::PartialFill,
            TradeEvent::Canceled | TradeEvent::Expired => TraderEvent::Canceled,
            TradeEvent::Rejected => {
                warn!(
                    symbol = %self.symbol,
                    order_id = %update.order.id,
                    side = update.order.side.as_str(),
                    "Order rejected"
                );
                TraderEvent::Rejected
            }
            TradeEvent::Other => {
                debug!(
                    symbol = %self.symbol,
                    order_id = %update.order.id,
                    status = %update.order.status,
                    "Order update"
                );
                return;
            }
        };

        if let Some(current) = self.snapshot.order() {
            if current.id != update.order.id {
                warn!(
                    symbol = %self.symbol,
                    order_id = %update.order.id,
                    working = %current.id,
                    event = %update.event,
                    "Update for an order other than the working one"
                );
                return;
            }
        }

        info!(
            symbol = %self.symbol,
            order_id = %update.order.id,
            event = %update.event,
            filled_qty = %update.order.filled_qty,
            state = %self.state,
            "Order update"
        );
        self.handle(event, Some(&update.order), now).await;
    }

    /// Periodic safety checks with the position just fetched from the brokerage.
    pub async fn checkup(&mut self, position: Option<Position>, now: DateTime<Utc>) {
        if let Some(request) = self.unconfirmed.take() {
            self.confirm(request).await;
        }

        let had_position = self.snapshot.has_position();
        self.snapshot.set_position(position);
        if had_position && !self.snapshot.has_position() {
            self.handle(TraderEvent::PositionLost, None, now).await;
        }

        if let Some(order) = self.snapshot.stale_buy(now, self.config.stale_order_age()) {
            info!(
                symbol = %self.symbol,
                order_id = %order.id,
                age_secs = order.age(now).num_seconds(),
                "Buy order is stale"
            );
            self.handle(TraderEvent::StaleBuyOrder, None, now).await;
        } else if self.session.closing_soon(now)
            && (self.snapshot.has_position() || self.snapshot.order().is_some())
        {
            self.handle(TraderEvent::ClosingSoon, None, now).await;
        }
    }

    fn guards(&self, now: DateTime<Utc>) -> Guards {
        Guards {
            position_held: self.snapshot.has_position(),
            closing_soon: self.session.closing_soon(now),
            bailout_working: self.snapshot.bailout_working(),
        }
    }

    /// Look up the transition for `event` and carry it out.
    ///
    /// `update` is the order carried by a stream notification, if any.
    async fn handle(&mut self, event: TraderEvent, update: Option<&Order>, now: DateTime<Utc>) {
        let guards = self.guards(now);
        let t = transition(self.state, event, guards);

        if t.action == Action::Unexpected {
            warn!(
                symbol = %self.symbol,
                state = %self.state,
                event = ?event,
                "Unexpected event for state"
            );
            return;
        }

        self.transition_to(t.next);

        match t.action {
            Action::Ignore | Action::Unexpected => {}
            Action::SubmitBuy => self.submit_buy().await,
            Action::SubmitSell { bailout } => {
                self.snapshot.clear_order();
                self.submit_sell(bailout).await;
            }
            Action::OpenPosition => {
                let working = self.snapshot.clear_order();
                let filled = update.cloned().or(working);
                self.load_position(filled.as_ref()).await;
                self.submit_sell(guards.closing_soon).await;
            }
            Action::ClosePosition => {
                let working = self.snapshot.clear_order();
                let filled = update.cloned().or(working);
                let position = self.snapshot.clear_position();
                info!(
                    symbol = %self.symbol,
                    qty = ?filled.as_ref().map(|o| o.filled_qty),
                    price = ?filled.as_ref().and_then(|o| o.filled_avg_price),
                    cost = ?position.as_ref().map(|p| p.avg_entry_price),
                    "Position closed"
                );
            }
            Action::ForgetOrder => {
                self.snapshot.clear_order();
            }
            Action::ForgetPosition => {
                warn!(symbol = %self.symbol, "Position gone without a sell fill");
                self.snapshot.clear_position();
            }
            Action::Refresh => self.refresh(update).await,
            Action::CancelOrder => self.cancel_working_order().await,
        }
    }

    fn transition_to(&mut self, next: TradingState) {
        if next != self.state {
            info!(symbol = %self.symbol, from = %self.state, to = %next, "State transition");
            self.state = next;
        }
    }

    /// True when an order is working or a submission is still unconfirmed.
    fn order_outstanding(&self) -> bool {
        if let Some(order) = self.snapshot.order() {
            warn!(symbol = %self.symbol, order_id = %order.id, "Order already working");
            return true;
        }
        if let Some(pending) = &self.unconfirmed {
            warn!(
                symbol = %self.symbol,
                client_order_id = %pending.client_order_id,
                "Previous submission unconfirmed"
            );
            return true;
        }
        false
    }

    /// Place a limit buy at the last trade price, sized from the lot.
    async fn submit_buy(&mut self) {
        if self.order_outstanding() {
            return;
        }

        let last = match self.gateway.get_last_trade(&self.symbol).await {
            Ok(price) => price,
            Err(e) => {
                error!(symbol = %self.symbol, error = %e, "Failed to get last trade, not buying");
                return;
            }
        };
        let price = entry_limit_price(last);

        let qty = lot_quantity(self.lot, price);
        if qty.is_zero() {
            warn!(symbol = %self.symbol, lot = %self.lot, price = %price, "Lot buys no whole share");
            return;
        }

        let request = OrderRequest::limit_buy(&self.symbol, qty, price);
        self.place(request).await;
    }

    /// Place a sell for the whole position: market when bailing out, otherwise
    /// a limit no lower than cost plus the markup.
    async fn submit_sell(&mut self, bailout: bool) {
        if self.order_outstanding() {
            return;
        }
        let Some(position) = self.snapshot.position().cloned() else {
            warn!(symbol = %self.symbol, "No position to sell");
            return;
        };
        if position.qty <= Decimal::ZERO {
            warn!(symbol = %self.symbol, qty = %position.qty, "Position has nothing to sell");
            return;
        }

        let request = if bailout {
            OrderRequest::market_sell(&self.symbol, position.qty)
        } else {
            let markup = self.config.min_sell_markup;
            let last = match self.gateway.get_last_trade(&self.symbol).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, "No last trade, pricing exit at cost");
                    Decimal::ZERO
                }
            };
            OrderRequest::limit_sell(
                &self.symbol,
                position.qty,
                exit_limit_price(&position, last, markup),
            )
        };

        self.place(request).await;
    }

    /// Submit `request`; on acceptance track the order and move on to the
    /// matching submitted state, otherwise stay where we are.
    ///
    /// A refusal is final. Any other failure may have reached the brokerage,
    /// so the order is looked up by its client order id before moving on.
    async fn place(&mut self, request: OrderRequest) {
        match self.gateway.submit_order(&request).await {
            Ok(order) => self.track(order, &request),
            Err(GatewayError::Rejected { status, message }) => {
                error!(
                    symbol = %self.symbol,
                    side = request.side.as_str(),
                    qty = %request.qty,
                    status,
                    reason = %message,
                    "Order rejected"
                );
            }
            Err(e) => {
                warn!(
                    symbol = %self.symbol,
                    side = request.side.as_str(),
                    qty = %request.qty,
                    client_order_id = %request.client_order_id,
                    error = %e,
                    "Order submission outcome unknown"
                );
                self.confirm(request).await;
            }
        }
    }

    /// Resolve a submission whose response was lost.
    async fn confirm(&mut self, request: OrderRequest) {
        match self.gateway.get_order_by_client_id(&request.client_order_id).await {
            Ok(Some(order)) => {
                info!(
                    symbol = %self.symbol,
                    order_id = %order.id,
                    client_order_id = %request.client_order_id,
                    "Unconfirmed order found at brokerage"
                );
                self.track(order, &request);
            }
            Ok(None) => {
                error!(
                    symbol = %self.symbol,
                    side = request.side.as_str(),
                    client_order_id = %request.client_order_id,
                    "Order submission failed"
                );
            }
            Err(e) => {
                warn!(
                    symbol = %self.symbol,
                    client_order_id = %request.client_order_id,
                    error = %e,
                    "Cannot confirm submission, holding new orders"
                );
                self.unconfirmed = Some(request);
            }
        }
    }

    fn track(&mut self, order: Order, request: &OrderRequest) {
        info!(
            symbol = %self.symbol,
            order_id = %order.id,
            side = request.side.as_str(),
            kind = ?request.kind,
            qty = %request.qty,
            limit_price = ?request.limit_price,
            "Order submitted"
        );
        self.snapshot.set_order(order);
        self.transition_to(self.state.after_submit());
    }

    /// After a buy fill: fetch the position, or derive it from the fill.
    async fn load_position(&mut self, filled: Option<&Order>) {
        match self.gateway.get_position(&self.symbol).await {
            Ok(Some(position)) => {
                self.snapshot.set_position(Some(position));
                return;
            }
            Ok(None) => warn!(symbol = %self.symbol, "Buy filled but no position reported yet"),
            Err(e) => warn!(symbol = %self.symbol, error = %e, "Failed to fetch position after fill"),
        }

        let derived = filled.and_then(|order| {
            let price = order.filled_avg_price.or(order.limit_price)?;
            Some(Position::new(&self.symbol, order.filled_qty, price))
        });
        if derived.is_none() {
            warn!(symbol = %self.symbol, "Cannot derive position from fill");
        }
        self.snapshot.set_position(derived);
    }

    /// Reload order and position after a partial fill.
    async fn refresh(&mut self, update: Option<&Order>) {
        if let Some(order) = update {
            self.snapshot.set_order(order.clone());
        }
        if let Some(id) = self.snapshot.order().map(|o| o.id.clone()) {
            match self.gateway.get_order(&id).await {
                Ok(order) => self.snapshot.set_order(order),
                Err(e) => debug!(symbol = %self.symbol, error = %e, "Order refresh failed"),
            }
        }
        match self.gateway.get_position(&self.symbol).await {
            Ok(position) => self.snapshot.set_position(position),
            Err(e) => warn!(symbol = %self.symbol, error = %e, "Position refresh failed"),
        }
    }

    async fn cancel_working_order(&mut self) {
        let Some(order_id) = self.snapshot.order().map(|o| o.id.clone()) else {
            return;
        };
        match self.gateway.cancel_order(&order_id).await {
            Ok(()) => info!(symbol = %self.symbol, order_id = %order_id, "Cancel requested"),
            Err(e) => warn!(symbol = %self.symbol, order_id = %order_id, error = %e, "Cancel failed"),
        }
    }
}

/// Today's session open in UTC.
fn session_open(config: &StrategyConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    let tz = config.market_timezone;
    let local_open = now
        .with_timezone(&tz)
        .date_naive()
        .and_time(config.session_open);
    tz.from_local_datetime(&local_open)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now)
}
