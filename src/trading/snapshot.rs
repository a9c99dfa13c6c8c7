//! Last-known order and position for one symbol.

use chrono::{DateTime, Duration, Utc};

use crate::models::{Order, OrderKind, OrderSide, Position};

/// Holds at most one working order and at most one position.
#[derive(Debug, Clone, Default)]
pub struct OrderSnapshot {
    order: Option<Order>,
    position: Option<Position>,
}

impl OrderSnapshot {
    /// Snapshot from the brokerage's view at startup.
    pub fn reconcile(order: Option<Order>, position: Option<Position>) -> Self {
        Self { order, position }
    }

    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    /// Replace the working order. Any previous order must already be dead.
    pub fn set_order(&mut self, order: Order) {
        self.order = Some(order);
    }

    pub fn clear_order(&mut self) -> Option<Order> {
        self.order.take()
    }

    pub fn set_position(&mut self, position: Option<Position>) {
        self.position = position;
    }

    pub fn clear_position(&mut self) -> Option<Position> {
        self.position.take()
    }

    /// The working order, if it is a buy older than `max_age`.
    pub fn stale_buy(&self, now: DateTime<Utc>, max_age: Duration) -> Option<&Order> {
        self.order
            .as_ref()
            .filter(|order| order.is_stale_buy(now, max_age))
    }

    /// True when the working order is already a market sell.
    pub fn bailout_working(&self) -> bool {
        self.order
            .as_ref()
            .is_some_and(|o| o.side == OrderSide::Sell && o.kind == OrderKind::Market)
    }
}
