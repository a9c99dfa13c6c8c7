//! In-memory gateway for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::models::{Bar, MarketClock, Order, OrderRequest, Position};

use super::{Gateway, GatewayError, TimeFrame};

/// What the mock does with an order submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitOutcome {
    #[default]
    Accept,
    /// The brokerage refuses the order.
    Reject,
    /// The response never arrives; `placed` says whether the order went live anyway.
    LostResponse { placed: bool },
}

#[derive(Default)]
struct MockState {
    last_price: HashMap<String, Decimal>,
    bars: HashMap<String, Vec<Bar>>,
    positions: HashMap<String, Position>,
    open_orders: Vec<Order>,
    clock: Option<MarketClock>,
    submitted: Vec<OrderRequest>,
    accepted: Vec<Order>,
    canceled: Vec<String>,
    submit_outcome: SubmitOutcome,
    submission_time: Option<DateTime<Utc>>,
    fail_reads: bool,
    fail_lookups: bool,
    next_id: u64,
}

/// Scriptable stand-in for the brokerage.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_last_price(&self, symbol: &str, price: Decimal) {
        self.lock().last_price.insert(symbol.to_string(), price);
    }

    pub fn set_bars(&self, symbol: &str, bars: Vec<Bar>) {
        self.lock().bars.insert(symbol.to_string(), bars);
    }

    pub fn set_position(&self, position: Position) {
        self.lock().positions.insert(position.symbol.clone(), position);
    }

    pub fn remove_position(&self, symbol: &str) {
        self.lock().positions.remove(symbol);
    }

    pub fn add_open_order(&self, order: Order) {
        self.lock().open_orders.push(order);
    }

    pub fn set_clock(&self, clock: MarketClock) {
        self.lock().clock = Some(clock);
    }

    /// Make every submission fail with a rejection.
    pub fn reject_submissions(&self, reject: bool) {
        let outcome = if reject {
            SubmitOutcome::Reject
        } else {
            SubmitOutcome::Accept
        };
        self.set_submit_outcome(outcome);
    }

    pub fn set_submit_outcome(&self, outcome: SubmitOutcome) {
        self.lock().submit_outcome = outcome;
    }

    /// Stamp accepted orders with `at` instead of the wall clock.
    pub fn set_submission_time(&self, at: DateTime<Utc>) {
        self.lock().submission_time = Some(at);
    }

    /// Make client order id lookups fail with a server error.
    pub fn fail_lookups(&self, fail: bool) {
        self.lock().fail_lookups = fail;
    }

    /// Make every read fail with a server error.
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.lock().submitted.clone()
    }

    pub fn canceled(&self) -> Vec<String> {
        self.lock().canceled.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn check_reads(&self) -> Result<(), GatewayError> {
        if self.lock().fail_reads {
            return Err(GatewayError::Api {
                status: 500,
                message: "mock read failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Order as the brokerage would report it right after accepting `request`.
pub fn order_from_request(id: &str, request: &OrderRequest, submitted_at: DateTime<Utc>) -> Order {
    Order {
        id: id.to_string(),
        client_order_id: Some(request.client_order_id.clone()),
        symbol: request.symbol.clone(),
        side: request.side,
        kind: request.kind,
        qty: request.qty,
        filled_qty: Decimal::ZERO,
        filled_avg_price: None,
        limit_price: request.limit_price,
        submitted_at,
        status: "accepted".to_string(),
    }
}

/// Clock of an open session closing at `next_close`.
pub fn open_clock(now: DateTime<Utc>, next_close: DateTime<Utc>) -> MarketClock {
    MarketClock {
        timestamp: now,
        is_open: true,
        next_open: next_close + Duration::hours(17) + Duration::minutes(30),
        next_close,
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn get_bars(
        &self,
        symbol: &str,
        _timeframe: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, GatewayError> {
        self.check_reads()?;
        Ok(self
            .lock()
            .bars
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= start && b.timestamp < end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_last_trade(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        self.check_reads()?;
        self.lock()
            .last_price
            .get(symbol)
            .copied()
            .ok_or_else(|| GatewayError::NotFound(format!("no trades for {}", symbol)))
    }

    async fn get_clock(&self) -> Result<MarketClock, GatewayError> {
        self.check_reads()?;
        self.lock()
            .clock
            .clone()
            .ok_or_else(|| GatewayError::NotFound("clock".to_string()))
    }

    async fn list_orders(&self) -> Result<Vec<Order>, GatewayError> {
        self.check_reads()?;
        Ok(self.lock().open_orders.clone())
    }

    async fn list_positions(&self) -> Result<Vec<Position>, GatewayError> {
        self.check_reads()?;
        Ok(self.lock().positions.values().cloned().collect())
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<Order, GatewayError> {
        let mut state = self.lock();
        let outcome = state.submit_outcome;
        let placed = match outcome {
            SubmitOutcome::Reject => {
                return Err(GatewayError::Rejected {
                    status: 403,
                    message: "insufficient buying power".to_string(),
                });
            }
            SubmitOutcome::LostResponse { placed: false } => None,
            SubmitOutcome::Accept | SubmitOutcome::LostResponse { placed: true } => {
                state.next_id += 1;
                let id = format!("mock-{}", state.next_id);
                let submitted_at = state.submission_time.unwrap_or_else(Utc::now);
                let order = order_from_request(&id, request, submitted_at);
                state.submitted.push(request.clone());
                state.accepted.push(order.clone());
                Some(order)
            }
        };

        match (outcome, placed) {
            (SubmitOutcome::Accept, Some(order)) => Ok(order),
            _ => Err(GatewayError::Api {
                status: 504,
                message: "gateway timeout".to_string(),
            }),
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError> {
        self.lock().canceled.push(order_id.to_string());
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<Order, GatewayError> {
        self.check_reads()?;
        self.lock()
            .open_orders
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(order_id.to_string()))
    }

    async fn get_order_by_client_id(&self, client_order_id: &str) -> Result<Option<Order>, GatewayError> {
        self.check_reads()?;
        let state = self.lock();
        if state.fail_lookups {
            return Err(GatewayError::Api {
                status: 500,
                message: "mock lookup failure".to_string(),
            });
        }
        Ok(state
            .accepted
            .iter()
            .find(|o| o.client_order_id.as_deref() == Some(client_order_id))
            .cloned())
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, GatewayError> {
        self.check_reads()?;
        Ok(self.lock().positions.get(symbol).cloned())
    }
}
