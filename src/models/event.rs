//! Inbound events pushed by the brokerage streams.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Bar, Order};

/// Order lifecycle notification kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeEvent {
    Fill,
    PartialFill,
    Canceled,
    Rejected,
    Expired,
    /// new, accepted, pending_cancel, replaced, ... (informational only)
    #[serde(other)]
    Other,
}

impl fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeEvent::Fill => "fill",
            TradeEvent::PartialFill => "partial_fill",
            TradeEvent::Canceled => "canceled",
            TradeEvent::Rejected => "rejected",
            TradeEvent::Expired => "expired",
            TradeEvent::Other => "other",
        };
        f.write_str(s)
    }
}

/// An order update for one of our orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeUpdate {
    pub event: TradeEvent,
    pub order: Order,
}

/// Anything the gateway stream delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A new minute bar closed for `symbol`.
    Bar { symbol: String, bar: Bar },

    /// One of our orders changed.
    TradeUpdate(TradeUpdate),
}
