//! Position model representing shares currently held in one symbol.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Open position reported by the brokerage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,

    /// Number of shares held
    pub qty: Decimal,

    /// Average entry price per share (cost basis)
    pub avg_entry_price: Decimal,

    /// Latest price known to the brokerage
    #[serde(default)]
    pub current_price: Option<Decimal>,

    /// Unrealized P&L in account currency
    #[serde(default, rename = "unrealized_pl")]
    pub unrealized_pnl: Option<Decimal>,
}

impl Position {
    /// Create a position from a fill, without market data.
    pub fn new(symbol: &str, qty: Decimal, avg_entry_price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            qty,
            avg_entry_price,
            current_price: None,
            unrealized_pnl: None,
        }
    }

    /// Lowest price we are willing to exit at: cost basis plus `markup`.
    pub fn break_even_exit(&self, markup: Decimal) -> Decimal {
        self.avg_entry_price + markup
    }
}
