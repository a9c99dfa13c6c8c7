//! Market clock as reported by the brokerage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current market session status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketClock {
    /// Brokerage server time
    pub timestamp: DateTime<Utc>,

    pub is_open: bool,

    pub next_open: DateTime<Utc>,

    pub next_close: DateTime<Utc>,
}
