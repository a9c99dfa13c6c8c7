//! Strategy configuration.

use chrono::{Duration, NaiveTime};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Constants of the scalping strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Moving average window, in bars
    pub ma_window: usize,

    /// Bars kept per symbol; must exceed `ma_window`
    pub history_capacity: usize,

    /// Time zone of the exchange session
    pub market_timezone: Tz,

    /// Regular session open (local time), used to seed history
    pub session_open: NaiveTime,

    /// No entries before this local time
    pub earliest_entry: NaiveTime,

    /// No entries (and forced liquidation) this close to the session end
    pub closing_buffer_secs: i64,

    /// Buy orders working longer than this are canceled
    pub stale_order_secs: i64,

    /// Period of the checkup sweep
    pub sweep_interval_secs: u64,

    /// Minimum markup over cost basis for a regular exit
    pub min_sell_markup: Decimal,
}

impl StrategyConfig {
    pub fn closing_buffer(&self) -> Duration {
        Duration::seconds(self.closing_buffer_secs)
    }

    pub fn stale_order_age(&self) -> Duration {
        Duration::seconds(self.stale_order_secs)
    }

    /// Check that the values make sense together.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ma_window < 1 {
            anyhow::bail!("ma_window must be at least 1");
        }
        // The crossover looks at the last two averages.
        if self.history_capacity <= self.ma_window {
            anyhow::bail!(
                "history_capacity ({}) must exceed ma_window ({})",
                self.history_capacity,
                self.ma_window
            );
        }
        if self.sweep_interval_secs == 0 {
            anyhow::bail!("sweep_interval_secs must be positive");
        }
        if self.min_sell_markup < Decimal::ZERO {
            anyhow::bail!("min_sell_markup must not be negative");
        }
        Ok(())
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            ma_window: 20,
            history_capacity: 64,
            market_timezone: chrono_tz::America::New_York,
            session_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            earliest_entry: NaiveTime::from_hms_opt(10, 5, 0).unwrap_or_default(),
            closing_buffer_secs: 5 * 60, // 5 minutes
            stale_order_secs: 2 * 60,    // 2 minutes
            sweep_interval_secs: 30,
            min_sell_markup: dec!(0.01), // one cent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = StrategyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.closing_buffer(), Duration::minutes(5));
        assert_eq!(config.stale_order_age(), Duration::minutes(2));
    }

    #[test]
    fn test_capacity_must_cover_window() {
        let config = StrategyConfig {
            history_capacity: 20,
            ..StrategyConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
