//! Session boundaries and the time gates derived from them.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;

use super::StrategyConfig;

/// Tracks the next session close and answers the entry/exit time predicates.
#[derive(Debug, Clone)]
pub struct SessionClock {
    next_close: DateTime<Utc>,
    timezone: Tz,
    earliest_entry: NaiveTime,
    closing_buffer: Duration,
}

impl SessionClock {
    pub fn new(next_close: DateTime<Utc>, config: &StrategyConfig) -> Self {
        Self {
            next_close,
            timezone: config.market_timezone,
            earliest_entry: config.earliest_entry,
            closing_buffer: config.closing_buffer(),
        }
    }

    pub fn next_close(&self) -> DateTime<Utc> {
        self.next_close
    }

    pub fn update_next_close(&mut self, next_close: DateTime<Utc>) {
        self.next_close = next_close;
    }

    /// Before the earliest entry time, in session-local time.
    pub fn too_early_to_trade(&self, now: DateTime<Utc>) -> bool {
        now.with_timezone(&self.timezone).time() < self.earliest_entry
    }

    /// Within the closing buffer of the next close.
    pub fn closing_soon(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_close - self.closing_buffer
    }

    /// Entries are allowed only between the earliest entry and the closing buffer.
    pub fn entry_allowed(&self, now: DateTime<Utc>) -> bool {
        !self.too_early_to_trade(now) && !self.closing_soon(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn local(h: u32, m: u32) -> DateTime<Utc> {
        New_York
            .with_ymd_and_hms(2024, 3, 15, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn make_clock() -> SessionClock {
        SessionClock::new(local(16, 0), &StrategyConfig::default())
    }

    #[test]
    fn test_too_early() {
        let clock = make_clock();
        assert!(clock.too_early_to_trade(local(9, 45)));
        assert!(clock.too_early_to_trade(local(10, 4)));
        assert!(!clock.too_early_to_trade(local(10, 5)));
        assert!(!clock.too_early_to_trade(local(10, 6)));
    }

    #[test]
    fn test_closing_soon() {
        let clock = make_clock();
        assert!(!clock.closing_soon(local(15, 54)));
        assert!(clock.closing_soon(local(15, 55)));
        assert!(clock.closing_soon(local(15, 59)));
    }

    #[test]
    fn test_entry_window() {
        let clock = make_clock();
        assert!(!clock.entry_allowed(local(10, 0)));
        assert!(clock.entry_allowed(local(12, 0)));
        assert!(!clock.entry_allowed(local(15, 56)));
    }

    #[test]
    fn test_update_next_close() {
        let mut clock = make_clock();
        // Early close day
        clock.update_next_close(local(13, 0));
        assert!(clock.closing_soon(local(12, 56)));
        assert_eq!(clock.next_close(), local(13, 0));
    }
}
