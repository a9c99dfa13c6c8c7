//! Bounded, time-ordered bar history for one symbol.

use std::collections::VecDeque;

use tracing::warn;

use crate::models::Bar;

/// Ring buffer of the most recent bars.
#[derive(Debug, Clone)]
pub struct BarSeries {
    symbol: String,
    bars: VecDeque<Bar>,
    capacity: usize,
}

impl BarSeries {
    /// Create an empty series holding at most `capacity` bars.
    pub fn new(symbol: &str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            symbol: symbol.to_string(),
            bars: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Create a series seeded with historical bars.
    pub fn from_history(symbol: &str, capacity: usize, history: impl IntoIterator<Item = Bar>) -> Self {
        let mut series = Self::new(symbol, capacity);
        for bar in history {
            series.append(bar);
        }
        series
    }

    /// Append a bar, evicting the oldest once full.
    ///
    /// Bars that do not start strictly after the last one are logged and
    /// dropped. Returns whether the bar was kept.
    pub fn append(&mut self, bar: Bar) -> bool {
        if let Some(last) = self.bars.back() {
            if bar.timestamp < last.timestamp {
                warn!(
                    symbol = %self.symbol,
                    bar_start = %bar.timestamp,
                    last_start = %last.timestamp,
                    "Out-of-order bar ignored"
                );
                return false;
            }
            if bar.timestamp == last.timestamp {
                warn!(
                    symbol = %self.symbol,
                    bar_start = %bar.timestamp,
                    "Duplicate bar ignored"
                );
                return false;
            }
        }

        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
        true
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Raw values of one field, oldest first.
    pub fn values<'a, F>(&'a self, field: F) -> impl Iterator<Item = f64> + 'a
    where
        F: Fn(&Bar) -> f64 + 'a,
    {
        self.bars.iter().map(field)
    }

    /// Simple moving average of `field` over `window` bars, aligned to each bar.
    ///
    /// Yields one item per bar; positions with fewer than `window` bars up to
    /// and including them yield `None`.
    pub fn trailing_mean<'a, F>(&'a self, window: usize, field: F) -> impl Iterator<Item = Option<f64>> + 'a
    where
        F: Fn(&Bar) -> f64 + 'a,
    {
        (0..self.bars.len()).map(move |i| {
            if window == 0 || i + 1 < window {
                return None;
            }
            let sum: f64 = self
                .bars
                .range(i + 1 - window..=i)
                .map(&field)
                .sum();
            Some(sum / window as f64)
        })
    }
}
