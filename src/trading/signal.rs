//! Buy signal: upward crossover of the close over its moving average.

use super::BarSeries;

/// The two samples the crossover test looked at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossover {
    /// Closes at positions -2 and -1
    pub closes: [f64; 2],
    /// Moving averages at positions -2 and -1
    pub means: [Option<f64>; 2],
}

impl Crossover {
    /// True when the close went from below its average to above it.
    pub fn fires(&self) -> bool {
        match self.means {
            [Some(prev_mean), Some(last_mean)] => {
                self.closes[0] < prev_mean && self.closes[1] > last_mean
            }
            _ => false,
        }
    }
}

/// Evaluates the crossover on the close over a fixed window.
#[derive(Debug, Clone, Copy)]
pub struct SignalEvaluator {
    window: usize,
}

impl SignalEvaluator {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// Sample the last two closes and averages.
    ///
    /// Returns `None` while fewer than two bars are available.
    pub fn sample(&self, series: &BarSeries) -> Option<Crossover> {
        let n = series.len();
        if n < 2 {
            return None;
        }

        let mut closes = series.values(|bar| bar.close).skip(n - 2);
        let mut means = series.trailing_mean(self.window, |bar| bar.close).skip(n - 2);

        Some(Crossover {
            closes: [closes.next()?, closes.next()?],
            means: [means.next()?, means.next()?],
        })
    }
}
