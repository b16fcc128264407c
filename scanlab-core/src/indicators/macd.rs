//! Moving Average Convergence Divergence (MACD).
//!
//! line = EMA(fast) - EMA(slow), signal = EMA(line, signal_period),
//! histogram = line - signal. Valid from index slow + signal - 2.

use super::{closes, ema_of_series};
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Macd {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

/// The three MACD output series, each as long as the input.
#[derive(Debug, Clone)]
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast >= 1 && signal >= 1, "MACD periods must be >= 1");
        assert!(slow > fast, "MACD slow period must exceed fast period");
        Self { fast, slow, signal }
    }

    /// Bars needed for two consecutive signal values (enough to detect a cross).
    pub fn bars_for_cross(&self) -> usize {
        self.slow + self.signal
    }

    /// Shrink the periods proportionally so a cross can be evaluated on `n` bars.
    ///
    /// Returns `self` unchanged when the window is already long enough and
    /// `None` when even the smallest configuration (2/3/1) does not fit.
    pub fn fitted_to(&self, n: usize) -> Option<Self> {
        if n >= self.bars_for_cross() {
            return Some(*self);
        }
        if n < 4 {
            return None;
        }
        let scale = n as f64 / self.bars_for_cross() as f64;
        let fast = ((self.fast as f64 * scale).floor() as usize).max(2);
        let slow = ((self.slow as f64 * scale).floor() as usize).max(fast + 1);
        let signal = ((self.signal as f64 * scale).floor() as usize)
            .max(1)
            .min(n.saturating_sub(slow));
        if signal == 0 {
            return None;
        }
        Some(Self { fast, slow, signal })
    }

    pub fn compute(&self, bars: &[Bar]) -> MacdSeries {
        let closes = closes(bars);
        let fast = ema_of_series(&closes, self.fast);
        let slow = ema_of_series(&closes, self.slow);
        let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema_of_series(&line, self.signal);
        let histogram = line.iter().zip(&signal).map(|(l, s)| l - s).collect();
        MacdSeries {
            line,
            signal,
            histogram,
        }
    }
}

impl Default for Macd {
    fn default() -> Self {
        Self::new(12, 26, 9)
    }
}

impl MacdSeries {
    /// True when the line crossed above the signal on the final bar.
    pub fn crossed_up_last(&self) -> bool {
        let n = self.histogram.len();
        if n < 2 {
            return false;
        }
        let (prev, cur) = (self.histogram[n - 2], self.histogram[n - 1]);
        prev.is_finite() && cur.is_finite() && prev <= 0.0 && cur > 0.0
    }
}
