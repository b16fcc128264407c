//! Fibonacci retracement levels over the recent swing.
//!
//! The swing is the highest high and lowest low of the last `lookback` bars.
//! Level price for ratio r = high - r * (high - low).

use crate::domain::Bar;

/// Canonical retracement ratios.
pub const FIB_RATIOS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];

#[derive(Debug, Clone, PartialEq)]
pub struct Retracement {
    pub swing_high: f64,
    pub swing_low: f64,
    /// `(ratio, price)` pairs in `FIB_RATIOS` order.
    pub levels: Vec<(f64, f64)>,
}

impl Retracement {
    /// Levels over the trailing window. `None` when the window holds no finite
    /// bars or the swing has zero height.
    pub fn from_bars(bars: &[Bar], lookback: usize) -> Option<Self> {
        let start = bars.len().saturating_sub(lookback);
        let window = &bars[start..];

        let swing_high = window
            .iter()
            .map(|b| b.high)
            .filter(|v| v.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        let swing_low = window
            .iter()
            .map(|b| b.low)
            .filter(|v| v.is_finite())
            .fold(f64::INFINITY, f64::min);

        if !swing_high.is_finite() || !swing_low.is_finite() || swing_high <= swing_low {
            return None;
        }

        let height = swing_high - swing_low;
        let levels = FIB_RATIOS
            .iter()
            .map(|&r| (r, swing_high - r * height))
            .collect();

        Some(Self {
            swing_high,
            swing_low,
            levels,
        })
    }

    /// Ratio of the level closest to `price`, with its relative distance.
    pub fn nearest(&self, price: f64) -> Option<(f64, f64)> {
        if price == 0.0 || !price.is_finite() {
            return None;
        }
        self.levels
            .iter()
            .map(|&(ratio, level)| (ratio, ((price - level) / price).abs()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars};

    #[test]
    fn levels_span_the_swing() {
        // highs = max(open,close)+1, lows = min(open,close)-1 → swing 99..121
        let bars = make_bars(&[100.0, 110.0, 120.0, 115.0]);
        let fib = Retracement::from_bars(&bars, 60).unwrap();
        assert_approx(fib.swing_high, 121.0, 1e-12);
        assert_approx(fib.swing_low, 99.0, 1e-12);
        assert_approx(fib.levels[2].1, 110.0, 1e-12);
        assert_eq!(fib.levels.len(), FIB_RATIOS.len());
    }

    #[test]
    fn lookback_limits_the_window() {
        let bars = make_bars(&[10.0, 200.0, 100.0, 101.0, 102.0]);
        let fib = Retracement::from_bars(&bars, 2).unwrap();
        assert!(fib.swing_high < 200.0);
    }

    #[test]
    fn flat_window_has_no_levels() {
        let mut bars = make_bars(&[5.0, 5.0]);
        for b in &mut bars {
            b.high = 5.0;
            b.low = 5.0;
        }
        assert!(Retracement::from_bars(&bars, 10).is_none());
    }

    #[test]
    fn nearest_picks_closest_ratio() {
        let bars = make_bars(&[100.0, 110.0, 120.0, 115.0]);
        let fib = Retracement::from_bars(&bars, 60).unwrap();
        let (ratio, dist) = fib.nearest(110.5).unwrap();
        assert_eq!(ratio, 0.5);
        assert!(dist < 0.01);
    }
}
