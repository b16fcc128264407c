//! Stochastic oscillator.
//!
//! %K[t] = 100 * (close - lowest low) / (highest high - lowest low) over the
//! last `k_period` bars; a zero-width window reads 50. %D = SMA(%K, d_period).

use super::sma::sma_of_series;
use crate::domain::Bar;

#[derive(Debug, Clone, Copy)]
pub struct Stochastic {
    pub k_period: usize,
    pub d_period: usize,
}

#[derive(Debug, Clone)]
pub struct StochasticSeries {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

impl Stochastic {
    pub fn new(k_period: usize, d_period: usize) -> Self {
        assert!(k_period >= 1 && d_period >= 1, "stochastic periods must be >= 1");
        Self { k_period, d_period }
    }

    pub fn compute(&self, bars: &[Bar]) -> StochasticSeries {
        let n = bars.len();
        let mut k = vec![f64::NAN; n];
        for i in self.k_period.saturating_sub(1)..n {
            let window = &bars[i + 1 - self.k_period..=i];
            let (high, low) = window
                .iter()
                .fold((f64::NEG_INFINITY, f64::INFINITY), |(h, l), b| {
                    (h.max(b.high), l.min(b.low))
                });
            let close = bars[i].close;
            if !close.is_finite() || !high.is_finite() || !low.is_finite() {
                continue;
            }
            k[i] = if high > low {
                (100.0 * (close - low) / (high - low)).clamp(0.0, 100.0)
            } else {
                50.0
            };
        }
        let d = sma_of_series(&k, self.d_period);
        StochasticSeries { k, d }
    }
}
