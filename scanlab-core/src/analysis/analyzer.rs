//! Signal analyzer: OHLCV rows for one range in, indicator bundle out.
//!
//! Pure and deterministic. Every failure is captured into
//! `Analysis::Failed`; nothing escapes the analyzer boundary as a panic.

use super::bundle::{
    composite_score, Analysis, Direction, FibLevel, FibonacciSignal, IndicatorBundle, MacdSignal,
    Trend,
};
use crate::domain::Bar;
use crate::indicators::{last_valid, Indicator, Macd, Retracement, Rsi};
use crate::patterns::detect_patterns;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("insufficient rows: need at least {min}, got {rows}")]
    InsufficientRows { rows: usize, min: usize },

    #[error("non-finite close at row {index}")]
    NonFiniteClose { index: usize },

    #[error("degenerate {indicator}: {reason}")]
    Degenerate {
        indicator: &'static str,
        reason: String,
    },
}

/// Tunable analyzer constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub min_rows: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub fib_lookback: usize,
    /// Relative distance from a level price that still counts as "at level".
    pub fib_tolerance: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_rows: 5,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            fib_lookback: 60,
            fib_tolerance: 0.01,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze one range. Failures become `Analysis::Failed { error }`.
    pub fn analyze(&self, rows: &[Bar], range: &str) -> Analysis {
        match self.try_analyze(rows) {
            Ok(bundle) => Analysis::Ready(bundle),
            Err(e) => {
                tracing::debug!(range, error = %e, "analysis failed");
                Analysis::failed(e.to_string())
            }
        }
    }

    /// Row checks shared by every analysis of a range.
    pub(crate) fn check_rows(&self, rows: &[Bar]) -> Result<(), AnalysisError> {
        let min = self.config.min_rows.max(2);
        if rows.len() < min {
            return Err(AnalysisError::InsufficientRows {
                rows: rows.len(),
                min,
            });
        }
        if let Some(index) = rows.iter().position(|b| !b.close.is_finite()) {
            return Err(AnalysisError::NonFiniteClose { index });
        }
        Ok(())
    }

    pub fn try_analyze(&self, rows: &[Bar]) -> Result<IndicatorBundle, AnalysisError> {
        self.check_rows(rows)?;
        let cfg = &self.config;
        let n = rows.len();
        let rsi = self.rsi(rows, n)?;
        let macd = self.macd(rows, n)?;
        let fibonacci = self.fibonacci(rows)?;
        let patterns = detect_patterns(rows, cfg.fib_lookback);
        let trend = Trend::classify(macd.macd, macd.signal);

        let mut bundle = IndicatorBundle {
            rsi: Some(rsi),
            macd: Some(macd),
            fibonacci: Some(fibonacci),
            patterns: Some(patterns),
            trend,
            score: 0.0,
        };
        bundle.score = composite_score(&bundle);
        Ok(bundle)
    }

    fn rsi(&self, rows: &[Bar], n: usize) -> Result<f64, AnalysisError> {
        let period = self.config.rsi_period.clamp(1, n - 1);
        last_valid(&Rsi::new(period).compute(rows)).ok_or_else(|| AnalysisError::Degenerate {
            indicator: "rsi",
            reason: format!("no value for period {period}"),
        })
    }

    fn macd(&self, rows: &[Bar], n: usize) -> Result<MacdSignal, AnalysisError> {
        let cfg = &self.config;
        let degenerate = |reason: String| AnalysisError::Degenerate {
            indicator: "macd",
            reason,
        };
        if cfg.macd_fast == 0 || cfg.macd_signal == 0 || cfg.macd_slow <= cfg.macd_fast {
            return Err(degenerate(format!(
                "invalid periods {}/{}/{}",
                cfg.macd_fast, cfg.macd_slow, cfg.macd_signal
            )));
        }
        let macd = Macd::new(cfg.macd_fast, cfg.macd_slow, cfg.macd_signal)
            .fitted_to(n)
            .ok_or_else(|| degenerate(format!("{n} rows too short")))?;

        let series = macd.compute(rows);
        let line = last_valid(&series.line);
        let signal = last_valid(&series.signal);
        let histogram = last_valid(&series.histogram);
        let (Some(line), Some(signal), Some(histogram)) = (line, signal, histogram) else {
            return Err(degenerate(format!("no value for {macd:?}")));
        };

        Ok(MacdSignal {
            macd: line,
            signal,
            histogram,
            macd_cross: series.crossed_up_last(),
            direction: if line > signal {
                Direction::Bullish
            } else {
                Direction::Bearish
            },
        })
    }

    fn fibonacci(&self, rows: &[Bar]) -> Result<FibonacciSignal, AnalysisError> {
        let cfg = &self.config;
        let close = rows[rows.len() - 1].close;

        let Some(ret) = Retracement::from_bars(rows, cfg.fib_lookback.max(1)) else {
            // flat window: no swing, so no levels to sit on
            let (high, low) = rows.iter().fold((f64::NAN, f64::NAN), |(h, l), b| {
                (h.max(b.high), l.min(b.low))
            });
            if !high.is_finite() || !low.is_finite() {
                return Err(AnalysisError::Degenerate {
                    indicator: "fibonacci",
                    reason: "no finite swing".into(),
                });
            }
            return Ok(FibonacciSignal {
                swing_high: high,
                swing_low: low,
                levels: Vec::new(),
                at_level: false,
                nearest_ratio: None,
            });
        };

        let nearest = ret.nearest(close);
        Ok(FibonacciSignal {
            swing_high: ret.swing_high,
            swing_low: ret.swing_low,
            levels: ret
                .levels
                .iter()
                .map(|&(ratio, price)| FibLevel { ratio, price })
                .collect(),
            at_level: nearest.is_some_and(|(_, dist)| dist <= cfg.fib_tolerance),
            nearest_ratio: nearest.map(|(ratio, _)| ratio),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    fn rising(n: usize) -> Vec<Bar> {
        make_bars(&(0..n).map(|i| 100.0 + i as f64).collect::<Vec<_>>())
    }

    #[test]
    fn too_few_rows_fails() {
        let out = Analyzer::default().analyze(&rising(4), "1w");
        let err = out.error().unwrap();
        assert!(err.contains("insufficient rows"), "{err}");
    }

    #[test]
    fn five_rows_is_enough() {
        let out = Analyzer::default().analyze(&rising(5), "1w");
        let bundle = out.bundle().expect("bundle");
        assert!((0.0..=1.0).contains(&bundle.score));
        assert!(bundle.rsi.is_some());
        assert!(bundle.macd.is_some());
    }

    #[test]
    fn nan_close_fails_instead_of_panicking() {
        let mut bars = rising(40);
        bars[20].close = f64::NAN;
        let out = Analyzer::default().analyze(&bars, "1m");
        assert!(out.error().unwrap().contains("row 20"));
    }

    #[test]
    fn accelerating_uptrend_is_bull_and_overbought() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + 0.05 * (i * i) as f64).collect();
        let bundle = Analyzer::default()
            .try_analyze(&make_bars(&closes))
            .expect("bundle");
        assert_eq!(bundle.trend, Trend::Bull);
        assert_eq!(bundle.rsi, Some(100.0));
        assert_eq!(bundle.macd.as_ref().unwrap().direction, Direction::Bullish);
        assert_eq!(bundle.score, composite_score(&bundle));
    }

    #[test]
    fn flat_series_has_no_levels() {
        let mut bars = make_bars(&[50.0; 30]);
        for b in &mut bars {
            b.high = 50.0;
            b.low = 50.0;
        }
        let bundle = Analyzer::default().try_analyze(&bars).expect("bundle");
        let fib = bundle.fibonacci.unwrap();
        assert!(fib.levels.is_empty());
        assert!(!fib.at_level);
        assert_eq!(bundle.trend, Trend::Flat);
        assert_eq!(bundle.rsi, Some(50.0));
    }

    #[test]
    fn deterministic() {
        let bars = make_bars(
            &(0..90)
                .map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0)
                .collect::<Vec<_>>(),
        );
        let a = Analyzer::default().analyze(&bars, "6m");
        let b = Analyzer::default().analyze(&bars, "6m");
        assert_eq!(a, b);
    }
}
