//! Advanced indicators for one range: volatility, momentum, stochastic, ADX,
//! support/resistance and a moving-average cross.
//!
//! Each block is `None` when the window is too short or degenerate for it;
//! the call as a whole fails only on the same row checks as the analyzer.

use super::analyzer::{AnalysisError, Analyzer};
use crate::domain::Bar;
use crate::indicators::{closes, last_valid, sma_of_series, Adx, Stochastic};
use serde::{Deserialize, Serialize};

/// Bars per year used to annualize return volatility.
pub const ANNUALIZATION_BARS: f64 = 252.0;
pub const VOL_WINDOW: usize = 20;
pub const MOMENTUM_PERIOD: usize = 10;
pub const STOCH_K: usize = 14;
pub const STOCH_D: usize = 3;
pub const ADX_PERIOD: usize = 14;
pub const SR_WINDOW: usize = 20;
pub const MA_FAST: usize = 20;
pub const MA_SLOW: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volatility {
    /// Annualized standard deviation of bar returns over the whole range.
    pub volatility: f64,
    /// Same, over the last `VOL_WINDOW` returns.
    pub rolling_volatility: f64,
    /// Where the current rolling volatility sits among all rolling windows, 0..=100.
    pub vol_percentile: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MomentumDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Momentum {
    /// Mean close-to-close difference over the momentum period.
    pub momentum: f64,
    pub momentum_pct: f64,
    pub momentum_direction: MomentumDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StochasticZone {
    Overbought,
    Oversold,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StochasticSignal {
    pub stochastic_k: f64,
    pub stochastic_d: f64,
    pub stochastic_signal: StochasticZone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendStrength {
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdxSignal {
    pub adx: f64,
    #[serde(rename = "+di")]
    pub plus_di: f64,
    #[serde(rename = "-di")]
    pub minus_di: f64,
    pub adx_strength: TrendStrength,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportResistance {
    pub current_price: f64,
    pub support: f64,
    pub resistance: f64,
    /// Percent of the current price.
    pub distance_to_support: f64,
    pub distance_to_resistance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossSignal {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaCross {
    pub fast_ma: f64,
    pub slow_ma: f64,
    pub signal: CrossSignal,
    /// (fast - slow) / slow, in percent.
    pub distance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvancedIndicators {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatility: Option<Volatility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub momentum: Option<Momentum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stochastic: Option<StochasticSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adx: Option<AdxSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_resistance: Option<SupportResistance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ma_cross: Option<MaCross>,
}

impl Analyzer {
    pub fn advanced(&self, rows: &[Bar]) -> Result<AdvancedIndicators, AnalysisError> {
        self.check_rows(rows)?;
        let close = closes(rows);
        Ok(AdvancedIndicators {
            volatility: volatility(&close),
            momentum: momentum(&close),
            stochastic: stochastic(rows),
            adx: adx(rows),
            support_resistance: support_resistance(rows),
            ma_cross: ma_cross(&close),
        })
    }
}

fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt()).filter(|s| s.is_finite())
}

fn volatility(close: &[f64]) -> Option<Volatility> {
    let returns: Vec<f64> = close
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .filter(|r| r.is_finite())
        .collect();
    let scale = ANNUALIZATION_BARS.sqrt();
    let overall = std_dev(&returns)? * scale;

    let window = VOL_WINDOW.min(returns.len());
    let rolling: Vec<f64> = returns
        .windows(window)
        .filter_map(|w| std_dev(w).map(|s| s * scale))
        .collect();
    let current = *rolling.last()?;
    let at_or_below = rolling.iter().filter(|&&v| v <= current).count();

    Some(Volatility {
        volatility: overall,
        rolling_volatility: current,
        vol_percentile: 100.0 * at_or_below as f64 / rolling.len() as f64,
    })
}

fn momentum(close: &[f64]) -> Option<Momentum> {
    let n = close.len();
    let period = MOMENTUM_PERIOD.min(n.checked_sub(1)?);
    if period == 0 {
        return None;
    }
    let diffs: Vec<f64> = (period..n).map(|i| close[i] - close[i - period]).collect();
    let recent = &diffs[diffs.len().saturating_sub(period)..];
    let mean = recent.iter().sum::<f64>() / recent.len() as f64;

    let base = close[n - 1 - period];
    if base == 0.0 {
        return None;
    }
    let pct = (close[n - 1] / base - 1.0) * 100.0;
    let direction = if pct > 0.0 {
        MomentumDirection::Up
    } else if pct < 0.0 {
        MomentumDirection::Down
    } else {
        MomentumDirection::Flat
    };
    Some(Momentum {
        momentum: mean,
        momentum_pct: pct,
        momentum_direction: direction,
    })
}

fn stochastic(rows: &[Bar]) -> Option<StochasticSignal> {
    let k_period = STOCH_K.min(rows.len());
    let series = Stochastic::new(k_period, STOCH_D).compute(rows);
    let k = last_valid(&series.k)?;
    // short windows may not fill %D yet
    let d = last_valid(&series.d).unwrap_or(k);
    let zone = if k > 80.0 {
        StochasticZone::Overbought
    } else if k < 20.0 {
        StochasticZone::Oversold
    } else {
        StochasticZone::Neutral
    };
    Some(StochasticSignal {
        stochastic_k: k,
        stochastic_d: d,
        stochastic_signal: zone,
    })
}

fn adx(rows: &[Bar]) -> Option<AdxSignal> {
    let period = ADX_PERIOD.min((rows.len().saturating_sub(1)) / 2);
    if period == 0 {
        return None;
    }
    let series = Adx::new(period).compute_all(rows);
    let adx = last_valid(&series.adx)?;
    let strength = if adx >= 25.0 {
        TrendStrength::Strong
    } else if adx >= 20.0 {
        TrendStrength::Moderate
    } else {
        TrendStrength::Weak
    };
    Some(AdxSignal {
        adx,
        plus_di: last_valid(&series.plus_di)?,
        minus_di: last_valid(&series.minus_di)?,
        adx_strength: strength,
    })
}

fn support_resistance(rows: &[Bar]) -> Option<SupportResistance> {
    let window = &rows[rows.len().saturating_sub(SR_WINDOW)..];
    let price = window.last()?.close;
    let (resistance, support) = window
        .iter()
        .fold((f64::NAN, f64::NAN), |(h, l), b| (h.max(b.high), l.min(b.low)));
    if !support.is_finite() || !resistance.is_finite() || price == 0.0 {
        return None;
    }
    Some(SupportResistance {
        current_price: price,
        support,
        resistance,
        distance_to_support: (price - support) / price * 100.0,
        distance_to_resistance: (resistance - price) / price * 100.0,
    })
}

fn ma_cross(close: &[f64]) -> Option<MaCross> {
    // shrink both windows together on short ranges
    let slow = MA_SLOW.min(close.len());
    let fast = (MA_FAST * slow / MA_SLOW).max(1);
    if fast >= slow {
        return None;
    }
    let fast_ma = last_valid(&sma_of_series(close, fast))?;
    let slow_ma = last_valid(&sma_of_series(close, slow))?;
    if slow_ma == 0.0 {
        return None;
    }
    let signal = if fast_ma > slow_ma {
        CrossSignal::Bullish
    } else if fast_ma < slow_ma {
        CrossSignal::Bearish
    } else {
        CrossSignal::Neutral
    };
    Some(MaCross {
        fast_ma,
        slow_ma,
        signal,
        distance: (fast_ma - slow_ma) / slow_ma * 100.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    fn series(f: impl Fn(f64) -> f64, n: usize) -> Vec<Bar> {
        make_bars(&(0..n).map(|i| f(i as f64)).collect::<Vec<_>>())
    }

    #[test]
    fn uptrend_reads_bullish_everywhere() {
        let adv = Analyzer::default()
            .advanced(&series(|i| 100.0 + i, 80))
            .unwrap();

        let mom = adv.momentum.unwrap();
        assert_eq!(mom.momentum_direction, MomentumDirection::Up);
        assert!((mom.momentum - 10.0).abs() < 1e-9);

        let ma = adv.ma_cross.unwrap();
        assert_eq!(ma.signal, CrossSignal::Bullish);
        assert!(ma.fast_ma > ma.slow_ma && ma.distance > 0.0);

        let adx = adv.adx.unwrap();
        assert!(adx.plus_di > adx.minus_di);
        assert_eq!(adx.adx_strength, TrendStrength::Strong);

        assert_eq!(
            adv.stochastic.unwrap().stochastic_signal,
            StochasticZone::Overbought
        );
        let sr = adv.support_resistance.unwrap();
        assert!(sr.support < sr.current_price && sr.current_price < sr.resistance);
    }

    #[test]
    fn downtrend_reads_bearish() {
        let adv = Analyzer::default()
            .advanced(&series(|i| 200.0 - i, 80))
            .unwrap();
        assert_eq!(
            adv.momentum.unwrap().momentum_direction,
            MomentumDirection::Down
        );
        assert_eq!(adv.ma_cross.unwrap().signal, CrossSignal::Bearish);
        assert_eq!(
            adv.stochastic.unwrap().stochastic_signal,
            StochasticZone::Oversold
        );
    }

    #[test]
    fn volatility_spike_tops_the_percentile() {
        // calm zig-zag, then a wide one for the last 20 bars
        let bars = series(
            |i| {
                let swing = if i < 100.0 { 0.1 } else { 5.0 };
                if i as usize % 2 == 0 {
                    100.0 + swing
                } else {
                    100.0 - swing
                }
            },
            120,
        );
        let vol = Analyzer::default().advanced(&bars).unwrap().volatility.unwrap();
        assert!(vol.rolling_volatility > vol.volatility);
        assert_eq!(vol.vol_percentile, 100.0);
    }

    #[test]
    fn short_range_shrinks_windows() {
        let adv = Analyzer::default()
            .advanced(&series(|i| 50.0 + i, 6))
            .unwrap();
        assert!(adv.ma_cross.is_some());
        assert!(adv.momentum.is_some());
        assert!(adv.stochastic.is_some());
    }

    #[test]
    fn too_few_rows_is_an_error() {
        let err = Analyzer::default()
            .advanced(&series(|i| 50.0 + i, 3))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientRows { .. }));
    }

    #[test]
    fn disabled_blocks_are_absent_from_json() {
        let json = serde_json::to_value(AdvancedIndicators::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));

        let adv = Analyzer::default()
            .advanced(&series(|i| 100.0 + i, 80))
            .unwrap();
        let json = serde_json::to_value(&adv).unwrap();
        assert!(json["adx"]["+di"].is_f64());
        assert_eq!(json["momentum"]["momentum_direction"], "up");
    }
}
