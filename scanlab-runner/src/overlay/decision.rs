//! Rule-based decision signal over the advanced indicator set.
//!
//! Every available indicator is mapped to a bullishness component in [0, 1]
//! (0.5 neutral). The signal is their weighted mean; confidence is the share
//! of components agreeing with the signal's side, damped in volatile regimes.

use scanlab_core::analysis::AdvancedIndicators;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TREND_WEIGHT: f64 = 0.25;
pub const MOMENTUM_WEIGHT: f64 = 0.20;
pub const ADX_WEIGHT: f64 = 0.20;
pub const STOCHASTIC_WEIGHT: f64 = 0.15;
pub const LEVELS_WEIGHT: f64 = 0.20;

/// Components within this distance of 0.5 count as neutral.
const NEUTRAL_BAND: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Recommendation {
    pub fn from_signal(signal: f64) -> Self {
        if signal >= 0.70 {
            Recommendation::StrongBuy
        } else if signal >= 0.58 {
            Recommendation::Buy
        } else if signal <= 0.30 {
            Recommendation::StrongSell
        } else if signal <= 0.42 {
            Recommendation::Sell
        } else {
            Recommendation::Hold
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSignal {
    pub recommendation: Recommendation,
    pub signal: f64,
    pub confidence: f64,
    pub components: BTreeMap<String, f64>,
}

impl DecisionSignal {
    pub fn neutral() -> Self {
        Self {
            recommendation: Recommendation::Hold,
            signal: 0.5,
            confidence: 0.0,
            components: BTreeMap::new(),
        }
    }
}

/// Map `x` in [-scale, scale] onto [0, 1] around 0.5.
fn centered(x: f64, scale: f64) -> f64 {
    0.5 + 0.5 * (x / scale).clamp(-1.0, 1.0)
}

fn side(x: f64) -> i8 {
    if x > 0.5 + NEUTRAL_BAND {
        1
    } else if x < 0.5 - NEUTRAL_BAND {
        -1
    } else {
        0
    }
}

pub fn decision_signal(adv: &AdvancedIndicators) -> DecisionSignal {
    let mut weighted: Vec<(&str, f64, f64)> = Vec::new();

    if let Some(ma) = &adv.ma_cross {
        // a 5 % gap between the averages saturates
        weighted.push(("trend", centered(ma.distance, 5.0), TREND_WEIGHT));
    }
    if let Some(m) = &adv.momentum {
        weighted.push(("momentum", centered(m.momentum_pct, 10.0), MOMENTUM_WEIGHT));
    }
    if let Some(a) = &adv.adx {
        let strength = (a.adx / 50.0).clamp(0.0, 1.0);
        let dir = match a.plus_di.partial_cmp(&a.minus_di) {
            Some(std::cmp::Ordering::Greater) => 1.0,
            Some(std::cmp::Ordering::Less) => -1.0,
            _ => 0.0,
        };
        weighted.push(("adx_trend", 0.5 + 0.5 * dir * strength, ADX_WEIGHT));
    }
    if let Some(s) = &adv.stochastic {
        // oversold reads bullish
        let value = 1.0 - s.stochastic_k / 100.0;
        weighted.push(("stochastic", value.clamp(0.0, 1.0), STOCHASTIC_WEIGHT));
    }
    if let Some(sr) = &adv.support_resistance {
        let width = sr.resistance - sr.support;
        let value = if width > 0.0 {
            1.0 - (sr.current_price - sr.support) / width
        } else {
            0.5
        };
        weighted.push(("support_resistance", value.clamp(0.0, 1.0), LEVELS_WEIGHT));
    }

    let total: f64 = weighted.iter().map(|(_, _, w)| w).sum();
    if weighted.is_empty() || total <= 0.0 {
        return DecisionSignal::neutral();
    }
    let signal = (weighted.iter().map(|(_, v, w)| v * w).sum::<f64>() / total).clamp(0.0, 1.0);

    let target = side(signal);
    let agreeing = weighted.iter().filter(|(_, v, _)| side(*v) == target).count();
    let agreement = agreeing as f64 / weighted.len() as f64;
    let calm = adv
        .volatility
        .as_ref()
        .map_or(1.0, |v| 1.0 - 0.5 * (v.vol_percentile / 100.0).clamp(0.0, 1.0));

    DecisionSignal {
        recommendation: Recommendation::from_signal(signal),
        signal,
        confidence: (agreement * calm).clamp(0.0, 1.0),
        components: weighted
            .into_iter()
            .map(|(name, value, _)| (name.to_string(), value))
            .collect(),
    }
}
