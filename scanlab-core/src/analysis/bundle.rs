//! Indicator bundle: the per-range result of a signal analysis.
//!
//! Optional sub-signals are genuinely optional. `None` means the signal is
//! disabled and the key is absent from JSON; it never means "unknown".

use crate::patterns::PatternMatch;
use serde::{Deserialize, Serialize};

/// Score every bundle starts from before sub-signal contributions.
pub const BASELINE_SCORE: f64 = 0.5;

/// Fixed-magnitude score contributions.
pub mod weights {
    pub const RSI_OVERSOLD: f64 = 0.15;
    pub const RSI_OVERBOUGHT: f64 = -0.15;
    pub const MACD_CROSS: f64 = 0.10;
    pub const FIB_AT_LEVEL: f64 = 0.08;
    pub const ANY_PATTERN: f64 = 0.10;
    pub const TREND_BULL: f64 = 0.15;
    pub const TREND_BEAR: f64 = -0.15;

    pub const RSI_OVERSOLD_BELOW: f64 = 30.0;
    pub const RSI_OVERBOUGHT_ABOVE: f64 = 70.0;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bull,
    Bear,
    Flat,
}

impl Trend {
    /// bull if MACD > 0 and above its signal, bear if MACD < 0 and below it.
    pub fn classify(macd: f64, signal: f64) -> Self {
        if macd > 0.0 && macd > signal {
            Trend::Bull
        } else if macd < 0.0 && macd < signal {
            Trend::Bear
        } else {
            Trend::Flat
        }
    }

    /// Numeric encoding used as a model feature.
    pub fn as_feature(&self) -> f64 {
        match self {
            Trend::Bull => 1.0,
            Trend::Bear => -1.0,
            Trend::Flat => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdSignal {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
    /// The MACD line crossed above its signal line on the latest bar.
    pub macd_cross: bool,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibLevel {
    pub ratio: f64,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibonacciSignal {
    pub swing_high: f64,
    pub swing_low: f64,
    pub levels: Vec<FibLevel>,
    pub at_level: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nearest_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macd: Option<MacdSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fibonacci: Option<FibonacciSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<PatternMatch>>,
    pub trend: Trend,
    pub score: f64,
}

impl IndicatorBundle {
    pub fn has_patterns(&self) -> bool {
        self.patterns.as_ref().is_some_and(|p| !p.is_empty())
    }

    pub fn macd_cross(&self) -> bool {
        self.macd.as_ref().is_some_and(|m| m.macd_cross)
    }

    pub fn at_level(&self) -> bool {
        self.fibonacci.as_ref().is_some_and(|f| f.at_level)
    }
}

/// Composite tradeability score over whatever sub-signals the bundle carries.
///
/// Shared by the analyzer and the filter, so rescoring a bundle with every
/// signal enabled reproduces the analyzer's score bit for bit.
pub fn composite_score(bundle: &IndicatorBundle) -> f64 {
    let mut score = BASELINE_SCORE;

    if let Some(rsi) = bundle.rsi {
        if rsi < weights::RSI_OVERSOLD_BELOW {
            score += weights::RSI_OVERSOLD;
        } else if rsi > weights::RSI_OVERBOUGHT_ABOVE {
            score += weights::RSI_OVERBOUGHT;
        }
    }
    if bundle.macd_cross() {
        score += weights::MACD_CROSS;
    }
    if bundle.at_level() {
        score += weights::FIB_AT_LEVEL;
    }
    if bundle.has_patterns() {
        score += weights::ANY_PATTERN;
    }
    score += match bundle.trend {
        Trend::Bull => weights::TREND_BULL,
        Trend::Bear => weights::TREND_BEAR,
        Trend::Flat => 0.0,
    };

    score.clamp(0.0, 1.0)
}

/// Result of analyzing one range: a bundle, or the reason there is none.
///
/// Serialized untagged, so a failure is exactly `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Analysis {
    Ready(IndicatorBundle),
    Failed { error: String },
}

impl Analysis {
    pub fn failed(error: impl Into<String>) -> Self {
        Analysis::Failed {
            error: error.into(),
        }
    }

    pub fn bundle(&self) -> Option<&IndicatorBundle> {
        match self {
            Analysis::Ready(b) => Some(b),
            Analysis::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Analysis::Ready(_) => None,
            Analysis::Failed { error } => Some(error),
        }
    }

    pub fn score(&self) -> Option<f64> {
        self.bundle().map(|b| b.score)
    }
}

/// Which toggleable sub-signals are enabled. Trend is not toggleable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSet {
    pub rsi: bool,
    pub macd: bool,
    pub fibonacci: bool,
    pub patterns: bool,
}

impl SignalSet {
    pub const ALL: SignalSet = SignalSet {
        rsi: true,
        macd: true,
        fibonacci: true,
        patterns: true,
    };

    /// Parse a comma-separated list such as `"rsi,macd"`. Empty input enables nothing.
    pub fn parse_list(list: &str) -> Result<Self, String> {
        let mut set = SignalSet {
            rsi: false,
            macd: false,
            fibonacci: false,
            patterns: false,
        };
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match name.to_ascii_lowercase().as_str() {
                "rsi" => set.rsi = true,
                "macd" => set.macd = true,
                "fibonacci" | "fib" => set.fibonacci = true,
                "patterns" => set.patterns = true,
                "all" => set = SignalSet::ALL,
                other => return Err(format!("unknown signal: {other}")),
            }
        }
        Ok(set)
    }
}

impl Default for SignalSet {
    fn default() -> Self {
        SignalSet::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{Bias, PatternKind};

    fn bundle() -> IndicatorBundle {
        IndicatorBundle {
            rsi: Some(25.0),
            macd: Some(MacdSignal {
                macd: 0.4,
                signal: 0.1,
                histogram: 0.3,
                macd_cross: true,
                direction: Direction::Bullish,
            }),
            fibonacci: Some(FibonacciSignal {
                swing_high: 110.0,
                swing_low: 90.0,
                levels: vec![FibLevel {
                    ratio: 0.5,
                    price: 100.0,
                }],
                at_level: true,
                nearest_ratio: Some(0.5),
            }),
            patterns: Some(vec![PatternMatch {
                name: PatternKind::Hammer,
                bias: Bias::Bullish,
                bar_index: 9,
            }]),
            trend: Trend::Bull,
            score: 0.0,
        }
    }

    #[test]
    fn every_bullish_contribution_clamps_to_one() {
        // 0.5 + 0.15 + 0.10 + 0.08 + 0.10 + 0.15 = 1.08
        assert_eq!(composite_score(&bundle()), 1.0);
    }

    #[test]
    fn baseline_when_nothing_fires() {
        let b = IndicatorBundle {
            rsi: Some(50.0),
            macd: None,
            fibonacci: None,
            patterns: Some(vec![]),
            trend: Trend::Flat,
            score: 0.0,
        };
        assert_eq!(composite_score(&b), BASELINE_SCORE);
    }

    #[test]
    fn overbought_bear() {
        let mut b = bundle();
        b.rsi = Some(80.0);
        b.macd = None;
        b.fibonacci = None;
        b.patterns = None;
        b.trend = Trend::Bear;
        assert!((composite_score(&b) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn trend_rule() {
        assert_eq!(Trend::classify(1.0, 0.5), Trend::Bull);
        assert_eq!(Trend::classify(1.0, 1.5), Trend::Flat);
        assert_eq!(Trend::classify(-1.0, -0.5), Trend::Bear);
        assert_eq!(Trend::classify(-1.0, -1.5), Trend::Flat);
        assert_eq!(Trend::classify(0.0, -1.0), Trend::Flat);
    }

    #[test]
    fn disabled_signals_are_absent_from_json() {
        let mut b = bundle();
        b.macd = None;
        b.patterns = None;
        let json = serde_json::to_value(&b).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("macd"));
        assert!(!obj.contains_key("patterns"));
        assert!(obj.contains_key("rsi"));
        assert_eq!(json["trend"], "bull");
    }

    #[test]
    fn failed_analysis_is_bare_error_object() {
        let failed = Analysis::failed("need at least 5 rows");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json, serde_json::json!({"error": "need at least 5 rows"}));

        let back: Analysis = serde_json::from_value(json).unwrap();
        assert_eq!(back, failed);

        let ready = Analysis::Ready(bundle());
        let back: Analysis = serde_json::from_value(serde_json::to_value(&ready).unwrap()).unwrap();
        assert_eq!(back, ready);
    }

    #[test]
    fn signal_list_parsing() {
        let set = SignalSet::parse_list("rsi, fib").unwrap();
        assert!(set.rsi && set.fibonacci && !set.macd && !set.patterns);
        assert_eq!(SignalSet::parse_list("all").unwrap(), SignalSet::ALL);
        assert!(SignalSet::parse_list("volume").is_err());
    }
}
