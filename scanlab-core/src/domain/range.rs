//! Range labels: named lookback windows mapping to an interval and bar count.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bar interval supported by the providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1w")]
    Weekly,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Minute1 => "1m",
            Interval::Minute5 => "5m",
            Interval::Minute15 => "15m",
            Interval::Minute30 => "30m",
            Interval::Hour1 => "1h",
            Interval::Hour4 => "4h",
            Interval::Daily => "1d",
            Interval::Weekly => "1w",
        }
    }

    /// Nominal bar duration in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Interval::Minute1 => 60,
            Interval::Minute5 => 5 * 60,
            Interval::Minute15 => 15 * 60,
            Interval::Minute30 => 30 * 60,
            Interval::Hour1 => 3600,
            Interval::Hour4 => 4 * 3600,
            Interval::Daily => 86_400,
            Interval::Weekly => 7 * 86_400,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Interval::Minute1),
            "5m" => Ok(Interval::Minute5),
            "15m" => Ok(Interval::Minute15),
            "30m" => Ok(Interval::Minute30),
            "1h" => Ok(Interval::Hour1),
            "4h" => Ok(Interval::Hour4),
            "1d" => Ok(Interval::Daily),
            "1w" => Ok(Interval::Weekly),
            other => Err(format!("unknown interval '{other}'")),
        }
    }
}

/// A named historical lookback window: `label` → `interval` × `n_bars`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub label: String,
    pub interval: Interval,
    pub n_bars: usize,
}

impl RangeSpec {
    pub fn new(label: impl Into<String>, interval: Interval, n_bars: usize) -> Self {
        Self {
            label: label.into(),
            interval,
            n_bars,
        }
    }
}

/// The six default windows: one day of 30-minute bars up to two years of daily bars.
pub fn default_ranges() -> Vec<RangeSpec> {
    vec![
        RangeSpec::new("1d", Interval::Minute30, 24),
        RangeSpec::new("1w", Interval::Daily, 7),
        RangeSpec::new("1m", Interval::Daily, 30),
        RangeSpec::new("6m", Interval::Daily, 180),
        RangeSpec::new("1y", Interval::Daily, 365),
        RangeSpec::new("2y", Interval::Daily, 730),
    ]
}
