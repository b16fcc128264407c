//! Bar: the fundamental market data unit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// One OHLCV row for a single range of a symbol.
///
/// Non-finite prices survive a JSON round trip as `null` and come back as `NaN`,
/// so a snapshot written with gaps in the provider data can always be reloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: NaiveDateTime,
    #[serde(deserialize_with = "nan_if_null")]
    pub open: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub high: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub low: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub close: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub volume: f64,
}

impl Bar {
    /// Returns true if any OHLC field is non-finite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }

    /// Absolute size of the candle body.
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Full high-low range of the candle.
    pub fn span(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Sort rows ascending by time and drop duplicate timestamps, keeping the
/// latest row seen for each timestamp.
pub fn normalize_rows(mut bars: Vec<Bar>) -> Vec<Bar> {
    // Stable sort keeps provider order among equal timestamps, so the last
    // duplicate is the most recent one delivered.
    bars.sort_by_key(|b| b.time);
    let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(prev) if prev.time == bar.time => *prev = bar,
            _ => out.push(bar),
        }
    }
    out
}

fn nan_if_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn sample_bar() -> Bar {
        Bar {
            time: at(10),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
        assert!(sample_bar().is_bullish());
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.open = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar();
        bar.high = 97.0;
        assert!(!bar.is_sane());
    }

    #[test]
    fn nan_serializes_as_null_and_reloads_as_nan() {
        let mut bar = sample_bar();
        bar.volume = f64::NAN;
        let json = serde_json::to_value(&bar).unwrap();
        assert!(json["volume"].is_null());
        assert!(json["time"].is_string());

        let back: Bar = serde_json::from_value(json).unwrap();
        assert!(back.volume.is_nan());
        assert_eq!(back.close, 103.0);
    }

    #[test]
    fn normalize_sorts_and_dedupes() {
        let mut late = sample_bar();
        late.time = at(12);
        let mut dup = sample_bar();
        dup.close = 104.0;

        let rows = normalize_rows(vec![late.clone(), sample_bar(), dup]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].time, at(10));
        assert_eq!(rows[0].close, 104.0, "last duplicate wins");
        assert_eq!(rows[1].time, at(12));
    }
}
