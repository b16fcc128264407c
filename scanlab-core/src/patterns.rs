//! Chart-pattern battery.
//!
//! Candlestick detectors look only at the final one to three bars. The
//! double-top/double-bottom detectors scan the trailing swing window. Every
//! detector is a plain function so the battery stays a fixed, ordered list.

use crate::domain::Bar;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    BullishEngulfing,
    BearishEngulfing,
    Hammer,
    ShootingStar,
    Doji,
    ThreeWhiteSoldiers,
    ThreeBlackCrows,
    DoubleBottom,
    DoubleTop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl PatternKind {
    pub fn bias(&self) -> Bias {
        match self {
            PatternKind::BullishEngulfing
            | PatternKind::Hammer
            | PatternKind::ThreeWhiteSoldiers
            | PatternKind::DoubleBottom => Bias::Bullish,
            PatternKind::BearishEngulfing
            | PatternKind::ShootingStar
            | PatternKind::ThreeBlackCrows
            | PatternKind::DoubleTop => Bias::Bearish,
            PatternKind::Doji => Bias::Neutral,
        }
    }
}

/// One detected pattern, anchored at the bar where it completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub name: PatternKind,
    pub bias: Bias,
    pub bar_index: usize,
}

impl PatternMatch {
    fn at(name: PatternKind, bar_index: usize) -> Self {
        Self {
            name,
            bias: name.bias(),
            bar_index,
        }
    }
}

type Detector = fn(&[Bar]) -> Option<usize>;

const BATTERY: [(PatternKind, Detector); 9] = [
    (PatternKind::BullishEngulfing, bullish_engulfing),
    (PatternKind::BearishEngulfing, bearish_engulfing),
    (PatternKind::Hammer, hammer),
    (PatternKind::ShootingStar, shooting_star),
    (PatternKind::Doji, doji),
    (PatternKind::ThreeWhiteSoldiers, three_white_soldiers),
    (PatternKind::ThreeBlackCrows, three_black_crows),
    (PatternKind::DoubleBottom, double_bottom),
    (PatternKind::DoubleTop, double_top),
];

/// Relative tolerance for "equal" swing extremes in double tops/bottoms.
const DOUBLE_TOLERANCE: f64 = 0.015;

/// Run every detector over `bars`. `swing_lookback` bounds the double-top/bottom scan.
pub fn detect_patterns(bars: &[Bar], swing_lookback: usize) -> Vec<PatternMatch> {
    if bars.is_empty() {
        return Vec::new();
    }
    let start = bars.len().saturating_sub(swing_lookback.max(3));
    let window = &bars[start..];

    BATTERY
        .iter()
        .filter_map(|(kind, detect)| detect(window).map(|i| PatternMatch::at(*kind, start + i)))
        .collect()
}

fn last_two(bars: &[Bar]) -> Option<(&Bar, &Bar)> {
    match bars {
        [.., prev, cur] if !prev.is_void() && !cur.is_void() => Some((prev, cur)),
        _ => None,
    }
}

fn last_three(bars: &[Bar]) -> Option<[&Bar; 3]> {
    match bars {
        [.., a, b, c] if !a.is_void() && !b.is_void() && !c.is_void() => Some([a, b, c]),
        _ => None,
    }
}

fn bullish_engulfing(bars: &[Bar]) -> Option<usize> {
    let (prev, cur) = last_two(bars)?;
    (prev.is_bearish() && cur.is_bullish() && cur.open <= prev.close && cur.close >= prev.open)
        .then_some(bars.len() - 1)
}

fn bearish_engulfing(bars: &[Bar]) -> Option<usize> {
    let (prev, cur) = last_two(bars)?;
    (prev.is_bullish() && cur.is_bearish() && cur.open >= prev.close && cur.close <= prev.open)
        .then_some(bars.len() - 1)
}

fn hammer(bars: &[Bar]) -> Option<usize> {
    let bar = bars.last().filter(|b| !b.is_void())?;
    let body = bar.body();
    let lower = bar.open.min(bar.close) - bar.low;
    let upper = bar.high - bar.open.max(bar.close);
    (body > 0.0 && lower >= 2.0 * body && upper <= body).then_some(bars.len() - 1)
}

fn shooting_star(bars: &[Bar]) -> Option<usize> {
    let bar = bars.last().filter(|b| !b.is_void())?;
    let body = bar.body();
    let lower = bar.open.min(bar.close) - bar.low;
    let upper = bar.high - bar.open.max(bar.close);
    (body > 0.0 && upper >= 2.0 * body && lower <= body).then_some(bars.len() - 1)
}

fn doji(bars: &[Bar]) -> Option<usize> {
    let bar = bars.last().filter(|b| !b.is_void())?;
    let span = bar.span();
    (span > 0.0 && bar.body() <= 0.1 * span).then_some(bars.len() - 1)
}

fn three_white_soldiers(bars: &[Bar]) -> Option<usize> {
    let [a, b, c] = last_three(bars)?;
    let rising = a.is_bullish()
        && b.is_bullish()
        && c.is_bullish()
        && b.close > a.close
        && c.close > b.close
        && b.open > a.open
        && c.open > b.open;
    rising.then_some(bars.len() - 1)
}

fn three_black_crows(bars: &[Bar]) -> Option<usize> {
    let [a, b, c] = last_three(bars)?;
    let falling = a.is_bearish()
        && b.is_bearish()
        && c.is_bearish()
        && b.close < a.close
        && c.close < b.close
        && b.open < a.open
        && c.open < b.open;
    falling.then_some(bars.len() - 1)
}

/// Indices of strict local minima (`lows`) or maxima (`!lows`) of a series.
fn pivots(values: &[f64], lows: bool) -> Vec<usize> {
    (1..values.len().saturating_sub(1))
        .filter(|&i| {
            let (p, c, n) = (values[i - 1], values[i], values[i + 1]);
            if lows {
                c < p && c < n
            } else {
                c > p && c > n
            }
        })
        .collect()
}

fn double_bottom(bars: &[Bar]) -> Option<usize> {
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let piv = pivots(&lows, true);
    let (&i, &j) = (piv.get(piv.len().checked_sub(2)?)?, piv.last()?);
    let (a, b) = (lows[i], lows[j]);
    let peak = bars[i..=j]
        .iter()
        .map(|b| b.high)
        .fold(f64::NEG_INFINITY, f64::max);
    let last_close = bars.last()?.close;
    let similar = ((a - b) / a.min(b)).abs() <= DOUBLE_TOLERANCE;
    let neckline_gap = peak > a.max(b) * (1.0 + 2.0 * DOUBLE_TOLERANCE);
    (similar && neckline_gap && last_close > a.max(b)).then_some(j)
}

fn double_top(bars: &[Bar]) -> Option<usize> {
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let piv = pivots(&highs, false);
    let (&i, &j) = (piv.get(piv.len().checked_sub(2)?)?, piv.last()?);
    let (a, b) = (highs[i], highs[j]);
    let trough = bars[i..=j]
        .iter()
        .map(|b| b.low)
        .fold(f64::INFINITY, f64::min);
    let last_close = bars.last()?.close;
    let similar = ((a - b) / a.max(b)).abs() <= DOUBLE_TOLERANCE;
    let neckline_gap = trough < a.min(b) * (1.0 - 2.0 * DOUBLE_TOLERANCE);
    (similar && neckline_gap && last_close < a.min(b)).then_some(j)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            time: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                + chrono::Duration::days(i),
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    fn kinds(found: &[PatternMatch]) -> Vec<PatternKind> {
        found.iter().map(|m| m.name).collect()
    }

    #[test]
    fn bullish_engulfing_detected() {
        let bars = vec![bar(0, 10.0, 10.2, 9.4, 9.5), bar(1, 9.4, 10.6, 9.3, 10.5)];
        let found = detect_patterns(&bars, 60);
        assert!(kinds(&found).contains(&PatternKind::BullishEngulfing));
        let m = found
            .iter()
            .find(|m| m.name == PatternKind::BullishEngulfing)
            .unwrap();
        assert_eq!(m.bias, Bias::Bullish);
        assert_eq!(m.bar_index, 1);
    }

    #[test]
    fn hammer_and_star_are_exclusive() {
        let hammer_bar = vec![bar(0, 10.0, 10.45, 8.0, 10.4)];
        assert_eq!(kinds(&detect_patterns(&hammer_bar, 60)), vec![PatternKind::Hammer]);

        let star_bar = vec![bar(0, 10.0, 12.0, 9.55, 9.6)];
        let found = kinds(&detect_patterns(&star_bar, 60));
        assert!(found.contains(&PatternKind::ShootingStar));
        assert!(!found.contains(&PatternKind::Hammer));
    }

    #[test]
    fn doji_detected() {
        let bars = vec![bar(0, 10.0, 11.0, 9.0, 10.05)];
        assert!(kinds(&detect_patterns(&bars, 60)).contains(&PatternKind::Doji));
    }

    #[test]
    fn three_soldiers_and_crows() {
        let up = vec![
            bar(0, 10.0, 11.1, 9.9, 11.0),
            bar(1, 10.5, 12.1, 10.4, 12.0),
            bar(2, 11.5, 13.1, 11.4, 13.0),
        ];
        assert!(kinds(&detect_patterns(&up, 60)).contains(&PatternKind::ThreeWhiteSoldiers));

        let down = vec![
            bar(0, 13.0, 13.1, 11.9, 12.0),
            bar(1, 12.5, 12.6, 10.9, 11.0),
            bar(2, 11.5, 11.6, 9.9, 10.0),
        ];
        assert!(kinds(&detect_patterns(&down, 60)).contains(&PatternKind::ThreeBlackCrows));
    }

    #[test]
    fn double_bottom_detected() {
        // swing lows at bars 1 and 5 (8.0 and 8.05) around a 12.5 peak
        let bars = vec![
            bar(0, 10.5, 11.0, 10.0, 10.2),
            bar(1, 10.2, 10.4, 8.0, 9.0),
            bar(2, 9.0, 11.0, 8.9, 10.8),
            bar(3, 10.8, 12.5, 10.6, 12.2),
            bar(4, 12.2, 12.3, 10.0, 10.4),
            bar(5, 10.4, 10.5, 8.05, 9.0),
            bar(6, 9.0, 9.8, 8.9, 9.7),
        ];
        let found = detect_patterns(&bars, 60);
        let m = found.iter().find(|m| m.name == PatternKind::DoubleBottom);
        assert_eq!(m.map(|m| m.bar_index), Some(5));
    }

    #[test]
    fn repeated_bars_have_no_matches() {
        let bars: Vec<Bar> = (0..10).map(|i| bar(i, 98.5, 100.3, 98.2, 100.0)).collect();
        assert!(detect_patterns(&bars, 60).is_empty());
    }

    #[test]
    fn empty_input() {
        assert!(detect_patterns(&[], 60).is_empty());
    }
}
