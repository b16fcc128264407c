//! ADX: Average Directional Index (Wilder), with its +DI and -DI lines.
//!
//! 1. +DM / -DM from consecutive highs and lows
//! 2. Wilder-smooth +DM, -DM and true range
//! 3. +DI = 100 * sm(+DM) / sm(TR), -DI likewise
//! 4. DX = 100 * |+DI - -DI| / (+DI + -DI)
//! 5. ADX = Wilder-smoothed DX
//!
//! Lookback: 2 * period.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    name: String,
}

/// Aligned ADX, +DI and -DI series.
#[derive(Debug, Clone)]
pub struct AdxSeries {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ADX period must be >= 1");
        Self {
            period,
            name: format!("adx_{period}"),
        }
    }

    pub fn compute_all(&self, bars: &[Bar]) -> AdxSeries {
        let n = bars.len();
        let mut out = AdxSeries {
            adx: vec![f64::NAN; n],
            plus_di: vec![f64::NAN; n],
            minus_di: vec![f64::NAN; n],
        };
        if n < 2 {
            return out;
        }

        let mut plus_dm = vec![f64::NAN; n];
        let mut minus_dm = vec![f64::NAN; n];
        for i in 1..n {
            let up = bars[i].high - bars[i - 1].high;
            let down = bars[i - 1].low - bars[i].low;
            if up.is_nan() || down.is_nan() {
                continue;
            }
            plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
            minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
        }

        let tr = wilder_smooth(&true_range(bars), self.period);
        let sm_plus = wilder_smooth(&plus_dm, self.period);
        let sm_minus = wilder_smooth(&minus_dm, self.period);

        let mut dx = vec![f64::NAN; n];
        for i in 0..n {
            if tr[i].is_nan() || sm_plus[i].is_nan() || sm_minus[i].is_nan() || tr[i] == 0.0 {
                continue;
            }
            let pdi = 100.0 * sm_plus[i] / tr[i];
            let mdi = 100.0 * sm_minus[i] / tr[i];
            out.plus_di[i] = pdi;
            out.minus_di[i] = mdi;
            let sum = pdi + mdi;
            dx[i] = if sum == 0.0 {
                0.0
            } else {
                100.0 * (pdi - mdi).abs() / sum
            };
        }

        out.adx = wilder_smooth(&dx, self.period);
        out
    }
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        2 * self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        self.compute_all(bars).adx
    }
}

/// True range; the first bar uses high - low.
fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, b)| {
            let hl = b.high - b.low;
            if i == 0 {
                return hl;
            }
            let prev = bars[i - 1].close;
            hl.max((b.high - prev).abs()).max((b.low - prev).abs())
        })
        .collect()
}

/// Wilder smoothing: seed with the mean of the first `period` valid values,
/// then s[t] = s[t-1] + (x[t] - s[t-1]) / period.
fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return result;
    };
    if period == 0 || n - start < period {
        return result;
    }
    let seed_window = &values[start..start + period];
    if seed_window.iter().any(|v| v.is_nan()) {
        return result;
    }

    let seed_idx = start + period - 1;
    let mut prev = seed_window.iter().sum::<f64>() / period as f64;
    result[seed_idx] = prev;
    for i in seed_idx + 1..n {
        if values[i].is_nan() {
            break;
        }
        prev += (values[i] - prev) / period as f64;
        result[i] = prev;
    }
    result
}
