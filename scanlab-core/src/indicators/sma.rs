//! Simple Moving Average (SMA) of a series.
//!
//! Rolling mean over a fixed window. First valid value at index period-1.
//! A window holding a NaN yields NaN.

pub fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum: f64 = values[..period].iter().sum();
    let mut nans = values[..period].iter().filter(|v| v.is_nan()).count();
    if nans == 0 {
        result[period - 1] = sum / period as f64;
    }

    for i in period..n {
        let (leaving, entering) = (values[i - period], values[i]);
        nans = nans + usize::from(entering.is_nan()) - usize::from(leaving.is_nan());
        if nans > 0 {
            continue;
        }
        if leaving.is_nan() || entering.is_nan() || sum.is_nan() {
            // window just became clean; rebuild the sum
            sum = values[i + 1 - period..=i].iter().sum();
        } else {
            sum += entering - leaving;
        }
        result[i] = sum / period as f64;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn sma_5_basic() {
        let result = sma_of_series(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0], 5);
        assert!(result[..4].iter().all(|v| v.is_nan()));
        assert_approx(result[4], 12.0, DEFAULT_EPSILON);
        assert_approx(result[5], 13.0, DEFAULT_EPSILON);
        assert_approx(result[6], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_nan_window_then_recovers() {
        let result = sma_of_series(&[10.0, 11.0, f64::NAN, 13.0, 14.0, 15.0], 3);
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
        assert!(result[4].is_nan());
        assert_approx(result[5], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_too_short_or_zero_period() {
        assert!(sma_of_series(&[1.0, 2.0], 5).iter().all(|v| v.is_nan()));
        assert!(sma_of_series(&[1.0, 2.0], 0).iter().all(|v| v.is_nan()));
    }
}
