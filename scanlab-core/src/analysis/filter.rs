//! Signal filter/rescorer.
//!
//! Drops disabled sub-signals from a bundle and recomputes the composite score
//! from what remains. Trend always contributes. Failed analyses pass through.

use super::bundle::{composite_score, Analysis, IndicatorBundle, SignalSet};

/// Filter a bundle down to `enabled` and rescore it.
pub fn filter(analysis: &Analysis, enabled: SignalSet) -> Analysis {
    match analysis {
        Analysis::Failed { .. } => analysis.clone(),
        Analysis::Ready(bundle) => Analysis::Ready(filter_bundle(bundle, enabled)),
    }
}

pub fn filter_bundle(bundle: &IndicatorBundle, enabled: SignalSet) -> IndicatorBundle {
    let mut out = IndicatorBundle {
        rsi: bundle.rsi.filter(|_| enabled.rsi),
        macd: bundle.macd.clone().filter(|_| enabled.macd),
        fibonacci: bundle.fibonacci.clone().filter(|_| enabled.fibonacci),
        patterns: bundle.patterns.clone().filter(|_| enabled.patterns),
        trend: bundle.trend,
        score: 0.0,
    };
    out.score = composite_score(&out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::bundle::{Direction, MacdSignal, Trend};

    fn sample() -> IndicatorBundle {
        let mut b = IndicatorBundle {
            rsi: Some(22.0),
            macd: Some(MacdSignal {
                macd: -0.2,
                signal: -0.3,
                histogram: 0.1,
                macd_cross: true,
                direction: Direction::Bullish,
            }),
            fibonacci: None,
            patterns: Some(vec![]),
            trend: Trend::Flat,
            score: 0.0,
        };
        b.score = composite_score(&b);
        b
    }

    #[test]
    fn failed_passes_through() {
        let failed = Analysis::failed("boom");
        assert_eq!(filter(&failed, SignalSet::ALL), failed);
    }

    #[test]
    fn all_enabled_is_identity() {
        let a = Analysis::Ready(sample());
        assert_eq!(filter(&a, SignalSet::ALL), a);
    }

    #[test]
    fn disabling_rsi_removes_its_contribution() {
        let enabled = SignalSet {
            rsi: false,
            ..SignalSet::ALL
        };
        let out = filter_bundle(&sample(), enabled);
        assert!(out.rsi.is_none());
        // baseline + macd cross only
        assert!((out.score - 0.6).abs() < 1e-12);
    }

    #[test]
    fn nothing_enabled_leaves_baseline_plus_trend() {
        let mut b = sample();
        b.trend = Trend::Bear;
        let none = SignalSet::parse_list("").unwrap();
        let out = filter_bundle(&b, none);
        assert!(out.rsi.is_none() && out.macd.is_none() && out.patterns.is_none());
        assert!((out.score - 0.35).abs() < 1e-12);
    }
}
