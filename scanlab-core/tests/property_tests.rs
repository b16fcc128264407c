//! Property tests for the scoring pipeline.
//!
//! Uses proptest to verify:
//! 1. Idempotent rescoring: filtering with every signal enabled reproduces the analyzer score
//! 2. Absent means disabled: a disabled sub-signal never appears in the filtered JSON
//! 3. Clamping: the composite score lies in [0, 1] for any combination of readings
//! 4. Failed analyses pass through the filter untouched

use chrono::NaiveDate;
use proptest::prelude::*;
use scanlab_core::analysis::{
    composite_score, filter, Analysis, Analyzer, Direction, FibLevel, FibonacciSignal,
    IndicatorBundle, MacdSignal, SignalSet, Trend,
};
use scanlab_core::domain::Bar;
use scanlab_core::patterns::{Bias, PatternKind, PatternMatch};

// ── Strategies (proptest) ────────────────────────────────────────────

/// Random-walk bars with plausible OHLC around each close.
fn arb_bars() -> impl Strategy<Value = Vec<Bar>> {
    (5usize..160, 20.0..500.0_f64)
        .prop_flat_map(|(n, start)| {
            (
                Just(start),
                prop::collection::vec((-0.04..0.04_f64, 0.0..0.02_f64, 0.0..0.02_f64), n),
            )
        })
        .prop_map(|(start, steps)| {
            let base = NaiveDate::from_ymd_opt(2023, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap();
            let mut close = start;
            steps
                .into_iter()
                .enumerate()
                .map(|(i, (ret, up, down))| {
                    let open = close;
                    close = (close * (1.0 + ret)).max(0.01);
                    Bar {
                        time: base + chrono::Duration::days(i as i64),
                        open,
                        high: open.max(close) * (1.0 + up),
                        low: open.min(close) * (1.0 - down),
                        close,
                        volume: 1000.0,
                    }
                })
                .collect()
        })
}

fn arb_signal_set() -> impl Strategy<Value = SignalSet> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(rsi, macd, fibonacci, patterns)| SignalSet {
            rsi,
            macd,
            fibonacci,
            patterns,
        },
    )
}

fn arb_trend() -> impl Strategy<Value = Trend> {
    prop_oneof![Just(Trend::Bull), Just(Trend::Bear), Just(Trend::Flat)]
}

/// Arbitrary sub-signal readings, each possibly absent.
fn arb_bundle() -> impl Strategy<Value = IndicatorBundle> {
    (
        prop::option::of(0.0..=100.0_f64),
        prop::option::of(any::<bool>()),
        prop::option::of(any::<bool>()),
        prop::option::of(0usize..4),
        arb_trend(),
    )
        .prop_map(|(rsi, cross, at_level, n_patterns, trend)| {
            let mut b = IndicatorBundle {
                rsi,
                macd: cross.map(|macd_cross| MacdSignal {
                    macd: 0.1,
                    signal: 0.0,
                    histogram: 0.1,
                    macd_cross,
                    direction: Direction::Bullish,
                }),
                fibonacci: at_level.map(|at_level| FibonacciSignal {
                    swing_high: 120.0,
                    swing_low: 80.0,
                    levels: vec![FibLevel {
                        ratio: 0.5,
                        price: 100.0,
                    }],
                    at_level,
                    nearest_ratio: Some(0.5),
                }),
                patterns: n_patterns.map(|k| {
                    (0..k)
                        .map(|i| PatternMatch {
                            name: PatternKind::Doji,
                            bias: Bias::Neutral,
                            bar_index: i,
                        })
                        .collect()
                }),
                trend,
                score: 0.0,
            };
            b.score = composite_score(&b);
            b
        })
}

// ── 1. Idempotent rescoring ──────────────────────────────────────────

proptest! {
    /// filter(analyze(rows), ALL) has exactly the analyzer's score.
    #[test]
    fn full_filter_reproduces_score(bars in arb_bars()) {
        let analysis = Analyzer::default().analyze(&bars, "1m");
        let filtered = filter(&analysis, SignalSet::ALL);
        prop_assert_eq!(&filtered, &analysis);
        if let (Some(a), Some(b)) = (analysis.score(), filtered.score()) {
            prop_assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    /// Filtering twice with the same flags changes nothing the second time.
    #[test]
    fn filter_is_idempotent(bundle in arb_bundle(), set in arb_signal_set()) {
        let once = filter(&Analysis::Ready(bundle), set);
        let twice = filter(&once, set);
        prop_assert_eq!(once, twice);
    }
}

// ── 2. Absent means disabled ─────────────────────────────────────────

proptest! {
    #[test]
    fn disabled_keys_never_serialized(bars in arb_bars(), set in arb_signal_set()) {
        let analysis = Analyzer::default().analyze(&bars, "6m");
        let json = serde_json::to_value(filter(&analysis, set)).unwrap();
        let obj = json.as_object().unwrap();
        if obj.contains_key("error") {
            return Ok(());
        }
        prop_assert_eq!(obj.contains_key("rsi"), set.rsi);
        prop_assert_eq!(obj.contains_key("macd"), set.macd);
        prop_assert_eq!(obj.contains_key("fibonacci"), set.fibonacci);
        prop_assert_eq!(obj.contains_key("patterns"), set.patterns);
        prop_assert!(obj.contains_key("trend"));
        prop_assert!(obj.contains_key("score"));
    }
}

/// All 16 flag combinations over one fixed bundle.
#[test]
fn every_flag_combination_drops_exactly_the_disabled_keys() {
    let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.4).sin() * 8.0).collect();
    let base = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let bars: Vec<Bar> = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar {
            time: base + chrono::Duration::days(i as i64),
            open: c - 0.3,
            high: c + 1.0,
            low: c - 1.2,
            close: c,
            volume: 500.0,
        })
        .collect();
    let analysis = Analyzer::default().analyze(&bars, "1y");
    assert!(analysis.bundle().is_some());

    for mask in 0u8..16 {
        let set = SignalSet {
            rsi: mask & 1 != 0,
            macd: mask & 2 != 0,
            fibonacci: mask & 4 != 0,
            patterns: mask & 8 != 0,
        };
        let json = serde_json::to_value(filter(&analysis, set)).unwrap();
        for (key, on) in [
            ("rsi", set.rsi),
            ("macd", set.macd),
            ("fibonacci", set.fibonacci),
            ("patterns", set.patterns),
        ] {
            assert_eq!(json.get(key).is_some(), on, "mask={mask:04b} key={key}");
        }
    }
}

// ── 3. Clamping ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn score_always_in_unit_interval(bundle in arb_bundle(), set in arb_signal_set()) {
        prop_assert!((0.0..=1.0).contains(&bundle.score));
        let filtered = filter(&Analysis::Ready(bundle), set);
        let score = filtered.score().unwrap();
        prop_assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn analyzer_score_in_unit_interval(bars in arb_bars()) {
        if let Some(score) = Analyzer::default().analyze(&bars, "2y").score() {
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}

// ── 4. Failures pass through ─────────────────────────────────────────

proptest! {
    #[test]
    fn failed_analysis_untouched(msg in "[a-z ]{1,40}", set in arb_signal_set()) {
        let failed = Analysis::failed(msg);
        prop_assert_eq!(filter(&failed, set), failed);
    }
}
