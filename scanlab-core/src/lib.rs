//! ScanLab Core: bars, indicators, signal analysis and rescoring, bar acquisition.
//!
//! This crate is synchronous and holds no shared state:
//! - Domain types (bars, intervals, range labels)
//! - Indicators (EMA, RSI, MACD, retracement levels) and the chart-pattern battery
//! - Signal analyzer producing an indicator bundle with a composite score
//! - Signal filter that drops disabled sub-signals and rescores
//! - Bar providers and the retrying bar fetcher

pub mod analysis;
pub mod data;
pub mod domain;
pub mod indicators;
pub mod patterns;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the runner moves across tasks is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::RangeSpec>();
        require_sync::<domain::RangeSpec>();

        require_send::<analysis::Analysis>();
        require_sync::<analysis::Analysis>();
        require_send::<analysis::Analyzer>();
        require_sync::<analysis::Analyzer>();
        require_send::<analysis::SignalSet>();
        require_sync::<analysis::SignalSet>();

        require_send::<data::BarFetcher<std::sync::Arc<dyn data::BarProvider>>>();
        require_sync::<data::BarFetcher<std::sync::Arc<dyn data::BarProvider>>>();
        require_send::<data::DataError>();
    }

    /// Architecture contract: the filter cannot see raw bars.
    ///
    /// Rescoring works only from an existing bundle, never by re-running analysis.
    #[test]
    fn filter_takes_no_bars() {
        fn _check(a: &analysis::Analysis, s: analysis::SignalSet) -> analysis::Analysis {
            analysis::filter(a, s)
        }
    }
}
