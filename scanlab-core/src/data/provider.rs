//! Bar provider trait and structured error types.
//!
//! The BarProvider trait abstracts over upstream sources (chart API, CSV
//! directory) so the fetcher can swap implementations and tests can mock them.

use crate::domain::{Bar, Interval};
use std::sync::Arc;
use thiserror::Error;

/// Structured error types for data acquisition.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol} on {exchange}")]
    SymbolNotFound { symbol: String, exchange: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("data error: {0}")]
    Other(String),
}

/// Trait for historical bar sources.
///
/// Implementations make exactly one upstream attempt per call. Retry, backoff
/// and the probe live in the fetcher above this trait.
pub trait BarProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// The most recent `n_bars` bars of `symbol` on `exchange` at `interval`.
    fn get_hist(
        &self,
        symbol: &str,
        exchange: &str,
        interval: Interval,
        n_bars: usize,
    ) -> Result<Vec<Bar>, DataError>;

    /// False when the provider cannot serve anything (e.g. not configured).
    fn is_available(&self) -> bool {
        true
    }
}

impl<P: BarProvider + ?Sized> BarProvider for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get_hist(
        &self,
        symbol: &str,
        exchange: &str,
        interval: Interval,
        n_bars: usize,
    ) -> Result<Vec<Bar>, DataError> {
        (**self).get_hist(symbol, exchange, interval, n_bars)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

/// Stand-in used when no upstream is configured. Every call fails cleanly
/// instead of returning empty data.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredProvider;

impl BarProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    fn get_hist(
        &self,
        _symbol: &str,
        _exchange: &str,
        _interval: Interval,
        _n_bars: usize,
    ) -> Result<Vec<Bar>, DataError> {
        Err(DataError::UpstreamUnavailable(
            "no data provider configured".into(),
        ))
    }

    fn is_available(&self) -> bool {
        false
    }
}
