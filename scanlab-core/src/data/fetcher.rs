//! Bar fetcher: probe, then every configured range with bounded retry.
//!
//! A failed probe fails the whole symbol fast. A range that still fails after
//! its retries (or comes back empty) is omitted; partial results are normal.

use super::provider::{BarProvider, DataError};
use crate::domain::{normalize_rows, Bar, Interval, RangeSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Range label → time-ascending rows, one entry per range that succeeded.
pub type RangeData = BTreeMap<String, Vec<Bar>>;

/// Retry budget for upstream calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Tries per range.
    pub attempts: u32,
    /// Tries for the one-bar probe.
    pub probe_attempts: u32,
    /// Delay after failed try `k` (0-based) is `backoff_base * 2^k`.
    #[serde(with = "duration_secs")]
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            probe_attempts: 2,
            backoff_base: Duration::from_millis(1500),
        }
    }
}

impl RetryPolicy {
    /// Same budget, no sleeping. For tests and offline providers.
    pub fn immediate() -> Self {
        Self {
            backoff_base: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }
}

pub struct BarFetcher<P> {
    provider: P,
    ranges: Vec<RangeSpec>,
    policy: RetryPolicy,
}

impl<P: BarProvider> BarFetcher<P> {
    pub fn new(provider: P, ranges: Vec<RangeSpec>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            ranges,
            policy,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn ranges(&self) -> &[RangeSpec] {
        &self.ranges
    }

    /// Interval used by the probe: the shortest configured one.
    fn probe_interval(&self) -> Interval {
        self.ranges
            .iter()
            .map(|r| r.interval)
            .min()
            .unwrap_or(Interval::Minute30)
    }

    /// Fetch every configured range for one symbol.
    ///
    /// Fails with `UpstreamUnavailable` when the provider is not configured
    /// or the probe exhausts its retries. Otherwise returns whatever ranges
    /// produced rows, possibly none.
    pub fn fetch(&self, symbol: &str, exchange: &str) -> Result<RangeData, DataError> {
        if !self.provider.is_available() {
            return Err(DataError::UpstreamUnavailable(format!(
                "provider '{}' is not configured",
                self.provider.name()
            )));
        }

        let probe_interval = self.probe_interval();
        self.with_retry(self.policy.probe_attempts, || {
            self.provider.get_hist(symbol, exchange, probe_interval, 1)
        })
        .map_err(|e| {
            tracing::warn!(symbol, exchange, error = %e, "probe failed");
            match e {
                DataError::UpstreamUnavailable(_) => e,
                other => DataError::UpstreamUnavailable(format!("probe for {symbol}: {other}")),
            }
        })?;

        let mut out = RangeData::new();
        for range in &self.ranges {
            let fetched = self.with_retry(self.policy.attempts, || {
                self.provider
                    .get_hist(symbol, exchange, range.interval, range.n_bars)
            });
            match fetched {
                Ok(rows) if !rows.is_empty() => {
                    out.insert(range.label.clone(), normalize_rows(rows));
                }
                Ok(_) => {
                    tracing::debug!(symbol, range = %range.label, "range returned no rows");
                }
                Err(e) => {
                    tracing::debug!(symbol, range = %range.label, error = %e, "range omitted");
                }
            }
        }

        tracing::info!(symbol, exchange, ranges = out.len(), "fetched");
        Ok(out)
    }

    fn with_retry<T>(
        &self,
        attempts: u32,
        mut call: impl FnMut() -> Result<T, DataError>,
    ) -> Result<T, DataError> {
        let attempts = attempts.max(1);
        let mut attempt = 0;
        loop {
            match call() {
                Ok(v) => return Ok(v),
                Err(e) if attempt + 1 >= attempts => return Err(e),
                Err(e) => {
                    let delay = self.policy.delay(attempt);
                    tracing::debug!(attempt, ?delay, error = %e, "retrying");
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
