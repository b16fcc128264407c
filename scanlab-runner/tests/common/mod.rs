//! Shared fixtures: an instrumented in-memory provider and a test config.

#![allow(dead_code)]

use chrono::NaiveDate;
use scanlab_core::data::{BarProvider, DataError, RetryPolicy};
use scanlab_core::domain::{Bar, Interval};
use scanlab_runner::{CacheStore, Orchestrator, ScanConfig};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Deterministic provider that records how many calls overlap.
///
/// - `BADTICK` always fails as unauthenticated
/// - `PANIC` panics inside the provider
/// - `down` fails every call
/// - intervals in `dead` fail for anything but the one-bar probe
pub struct Instrumented {
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub down: AtomicBool,
    pub dead: Mutex<Vec<Interval>>,
    pub delay: Duration,
}

impl Instrumented {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            down: AtomicBool::new(false),
            dead: Mutex::new(Vec::new()),
            delay,
        }
    }

    pub fn kill(&self, interval: Interval) {
        self.dead.lock().unwrap().push(interval);
    }
}

impl BarProvider for Instrumented {
    fn name(&self) -> &str {
        "instrumented"
    }

    fn get_hist(
        &self,
        symbol: &str,
        _exchange: &str,
        interval: Interval,
        n_bars: usize,
    ) -> Result<Vec<Bar>, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if symbol == "PANIC" {
            panic!("provider exploded");
        }
        if symbol == "BADTICK" {
            return Err(DataError::AuthenticationRequired("no session".into()));
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(DataError::NetworkUnreachable("offline".into()));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if n_bars > 1 && self.dead.lock().unwrap().contains(&interval) {
            return Err(DataError::NetworkUnreachable(format!("{interval} unavailable")));
        }
        Ok(series(symbol, n_bars.min(120)))
    }
}

/// A wavy daily series whose phase depends on the symbol, so scores differ.
pub fn series(symbol: &str, n: usize) -> Vec<Bar> {
    let phase = symbol.bytes().map(f64::from).sum::<f64>() / 10.0;
    let start = NaiveDate::from_ymd_opt(2023, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..n)
        .map(|i| {
            let c = 100.0 + 6.0 * ((i as f64) / 6.0 + phase).sin() + 0.03 * i as f64;
            Bar {
                time: start + chrono::Duration::days(i as i64),
                open: c - 0.2,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 1_000.0 + i as f64,
            }
        })
        .collect()
}

pub fn test_config(cache_dir: &Path) -> ScanConfig {
    ScanConfig {
        cache_dir: cache_dir.to_path_buf(),
        retry: RetryPolicy::immediate(),
        ..ScanConfig::default()
    }
}

pub fn orchestrator(cfg: &ScanConfig, provider: Arc<Instrumented>) -> Orchestrator {
    Orchestrator::new(cfg, Arc::new(CacheStore::new()), provider)
}
