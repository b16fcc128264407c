//! Acquisition orchestrator.
//!
//! Per-symbol state machine: absent → loading → ok | error, driven by
//! refreshes. At most `max_concurrent_fetches` fetches are in flight across
//! all symbols; further refreshes queue on the gate. Each refresh runs in its
//! own supervised task, so a panic becomes that symbol's `last_error` and
//! nothing else notices. Refreshes of the same symbol are not serialized:
//! the last one to finish wins.

use crate::config::ScanConfig;
use crate::error::PersistenceError;
use crate::store::{CacheStore, EntryStatus};
use chrono::Utc;
use scanlab_core::analysis::{Analysis, Analyzer};
use scanlab_core::data::{BarFetcher, BarProvider, DataError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Upstream(#[from] DataError),
    #[error("refresh task failed: {0}")]
    Task(String),
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<CacheStore>,
    fetcher: Arc<BarFetcher<Arc<dyn BarProvider>>>,
    analyzer: Arc<Analyzer>,
    gate: Arc<Semaphore>,
    snapshot_path: PathBuf,
    default_exchange: String,
}

impl Orchestrator {
    pub fn new(config: &ScanConfig, store: Arc<CacheStore>, provider: Arc<dyn BarProvider>) -> Self {
        let fetcher = BarFetcher::new(provider, config.ranges.clone(), config.retry.clone());
        Self {
            store,
            fetcher: Arc::new(fetcher),
            analyzer: Arc::new(Analyzer::new(config.analyzer.clone())),
            gate: Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
            snapshot_path: config.snapshot_path(),
            default_exchange: config.default_exchange.clone(),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn default_exchange(&self) -> &str {
        &self.default_exchange
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Fetch one symbol and analyze every range it returned, then write the
    /// outcome to the store. Waits on the gate first.
    pub async fn refresh(&self, symbol: &str, exchange: &str) -> Result<usize, RefreshError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| RefreshError::Task(e.to_string()))?;

        let fetcher = Arc::clone(&self.fetcher);
        let analyzer = Arc::clone(&self.analyzer);
        let (sym, exch) = (symbol.to_string(), exchange.to_string());
        let joined = tokio::task::spawn_blocking(move || {
            let data = fetcher.fetch(&sym, &exch)?;
            let analysis: BTreeMap<String, Analysis> = data
                .iter()
                .map(|(label, rows)| (label.clone(), analyzer.analyze(rows, label)))
                .collect();
            Ok::<_, DataError>((data, analysis))
        })
        .await;
        drop(permit);

        let outcome = match joined {
            Ok(Ok(pair)) => Ok(pair),
            Ok(Err(e)) => Err(RefreshError::Upstream(e)),
            Err(e) => Err(RefreshError::Task(join_message(e))),
        };

        match outcome {
            Ok((data, analysis)) => {
                let ranges = data.len();
                self.store
                    .record_success(symbol, exchange, data, analysis, Utc::now())
                    .await;
                tracing::info!(symbol, exchange, ranges, "cache updated");
                Ok(ranges)
            }
            Err(e) => {
                tracing::warn!(symbol, exchange, error = %e, "cache update failed");
                self.store.record_failure(symbol, exchange, e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Refresh in a supervised background task. The handle may be dropped.
    pub fn schedule_refresh(&self, symbol: &str, exchange: &str) -> JoinHandle<()> {
        let this = self.clone();
        let (symbol, exchange) = (symbol.to_string(), exchange.to_string());
        tokio::spawn(async move {
            let worker = {
                let this = this.clone();
                let (symbol, exchange) = (symbol.clone(), exchange.clone());
                tokio::spawn(async move { this.refresh(&symbol, &exchange).await })
            };
            if let Err(e) = worker.await {
                let msg = join_message(e);
                tracing::error!(%symbol, error = %msg, "refresh task aborted");
                this.store
                    .record_failure(&symbol, &exchange, format!("refresh task failed: {msg}"))
                    .await;
            }
        })
    }

    /// First reference to a symbol: install the placeholder and schedule one
    /// refresh. `None` when the symbol was already known.
    pub async fn ensure_symbol(&self, symbol: &str, exchange: &str) -> Option<JoinHandle<()>> {
        if self.store.install_placeholder(symbol, exchange).await {
            tracing::debug!(symbol, exchange, "new symbol scheduled");
            Some(self.schedule_refresh(symbol, exchange))
        } else {
            None
        }
    }

    /// Fetch inline unless the symbol already has a completed attempt.
    /// Entries still `loading` without rows, such as ones restored from a
    /// snapshot taken mid-fetch, are fetched again. Returns whether a fetch ran.
    pub async fn ensure_fetched(&self, symbol: &str, exchange: &str) -> Result<bool, RefreshError> {
        let installed = self.store.install_placeholder(symbol, exchange).await;
        let pending = installed
            || self
                .store
                .get(symbol)
                .await
                .is_some_and(|e| e.status == EntryStatus::Loading && e.data.is_empty());
        if !pending {
            return Ok(false);
        }
        self.refresh(symbol, exchange).await?;
        Ok(true)
    }

    /// Schedule every symbol of `symbols` not yet cached.
    pub async fn warm_up(&self, symbols: &[String], exchange: &str) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for symbol in symbols {
            if let Some(h) = self.ensure_symbol(symbol, exchange).await {
                handles.push(h);
            }
        }
        tracing::info!(requested = symbols.len(), scheduled = handles.len(), "warm-up");
        handles
    }

    /// Schedule a refresh of every known symbol on its own exchange.
    pub async fn refresh_all(&self) -> Vec<JoinHandle<()>> {
        let targets: Vec<(String, String)> = self
            .store
            .read_all(|entries| {
                entries
                    .iter()
                    .map(|(s, e)| (s.clone(), e.exchange.clone()))
                    .collect()
            })
            .await;
        targets
            .into_iter()
            .map(|(symbol, exchange)| {
                let exchange = if exchange.is_empty() {
                    self.default_exchange.clone()
                } else {
                    exchange
                };
                self.schedule_refresh(&symbol, &exchange)
            })
            .collect()
    }

    /// One loop iteration: schedule everything, then persist the snapshot.
    /// The snapshot does not wait for the refreshes it just scheduled.
    pub async fn run_cycle(&self) -> Vec<JoinHandle<()>> {
        let handles = self.refresh_all().await;
        self.persist().await;
        handles
    }

    /// Load the snapshot (best-effort) and refresh everything it held.
    pub async fn startup(&self) -> Vec<JoinHandle<()>> {
        match self.store.load_from_disk(&self.snapshot_path).await {
            Ok(n) => tracing::info!(symbols = n, "startup: cache restored"),
            Err(e) => tracing::warn!(error = %e, "startup: cache snapshot unreadable"),
        }
        self.refresh_all().await
    }

    /// Save the snapshot, logging rather than returning failure.
    pub async fn persist(&self) {
        if let Err(e) = self.try_persist().await {
            tracing::error!(error = %e, "failed to save cache to disk");
        }
    }

    pub async fn try_persist(&self) -> Result<(), PersistenceError> {
        self.store.save_to_disk(&self.snapshot_path).await
    }

    /// Periodic full refresh, forever. The first cycle runs one `period` after
    /// the call, since startup already scheduled everything once.
    pub fn spawn_refresh_loop(&self, period: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let scheduled = this.run_cycle().await.len();
                tracing::debug!(scheduled, "refresh cycle");
            }
        })
    }
}

fn join_message(e: JoinError) -> String {
    if e.is_cancelled() {
        return "cancelled".into();
    }
    match e.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".into()),
        Err(e) => e.to_string(),
    }
}
