//! Request-facing operations over the cache, the analyzer and the overlay.
//!
//! Each operation returns a serializable response or a `ServiceError`. A
//! symbol seen for the first time is scheduled in the background and the
//! caller gets a `Loading` reply instead of waiting, except for
//! `analyze_cached`, which awaits that first refresh.

use crate::config::ScanConfig;
use crate::error::ServiceError;
use crate::orchestrator::Orchestrator;
use crate::overlay::{
    combined_score, decision_signal, DecisionSignal, LogisticTrainer, ModelInfo, OutcomeModel,
    Prediction, TrainSummary,
};
use crate::store::{CacheStore, EntryStatus};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use scanlab_core::analysis::{
    filter, filter_bundle, AdvancedIndicators, Analysis, IndicatorBundle, SignalSet, Trend,
};
use scanlab_core::domain::Bar;
use scanlab_core::patterns::PatternMatch;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Reply for a symbol whose first fetch has not finished yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Loading {
    pub status: EntryStatus,
    pub message: String,
}

impl Loading {
    fn new(message: String) -> Self {
        Self {
            status: EntryStatus::Loading,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply<T> {
    Ready(T),
    Loading(Loading),
}

impl<T> Reply<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Reply::Loading(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Reply::Ready(t) => Some(t),
            Reply::Loading(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataMeta {
    pub symbol: String,
    pub exchange: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub status: EntryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataResponse {
    pub range: String,
    pub rows: Vec<Bar>,
    pub meta: DataMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResponse {
    pub symbol: String,
    pub exchange: String,
    pub range: String,
    pub analysis: Analysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvancedResponse {
    pub symbol: String,
    pub exchange: String,
    pub range: String,
    pub advanced: AdvancedIndicators,
    pub decision: DecisionSignal,
    /// The cached bundle for the range, if one was stored.
    pub basic: Option<Analysis>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRow {
    pub symbol: String,
    pub score: f64,
    pub trend: Trend,
    pub patterns: Vec<PatternMatch>,
    pub rsi: Option<f64>,
    pub macd_cross: Option<bool>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResponse {
    pub range: String,
    pub results: Vec<ScanRow>,
    pub cached_symbols: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MlScanRow {
    pub symbol: String,
    pub score: f64,
    pub ml_prediction: Option<u8>,
    pub ml_confidence: f64,
    pub combined_score: f64,
    pub trend: Trend,
    pub rsi: Option<f64>,
    pub macd_cross: Option<bool>,
    pub patterns: Vec<PatternMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MlScanResponse {
    pub range: String,
    pub results: Vec<MlScanRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarmUpResponse {
    pub status: &'static str,
    pub symbols: usize,
    pub scheduled: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictResponse {
    pub symbol: String,
    pub range: String,
    pub heuristic_score: f64,
    pub heuristic_trend: Trend,
    pub ml_prediction: Option<u8>,
    pub ml_confidence: f64,
    pub ml_available: bool,
    pub combined_score: f64,
    pub ml_details: Prediction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelResponse {
    pub status: &'static str,
    pub symbol: String,
    pub date: String,
    pub outcome: f64,
    pub total_labels: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationResponse {
    pub symbols: Vec<String>,
    pub range: String,
    /// Rows compared per symbol: the shortest series among those with data.
    pub aligned_rows: usize,
    /// Pearson correlation of closes; `null` where a series is constant.
    pub correlation: BTreeMap<String, BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolStatus {
    pub symbol: String,
    pub exchange: String,
    pub status: EntryStatus,
    pub rows: BTreeMap<String, usize>,
    pub analyzed: Vec<String>,
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatusResponse {
    pub symbols: Vec<SymbolStatus>,
}

/// Request-facing façade. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ScanService {
    orchestrator: Orchestrator,
    model: Arc<RwLock<Box<dyn OutcomeModel>>>,
    watchlist: Arc<Vec<String>>,
}

impl ScanService {
    pub fn new(
        orchestrator: Orchestrator,
        model: Box<dyn OutcomeModel>,
        watchlist: Vec<String>,
    ) -> Self {
        Self {
            orchestrator,
            model: Arc::new(RwLock::new(model)),
            watchlist: Arc::new(watchlist),
        }
    }

    /// Wire the configured provider, a fresh store and the on-disk overlay.
    pub fn from_config(config: &ScanConfig) -> Self {
        let store = Arc::new(CacheStore::new());
        let orchestrator = Orchestrator::new(config, store, config.build_provider());
        let trainer = LogisticTrainer::open(
            &config.cache_dir,
            config.model.clone(),
            config.analyzer.clone(),
        );
        Self::new(orchestrator, Box::new(trainer), config.watchlist.clone())
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    fn store(&self) -> &CacheStore {
        self.orchestrator.store()
    }

    /// Cached rows for one range.
    pub async fn data(
        &self,
        symbol: &str,
        exchange: &str,
        range: &str,
    ) -> Result<Reply<DataResponse>, ServiceError> {
        check_symbol(symbol)?;
        self.orchestrator.ensure_symbol(symbol, exchange).await;

        let entry = self
            .store()
            .get(symbol)
            .await
            .ok_or_else(|| not_found(symbol, range))?;
        if entry.status == EntryStatus::Loading {
            return Ok(Reply::Loading(Loading::new(format!(
                "data for {symbol} is being fetched"
            ))));
        }
        let rows = entry.data.get(range).ok_or_else(|| {
            ServiceError::NotFound(format!(
                "invalid range {range} or no data for symbol {symbol}"
            ))
        })?;
        Ok(Reply::Ready(DataResponse {
            range: range.to_string(),
            rows: rows.clone(),
            meta: DataMeta {
                symbol: symbol.to_string(),
                exchange: exchange.to_string(),
                last_updated: entry.last_updated,
                status: entry.status,
            },
        }))
    }

    /// Fresh analysis of the cached rows. The result is not stored.
    pub async fn analyze(
        &self,
        symbol: &str,
        exchange: &str,
        range: &str,
    ) -> Result<Reply<AnalysisResponse>, ServiceError> {
        check_symbol(symbol)?;
        if self.orchestrator.ensure_symbol(symbol, exchange).await.is_some() {
            return Ok(Reply::Loading(Loading::new(format!(
                "analysis for {symbol} will be ready soon"
            ))));
        }
        let entry = self
            .store()
            .get(symbol)
            .await
            .ok_or_else(|| not_found(symbol, range))?;
        let Some(rows) = entry.rows(range) else {
            if entry.status == EntryStatus::Loading {
                return Ok(Reply::Loading(Loading::new(format!(
                    "analysis for {symbol} will be ready soon"
                ))));
            }
            return Err(not_found(symbol, range));
        };

        let analysis = self.orchestrator.analyzer().analyze(rows, range);
        Ok(Reply::Ready(AnalysisResponse {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            range: range.to_string(),
            analysis,
            analysis_last_updated: None,
        }))
    }

    /// Cached bundle for the range, computed and stored on first use, then
    /// filtered down to `signals` and rescored.
    pub async fn analyze_cached(
        &self,
        symbol: &str,
        exchange: &str,
        range: &str,
        signals: SignalSet,
    ) -> Result<Reply<AnalysisResponse>, ServiceError> {
        check_symbol(symbol)?;
        if self.store().install_placeholder(symbol, exchange).await {
            if let Err(e) = self.orchestrator.refresh(symbol, exchange).await {
                tracing::debug!(symbol, error = %e, "first fetch failed");
            }
        }

        let entry = self
            .store()
            .get(symbol)
            .await
            .ok_or_else(|| not_found(symbol, range))?;
        if entry.status == EntryStatus::Error && entry.data.is_empty() {
            return Err(ServiceError::Unavailable(format!(
                "no data available for {symbol}; last error: {}",
                entry.last_error.as_deref().unwrap_or("unknown")
            )));
        }
        let Some(rows) = entry.rows(range) else {
            if entry.status == EntryStatus::Loading {
                return Ok(Reply::Loading(Loading::new(format!(
                    "analysis for {symbol} will be ready soon"
                ))));
            }
            return Err(not_found(symbol, range));
        };

        let reply = |analysis: &Analysis, at: Option<DateTime<Utc>>| {
            Reply::Ready(AnalysisResponse {
                symbol: symbol.to_string(),
                exchange: exchange.to_string(),
                range: range.to_string(),
                analysis: filter(analysis, signals),
                analysis_last_updated: at,
            })
        };

        if let Some(cached) = entry.analysis.get(range) {
            let at = entry.analysis_last_updated.get(range).copied();
            return Ok(reply(cached, at));
        }

        let fresh = self.orchestrator.analyzer().analyze(rows, range);
        self.store().store_analysis(symbol, range, fresh.clone()).await;
        tracing::debug!(symbol, range, "analysis computed on demand");
        Ok(reply(&fresh, None))
    }

    /// Every cached bundle for `range`, filtered and rescored, best first.
    /// Never fetches.
    pub async fn scan(&self, range: &str, signals: SignalSet) -> ScanResponse {
        let results: Vec<ScanRow> = self
            .scan_candidates(range, signals)
            .await
            .into_iter()
            .map(|(symbol, bundle, last_updated)| ScanRow {
                symbol,
                score: bundle.score,
                trend: bundle.trend,
                rsi: bundle.rsi,
                macd_cross: bundle.macd.as_ref().map(|m| m.macd_cross),
                patterns: bundle.patterns.unwrap_or_default(),
                last_updated,
            })
            .collect();
        ScanResponse {
            range: range.to_string(),
            cached_symbols: results.len(),
            results,
        }
    }

    /// `scan` plus the overlay's prediction, ranked by the combined score.
    pub async fn scan_with_ml(&self, range: &str, signals: SignalSet) -> MlScanResponse {
        let candidates = self.scan_candidates(range, signals).await;
        let model = self.model.read().await;
        let mut results: Vec<MlScanRow> = candidates
            .into_iter()
            .map(|(symbol, bundle, _)| {
                let prediction = model.predict(&bundle);
                MlScanRow {
                    symbol,
                    score: bundle.score,
                    ml_prediction: prediction.prediction,
                    ml_confidence: prediction.confidence,
                    combined_score: combined_score(bundle.score, &prediction),
                    trend: bundle.trend,
                    rsi: bundle.rsi,
                    macd_cross: bundle.macd.as_ref().map(|m| m.macd_cross),
                    patterns: bundle.patterns.unwrap_or_default(),
                }
            })
            .collect();
        results.sort_by(|a, b| {
            b.combined_score
                .total_cmp(&a.combined_score)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        MlScanResponse {
            range: range.to_string(),
            results,
        }
    }

    /// Filtered bundles for `range`, sorted by score descending, then symbol.
    /// Failed analyses are skipped.
    async fn scan_candidates(
        &self,
        range: &str,
        signals: SignalSet,
    ) -> Vec<(String, IndicatorBundle, Option<DateTime<Utc>>)> {
        let ready: Vec<(String, IndicatorBundle, Option<DateTime<Utc>>)> = self
            .store()
            .read_all(|entries| {
                entries
                    .iter()
                    .filter_map(|(symbol, entry)| {
                        let bundle = entry.analysis.get(range)?.bundle()?;
                        let at = entry.analysis_last_updated.get(range).copied();
                        Some((symbol.clone(), bundle.clone(), at))
                    })
                    .collect()
            })
            .await;

        let mut out: Vec<_> = ready
            .into_par_iter()
            .map(|(symbol, bundle, at)| (symbol, filter_bundle(&bundle, signals), at))
            .collect();
        out.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then_with(|| a.0.cmp(&b.0)));
        out
    }

    /// Schedule every watch-list symbol not yet cached.
    pub async fn warm_up(&self) -> WarmUpResponse {
        let exchange = self.orchestrator.default_exchange().to_string();
        let scheduled = self.orchestrator.warm_up(&self.watchlist, &exchange).await;
        WarmUpResponse {
            status: "warmup_started",
            symbols: self.watchlist.len(),
            scheduled: scheduled.len(),
        }
    }

    /// Train the overlay on a copy of the cache, off the async workers.
    pub async fn train(&self) -> Result<TrainSummary, ServiceError> {
        let snapshot = self.store().read_all(|entries| entries.clone()).await;
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.blocking_write().train(&snapshot))
            .await
            .map_err(|e| ServiceError::Unavailable(format!("training task failed: {e}")))
    }

    pub async fn model_info(&self) -> ModelInfo {
        self.model.read().await.model_info()
    }

    /// Overlay prediction for the symbol's bundle on `range`. Uses the cached
    /// bundle when there is one, else analyzes the cached rows.
    pub async fn predict(
        &self,
        symbol: &str,
        exchange: &str,
        range: &str,
    ) -> Result<Reply<PredictResponse>, ServiceError> {
        check_symbol(symbol)?;
        if self.orchestrator.ensure_symbol(symbol, exchange).await.is_some() {
            return Ok(Reply::Loading(Loading::new(format!(
                "prediction for {symbol} will be ready soon"
            ))));
        }
        let entry = self
            .store()
            .get(symbol)
            .await
            .ok_or_else(|| not_found(symbol, range))?;
        let analysis = match (entry.analysis.get(range), entry.rows(range)) {
            (Some(cached), _) => cached.clone(),
            (None, Some(rows)) => self.orchestrator.analyzer().analyze(rows, range),
            (None, None) if entry.status == EntryStatus::Loading => {
                return Ok(Reply::Loading(Loading::new(format!(
                    "prediction for {symbol} will be ready soon"
                ))));
            }
            (None, None) => return Err(not_found(symbol, range)),
        };
        let bundle = match analysis {
            Analysis::Ready(b) => b,
            Analysis::Failed { error } => return Err(ServiceError::Analysis(error)),
        };

        let prediction = self.model.read().await.predict(&bundle);
        Ok(Reply::Ready(PredictResponse {
            symbol: symbol.to_string(),
            range: range.to_string(),
            heuristic_score: bundle.score,
            heuristic_trend: bundle.trend,
            ml_prediction: prediction.prediction,
            ml_confidence: prediction.confidence,
            ml_available: prediction.model_available,
            combined_score: combined_score(bundle.score, &prediction),
            ml_details: prediction,
        }))
    }

    /// Record a trade outcome for future training.
    pub async fn label(
        &self,
        symbol: &str,
        date: &str,
        outcome: f64,
    ) -> Result<LabelResponse, ServiceError> {
        check_symbol(symbol)?;
        if date.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("date is required".into()));
        }
        if !outcome.is_finite() {
            return Err(ServiceError::InvalidRequest(format!(
                "outcome must be a finite number, got {outcome}"
            )));
        }
        let model = Arc::clone(&self.model);
        let (sym, day) = (symbol.to_string(), date.to_string());
        // the label file is written while the model is locked
        let total_labels =
            tokio::task::spawn_blocking(move || model.blocking_write().add_label(&sym, &day, outcome))
                .await
                .map_err(|e| ServiceError::Unavailable(format!("labeling task failed: {e}")))?;
        tracing::info!(symbol, date, outcome, total_labels, "outcome labeled");
        Ok(LabelResponse {
            status: "labeled",
            symbol: symbol.to_string(),
            date: date.to_string(),
            outcome,
            total_labels,
        })
    }

    /// Advanced indicators and the rule-based decision for a cached range,
    /// alongside the cached basic bundle. Symbols not in the cache are not
    /// fetched here.
    pub async fn advanced_analysis(
        &self,
        symbol: &str,
        exchange: &str,
        range: &str,
    ) -> Result<AdvancedResponse, ServiceError> {
        check_symbol(symbol)?;
        let entry = self
            .store()
            .get(symbol)
            .await
            .ok_or_else(|| ServiceError::NotFound(format!("{symbol} is not in the cache")))?;
        let rows = entry.rows(range).ok_or_else(|| not_found(symbol, range))?;

        let advanced = self
            .orchestrator
            .analyzer()
            .advanced(rows)
            .map_err(|e| ServiceError::Analysis(e.to_string()))?;
        let decision = decision_signal(&advanced);
        tracing::debug!(symbol, range, recommendation = ?decision.recommendation, "decision signal");

        Ok(AdvancedResponse {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            range: range.to_string(),
            advanced,
            decision,
            basic: entry.analysis.get(range).cloned(),
        })
    }

    /// Pearson correlation of closes across the cached symbols, each series
    /// cut to the tail of the shortest one.
    pub async fn correlation(
        &self,
        symbols: &[String],
        range: &str,
    ) -> Result<CorrelationResponse, ServiceError> {
        let series: Vec<(String, Vec<f64>)> = self
            .store()
            .read_all(|entries| {
                symbols
                    .iter()
                    .filter_map(|s| {
                        let rows = entries.get(s)?.rows(range)?;
                        Some((s.clone(), rows.iter().map(|b| b.close).collect()))
                    })
                    .collect()
            })
            .await;
        let Some(min_len) = series.iter().map(|(_, c)| c.len()).min() else {
            return Err(ServiceError::NotFound(format!(
                "no cached {range} data for any of {}",
                symbols.join(",")
            )));
        };
        let tails: Vec<(&str, &[f64])> = series
            .iter()
            .map(|(s, c)| (s.as_str(), &c[c.len() - min_len..]))
            .collect();

        let correlation: BTreeMap<String, BTreeMap<String, f64>> = tails
            .par_iter()
            .map(|(a, xs)| {
                let row: BTreeMap<String, f64> = tails
                    .iter()
                    .map(|(b, ys)| (b.to_string(), pearson(xs, ys)))
                    .collect();
                (a.to_string(), row)
            })
            .collect();
        Ok(CorrelationResponse {
            symbols: symbols.to_vec(),
            range: range.to_string(),
            aligned_rows: min_len,
            correlation,
        })
    }

    pub async fn cache_status(&self) -> CacheStatusResponse {
        let mut symbols: Vec<SymbolStatus> = self
            .store()
            .read_all(|entries| {
                entries
                    .iter()
                    .map(|(symbol, e)| SymbolStatus {
                        symbol: symbol.clone(),
                        exchange: e.exchange.clone(),
                        status: e.status,
                        rows: e.data.iter().map(|(r, v)| (r.clone(), v.len())).collect(),
                        analyzed: e.analysis.keys().cloned().collect(),
                        last_updated: e.last_updated,
                        last_error: e.last_error.clone(),
                    })
                    .collect()
            })
            .await;
        symbols.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        CacheStatusResponse { symbols }
    }
}

fn check_symbol(symbol: &str) -> Result<(), ServiceError> {
    if symbol.trim().is_empty() {
        return Err(ServiceError::InvalidRequest("symbol is required".into()));
    }
    Ok(())
}

fn not_found(symbol: &str, range: &str) -> ServiceError {
    ServiceError::NotFound(format!("no data for range {range} for {symbol}"))
}

/// NaN when either series is constant or the lengths differ.
fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len();
    if n == 0 || n != ys.len() {
        return f64::NAN;
    }
    let mx = xs.iter().sum::<f64>() / n as f64;
    let my = ys.iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mx, y - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    sxy / (sxx * syy).sqrt()
}
