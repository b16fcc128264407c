//! Logistic-regression outcome model.
//!
//! Training examples come from two places:
//! - explicit outcome labels, paired with the symbol's cached bundle for the
//!   label range
//! - walk-forward examples: the analyzer is run on a window of bars ending at
//!   some point, and the example is good when the close `horizon` bars later
//!   is higher
//!
//! Features are standardized with the training means and deviations, which
//! are stored with the weights so prediction sees the same scale.

use super::labels::{write_json, LabelStore};
use super::{CacheSnapshot, ModelInfo, OutcomeModel, Prediction, TrainMetrics, TrainSummary};
use crate::config::ModelConfig;
use crate::error::PersistenceError;
use crate::store::CacheEntry;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use scanlab_core::analysis::{Analysis, Analyzer, AnalyzerConfig, Direction, IndicatorBundle};
use scanlab_core::domain::Bar;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const LABELS_FILE: &str = "labels.json";
pub const MODEL_FILE: &str = "model.json";

pub const N_FEATURES: usize = 7;

pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "rsi",
    "macd_cross",
    "macd_direction",
    "at_level",
    "pattern_count",
    "trend",
    "heuristic_score",
];

/// Bars fed to the analyzer for one walk-forward example.
const WALK_FORWARD_WINDOW: usize = 60;

/// Feature vector of a bundle. Disabled sub-signals take neutral values.
pub fn features(bundle: &IndicatorBundle) -> [f64; N_FEATURES] {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    let direction = match bundle.macd.as_ref().map(|m| m.direction) {
        Some(Direction::Bullish) => 1.0,
        Some(Direction::Bearish) => -1.0,
        None => 0.0,
    };
    [
        bundle
            .rsi
            .filter(|r| r.is_finite())
            .map_or(0.5, |r| r / 100.0),
        flag(bundle.macd_cross()),
        direction,
        flag(bundle.at_level()),
        bundle.patterns.as_ref().map_or(0.0, |p| p.len() as f64),
        bundle.trend.as_feature(),
        bundle.score,
    ]
}

#[derive(Debug, Clone, PartialEq)]
struct Example {
    x: [f64; N_FEATURES],
    good: bool,
}

/// Fitted weights plus the standardization they were fitted under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    pub trained_at: DateTime<Utc>,
    pub metrics: TrainMetrics,
}

impl LogisticModel {
    /// P(good) for a raw feature vector.
    pub fn probability(&self, x: &[f64; N_FEATURES]) -> f64 {
        let z = x
            .iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .zip(&self.weights)
            .map(|(((v, m), s), w)| (v - m) / s * w)
            .sum::<f64>()
            + self.bias;
        sigmoid(z)
    }

    fn is_well_formed(&self) -> bool {
        self.weights.len() == N_FEATURES
            && self.mean.len() == N_FEATURES
            && self.scale.len() == N_FEATURES
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Label store, model and training settings, optionally backed by a directory.
pub struct LogisticTrainer {
    config: ModelConfig,
    analyzer: Analyzer,
    labels: LabelStore,
    model: Option<LogisticModel>,
    dir: Option<PathBuf>,
}

impl LogisticTrainer {
    /// In-memory trainer with no labels and no model.
    pub fn new(config: ModelConfig, analyzer: AnalyzerConfig) -> Self {
        Self {
            config,
            analyzer: Analyzer::new(analyzer),
            labels: LabelStore::new(),
            model: None,
            dir: None,
        }
    }

    /// Trainer persisted under `dir`. Unreadable files are logged and ignored.
    pub fn open(dir: &Path, config: ModelConfig, analyzer: AnalyzerConfig) -> Self {
        let mut trainer = Self::new(config, analyzer);
        trainer.dir = Some(dir.to_path_buf());

        match LabelStore::load(&dir.join(LABELS_FILE)) {
            Ok(labels) => trainer.labels = labels,
            Err(e) => tracing::warn!(error = %e, "outcome labels unreadable; starting empty"),
        }
        match load_model(&dir.join(MODEL_FILE)) {
            Ok(Some(model)) if model.is_well_formed() => trainer.model = Some(model),
            Ok(Some(_)) => tracing::warn!("stored model has the wrong shape; ignoring it"),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "stored model unreadable; ignoring it"),
        }
        tracing::info!(
            labels = trainer.labels.count(),
            model = trainer.model.is_some(),
            "overlay loaded"
        );
        trainer
    }

    pub fn labels(&self) -> &LabelStore {
        &self.labels
    }

    pub fn model(&self) -> Option<&LogisticModel> {
        self.model.as_ref()
    }

    fn labeled_examples(&self, cache: &CacheSnapshot) -> Vec<Example> {
        let mut out = Vec::new();
        for (symbol, labels) in self.labels.iter() {
            let Some(bundle) = cache
                .get(symbol)
                .and_then(|e| self.bundle_for(e, &self.config.label_range))
            else {
                continue;
            };
            let x = features(&bundle);
            out.extend(labels.iter().map(|l| Example {
                x,
                good: l.is_good(),
            }));
        }
        out
    }

    /// Cached bundle for the range, else a fresh analysis of its rows.
    fn bundle_for(&self, entry: &CacheEntry, range: &str) -> Option<IndicatorBundle> {
        if let Some(Analysis::Ready(b)) = entry.analysis.get(range) {
            return Some(b.clone());
        }
        let rows = entry.rows(range)?;
        self.analyzer.try_analyze(rows).ok()
    }

    fn walk_forward_examples(&self, cache: &CacheSnapshot) -> Vec<Example> {
        let mut symbols: Vec<&String> = cache.keys().collect();
        symbols.sort();
        symbols
            .par_iter()
            .filter_map(|s| cache.get(*s)?.rows(&self.config.walk_forward_range))
            .flat_map_iter(|rows| self.walk_forward(rows))
            .collect()
    }

    fn walk_forward(&self, rows: &[Bar]) -> Vec<Example> {
        let horizon = self.config.horizon.max(1);
        let first = self.analyzer.config().min_rows.max(1);
        if rows.len() < first + horizon {
            return Vec::new();
        }
        (first..=rows.len() - horizon)
            .step_by(self.config.step.max(1))
            .filter_map(|end| {
                let now = rows[end - 1].close;
                let later = rows[end - 1 + horizon].close;
                if !(now.is_finite() && later.is_finite()) {
                    return None;
                }
                let window = &rows[end.saturating_sub(WALK_FORWARD_WINDOW)..end];
                let bundle = self.analyzer.try_analyze(window).ok()?;
                Some(Example {
                    x: features(&bundle),
                    good: later > now,
                })
            })
            .collect()
    }

    fn fit(&self, mut examples: Vec<Example>, labeled: usize) -> LogisticModel {
        let n = examples.len();
        examples.shuffle(&mut StdRng::seed_from_u64(self.config.seed));

        let n_train = ((n as f64 * self.config.train_fraction).round() as usize).clamp(1, n - 1);
        let (train, test) = examples.split_at(n_train);

        let mut mean = vec![0.0; N_FEATURES];
        let mut scale = vec![0.0; N_FEATURES];
        for ex in train {
            for (m, v) in mean.iter_mut().zip(ex.x) {
                *m += v / n_train as f64;
            }
        }
        for ex in train {
            for ((s, m), v) in scale.iter_mut().zip(&mean).zip(ex.x) {
                *s += (v - m).powi(2) / n_train as f64;
            }
        }
        for s in scale.iter_mut() {
            *s = if *s > 1e-12 { s.sqrt() } else { 1.0 };
        }

        let mut model = LogisticModel {
            weights: vec![0.0; N_FEATURES],
            bias: 0.0,
            mean,
            scale,
            trained_at: Utc::now(),
            metrics: TrainMetrics {
                n_train,
                n_test: test.len(),
                train_accuracy: 0.0,
                test_accuracy: 0.0,
                positive_rate: examples.iter().filter(|e| e.good).count() as f64 / n as f64,
                labeled_examples: labeled,
                walk_forward_examples: n - labeled,
            },
        };

        let standardized: Vec<([f64; N_FEATURES], f64)> = train
            .iter()
            .map(|ex| {
                let mut z = [0.0; N_FEATURES];
                for (i, v) in z.iter_mut().enumerate() {
                    *v = (ex.x[i] - model.mean[i]) / model.scale[i];
                }
                (z, if ex.good { 1.0 } else { 0.0 })
            })
            .collect();

        for _ in 0..self.config.epochs {
            let mut grad_w = [0.0; N_FEATURES];
            let mut grad_b = 0.0;
            for (z, y) in &standardized {
                let p = sigmoid(
                    z.iter()
                        .zip(&model.weights)
                        .map(|(v, w)| v * w)
                        .sum::<f64>()
                        + model.bias,
                );
                let err = p - y;
                for (g, v) in grad_w.iter_mut().zip(z) {
                    *g += err * v;
                }
                grad_b += err;
            }
            let step = self.config.learning_rate / n_train as f64;
            for (w, g) in model.weights.iter_mut().zip(grad_w) {
                *w -= step * g;
            }
            model.bias -= step * grad_b;
        }

        model.metrics.train_accuracy = accuracy(&model, train);
        model.metrics.test_accuracy = accuracy(&model, test);
        model
    }

    fn persist_labels(&self) {
        if let Some(dir) = &self.dir {
            if let Err(e) = self.labels.save(&dir.join(LABELS_FILE)) {
                tracing::error!(error = %e, "failed to save outcome labels");
            }
        }
    }

    fn persist_model(&self) {
        if let (Some(dir), Some(model)) = (&self.dir, &self.model) {
            if let Err(e) = write_json(&dir.join(MODEL_FILE), model) {
                tracing::error!(error = %e, "failed to save model");
            }
        }
    }
}

fn accuracy(model: &LogisticModel, examples: &[Example]) -> f64 {
    if examples.is_empty() {
        return 0.0;
    }
    let hits = examples
        .iter()
        .filter(|ex| (model.probability(&ex.x) >= 0.5) == ex.good)
        .count();
    hits as f64 / examples.len() as f64
}

fn load_model(path: &Path) -> Result<Option<LogisticModel>, PersistenceError> {
    match std::fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| PersistenceError::Json {
                path: path.to_path_buf(),
                source,
            }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PersistenceError::io(path, e)),
    }
}

impl OutcomeModel for LogisticTrainer {
    fn train(&mut self, cache: &CacheSnapshot) -> TrainSummary {
        let mut examples = self.labeled_examples(cache);
        let labeled = examples.len();
        examples.extend(self.walk_forward_examples(cache));

        let n = examples.len();
        let min = self.config.min_examples.max(2);
        if n < min {
            tracing::info!(examples = n, min, "not enough examples to train");
            return TrainSummary {
                trained: false,
                reason: Some(format!("need at least {min} examples, have {n}")),
                examples: n,
                metrics: None,
            };
        }

        let model = self.fit(examples, labeled);
        tracing::info!(
            examples = n,
            train_accuracy = model.metrics.train_accuracy,
            test_accuracy = model.metrics.test_accuracy,
            "model trained"
        );
        let metrics = model.metrics.clone();
        self.model = Some(model);
        self.persist_model();

        TrainSummary {
            trained: true,
            reason: None,
            examples: n,
            metrics: Some(metrics),
        }
    }

    fn predict(&self, bundle: &IndicatorBundle) -> Prediction {
        let Some(model) = &self.model else {
            return Prediction::neutral();
        };
        let p = model.probability(&features(bundle));
        if !p.is_finite() {
            return Prediction::neutral();
        }
        Prediction {
            prediction: Some(u8::from(p >= 0.5)),
            confidence: p.max(1.0 - p),
            probability_good: p,
            model_available: true,
        }
    }

    fn add_label(&mut self, symbol: &str, date: &str, outcome: f64) -> usize {
        let total = self.labels.add(symbol, date, outcome);
        self.persist_labels();
        total
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_available: self.model.is_some(),
            trained_at: self.model.as_ref().map(|m| m.trained_at),
            metrics: self.model.as_ref().map(|m| m.metrics.clone()),
            features: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            label_count: self.labels.count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CacheEntry, EntryStatus};
    use chrono::NaiveDate;
    use scanlab_core::analysis::Trend;
    use std::collections::BTreeMap;

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                time: start + chrono::Duration::days(i as i64),
                open: c,
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 1_000.0,
            })
            .collect()
    }

    fn entry_with(range: &str, rows: Vec<Bar>) -> CacheEntry {
        let mut data = BTreeMap::new();
        data.insert(range.to_string(), rows);
        CacheEntry {
            status: EntryStatus::Ok,
            data,
            ..CacheEntry::placeholder("CSEMA")
        }
    }

    fn wavy(n: usize, phase: f64) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + 8.0 * ((i as f64 + phase) / 7.0).sin() + i as f64 * 0.05)
            .collect()
    }

    fn cache() -> CacheSnapshot {
        let mut cache = CacheSnapshot::new();
        cache.insert("ATW".into(), entry_with("1y", bars(&wavy(200, 0.0))));
        cache.insert("GTM".into(), entry_with("1y", bars(&wavy(200, 3.0))));
        cache
    }

    fn trainer() -> LogisticTrainer {
        LogisticTrainer::new(ModelConfig::default(), AnalyzerConfig::default())
    }

    fn flat_bundle() -> IndicatorBundle {
        IndicatorBundle {
            rsi: None,
            macd: None,
            fibonacci: None,
            patterns: None,
            trend: Trend::Flat,
            score: 0.5,
        }
    }

    #[test]
    fn disabled_signals_map_to_neutral_features() {
        assert_eq!(features(&flat_bundle()), [0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn untrained_predicts_neutral() {
        let t = trainer();
        assert_eq!(t.predict(&flat_bundle()), Prediction::neutral());
        let info = t.model_info();
        assert!(!info.model_available);
        assert_eq!(info.features.len(), N_FEATURES);
    }

    #[test]
    fn too_few_examples_is_reported_not_trained() {
        let mut t = trainer();
        let summary = t.train(&CacheSnapshot::new());
        assert!(!summary.trained);
        assert!(summary.reason.unwrap().contains("at least"));
        assert!(!t.model_info().model_available);
    }

    #[test]
    fn walk_forward_training_produces_model() {
        let mut t = trainer();
        let summary = t.train(&cache());
        assert!(summary.trained, "{summary:?}");
        let metrics = summary.metrics.unwrap();
        assert_eq!(metrics.n_train + metrics.n_test, summary.examples);
        assert_eq!(metrics.labeled_examples, 0);
        assert!((0.0..=1.0).contains(&metrics.test_accuracy));

        let p = t.predict(&flat_bundle());
        assert!(p.model_available);
        assert!(p.prediction.is_some());
        assert!((0.0..=1.0).contains(&p.probability_good));
        assert!(p.confidence >= 0.5);
    }

    #[test]
    fn training_is_deterministic() {
        let mut a = trainer();
        let mut b = trainer();
        a.train(&cache());
        b.train(&cache());
        let (ma, mb) = (a.model().unwrap(), b.model().unwrap());
        assert_eq!(ma.weights, mb.weights);
        assert_eq!(ma.metrics, mb.metrics);
    }

    #[test]
    fn labels_pair_with_label_range_rows() {
        let mut t = trainer();
        let mut cache = CacheSnapshot::new();
        cache.insert("CIH".into(), entry_with("1d", bars(&wavy(40, 1.0))));
        for day in 1..=12 {
            let outcome = if day % 2 == 0 { 1.0 } else { -1.0 };
            t.add_label("CIH", &format!("2024-01-{day:02}"), outcome);
        }
        t.add_label("UNCACHED", "2024-01-01", 1.0);

        let summary = t.train(&cache);
        assert!(summary.trained);
        assert_eq!(summary.metrics.unwrap().labeled_examples, 12);
        assert_eq!(t.model_info().label_count, 13);
    }

    #[test]
    fn open_persists_labels_and_model() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut t = LogisticTrainer::open(dir.path(), ModelConfig::default(), AnalyzerConfig::default());
            assert_eq!(t.add_label("ATW", "2024-02-01", 1.0), 1);
            assert!(t.train(&cache()).trained);
        }
        assert!(dir.path().join(LABELS_FILE).exists());
        assert!(dir.path().join(MODEL_FILE).exists());

        let reopened = LogisticTrainer::open(dir.path(), ModelConfig::default(), AnalyzerConfig::default());
        let info = reopened.model_info();
        assert!(info.model_available);
        assert_eq!(info.label_count, 1);
    }

    #[test]
    fn corrupt_model_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MODEL_FILE), "{\"weights\": 3}").unwrap();
        let t = LogisticTrainer::open(dir.path(), ModelConfig::default(), AnalyzerConfig::default());
        assert!(!t.model_info().model_available);
    }
}
