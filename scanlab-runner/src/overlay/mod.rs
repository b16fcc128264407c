//! Decision overlay: a rule-based decision signal over the advanced
//! indicators, and an optional learned predictor over indicator bundles.
//!
//! Prediction is always usable. Without a trained model it returns a neutral
//! result and the combined score falls back to the heuristic alone.

pub mod decision;
pub mod labels;
pub mod logistic;

pub use decision::{decision_signal, DecisionSignal, Recommendation};
pub use labels::{LabelStore, OutcomeLabel};
pub use logistic::{LogisticModel, LogisticTrainer, FEATURE_NAMES};

use crate::store::CacheEntry;
use chrono::{DateTime, Utc};
use scanlab_core::analysis::IndicatorBundle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Weight of the heuristic score in the combined score.
pub const HEURISTIC_WEIGHT: f64 = 0.6;
/// Weight of the model's probability in the combined score.
pub const MODEL_WEIGHT: f64 = 0.4;

/// What the trainer sees of the cache.
pub type CacheSnapshot = HashMap<String, CacheEntry>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// 1 = good trade, 0 = bad; `None` without a model.
    pub prediction: Option<u8>,
    pub confidence: f64,
    pub probability_good: f64,
    pub model_available: bool,
}

impl Prediction {
    pub fn neutral() -> Self {
        Self {
            prediction: None,
            confidence: 0.0,
            probability_good: 0.5,
            model_available: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainMetrics {
    pub n_train: usize,
    pub n_test: usize,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub positive_rate: f64,
    pub labeled_examples: usize,
    pub walk_forward_examples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainSummary {
    pub trained: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub examples: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrainMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrainMetrics>,
    pub features: Vec<String>,
    pub label_count: usize,
}

/// Black-box learned predictor.
pub trait OutcomeModel: Send + Sync {
    fn train(&mut self, cache: &CacheSnapshot) -> TrainSummary;

    fn predict(&self, bundle: &IndicatorBundle) -> Prediction;

    /// Append an outcome label. Returns the total label count.
    fn add_label(&mut self, symbol: &str, date: &str, outcome: f64) -> usize;

    fn model_info(&self) -> ModelInfo;
}

/// Blend the heuristic score with a prediction.
pub fn combined_score(heuristic: f64, prediction: &Prediction) -> f64 {
    if prediction.model_available {
        heuristic * HEURISTIC_WEIGHT + prediction.probability_good * MODEL_WEIGHT
    } else {
        heuristic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_prediction_keeps_heuristic() {
        let p = Prediction::neutral();
        assert_eq!(p.prediction, None);
        assert_eq!(p.probability_good, 0.5);
        assert_eq!(combined_score(0.73, &p), 0.73);
    }

    #[test]
    fn available_model_blends() {
        let p = Prediction {
            prediction: Some(1),
            confidence: 0.8,
            probability_good: 0.9,
            model_available: true,
        };
        assert!((combined_score(0.5, &p) - (0.3 + 0.36)).abs() < 1e-12);
    }
}
