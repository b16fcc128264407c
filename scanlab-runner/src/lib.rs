//! ScanLab Runner: cache, acquisition orchestration, ML overlay, scan service.
//!
//! This crate builds on `scanlab-core` to provide:
//! - Service configuration (TOML file plus environment overrides)
//! - The shared cache store and its JSON snapshot
//! - The acquisition orchestrator: bounded concurrent fetches, supervised
//!   per-symbol refreshes, the periodic refresh loop
//! - The decision overlay: outcome labels and a logistic outcome model
//! - `ScanService`, the request-facing operations

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod overlay;
pub mod service;
pub mod store;

pub use config::{default_watchlist, ConfigError, ModelConfig, ProviderConfig, ScanConfig};
pub use error::{PersistenceError, ServiceError};
pub use orchestrator::{Orchestrator, RefreshError};
pub use overlay::{
    combined_score, decision_signal, DecisionSignal, LabelStore, LogisticTrainer, ModelInfo,
    OutcomeLabel, OutcomeModel, Prediction, Recommendation, TrainSummary,
};
pub use service::{Reply, ScanService};
pub use store::{CacheEntry, CacheStore, EntryStatus};
