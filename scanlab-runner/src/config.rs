//! Serializable service configuration.
//!
//! Loaded from an optional TOML file, then overridden from the environment.
//! A missing file or missing credentials never fail startup; they only
//! degrade to an unconfigured provider.

use scanlab_core::analysis::AnalyzerConfig;
use scanlab_core::data::{
    BarProvider, ChartApiConfig, ChartApiProvider, CsvDirectoryProvider, RetryPolicy,
    UnconfiguredProvider,
};
use scanlab_core::domain::{default_ranges, RangeSpec};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const ENV_CACHE_DIR: &str = "SCANLAB_CACHE_DIR";
pub const ENV_PROVIDER_URL: &str = "SCANLAB_PROVIDER_URL";
pub const ENV_PROVIDER_TOKEN: &str = "SCANLAB_PROVIDER_TOKEN";
pub const ENV_CSV_DIR: &str = "SCANLAB_CSV_DIR";

/// Name of the whole-cache snapshot inside the cache directory.
pub const SNAPSHOT_FILE: &str = "data_cache.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Upstream bar source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// No upstream: every fetch fails as unavailable, cached data still serves.
    #[default]
    None,
    ChartApi {
        base_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default = "default_symbol_template")]
        symbol_template: String,
    },
    CsvDirectory {
        dir: PathBuf,
    },
}

fn default_symbol_template() -> String {
    "{exchange}:{symbol}".into()
}

/// Settings for the learned overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Range whose cached bundle is paired with explicit labels.
    pub label_range: String,
    /// Range used to derive walk-forward examples from cached bars.
    pub walk_forward_range: String,
    /// Bars ahead used to label a walk-forward example.
    pub horizon: usize,
    /// Bars between consecutive walk-forward examples.
    pub step: usize,
    pub min_examples: usize,
    pub train_fraction: f64,
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            label_range: "1d".into(),
            walk_forward_range: "1y".into(),
            horizon: 5,
            step: 5,
            min_examples: 10,
            train_fraction: 0.8,
            epochs: 400,
            learning_rate: 0.5,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub cache_dir: PathBuf,
    pub default_exchange: String,
    /// Symbols scheduled by an explicit warm-up.
    pub watchlist: Vec<String>,
    pub refresh_interval_secs: u64,
    pub max_concurrent_fetches: usize,
    pub retry: RetryPolicy,
    pub ranges: Vec<RangeSpec>,
    pub analyzer: AnalyzerConfig,
    pub provider: ProviderConfig,
    pub model: ModelConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            cache_dir: env::temp_dir().join("scanlab-cache"),
            default_exchange: "CSEMA".into(),
            watchlist: default_watchlist(),
            refresh_interval_secs: 60,
            max_concurrent_fetches: 3,
            retry: RetryPolicy::default(),
            ranges: default_ranges(),
            analyzer: AnalyzerConfig::default(),
            provider: ProviderConfig::None,
            model: ModelConfig::default(),
        }
    }
}

pub fn default_watchlist() -> Vec<String> {
    [
        "MUT", "AKT", "HPS", "CDM", "ARD", "CIH", "ATW", "CMG", "BCP", "GTM", "TGC",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl ScanConfig {
    /// Parse a config from a TOML string. Missing keys take defaults.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// File (if given) then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Environment wins over the file. A provider URL wins over a CSV directory.
    pub fn apply_env(&mut self) {
        if let Some(dir) = env_opt(ENV_CACHE_DIR) {
            self.cache_dir = PathBuf::from(dir);
        }
        let token = env_opt(ENV_PROVIDER_TOKEN);
        if let Some(base_url) = env_opt(ENV_PROVIDER_URL) {
            let symbol_template = match &self.provider {
                ProviderConfig::ChartApi {
                    symbol_template, ..
                } => symbol_template.clone(),
                _ => default_symbol_template(),
            };
            self.provider = ProviderConfig::ChartApi {
                base_url,
                token,
                symbol_template,
            };
        } else if let Some(dir) = env_opt(ENV_CSV_DIR) {
            self.provider = ProviderConfig::CsvDirectory {
                dir: PathBuf::from(dir),
            };
        } else if let (Some(t), ProviderConfig::ChartApi { token, .. }) =
            (token, &mut self.provider)
        {
            *token = Some(t);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_fetches must be at least 1".into(),
            ));
        }
        if self.ranges.is_empty() {
            return Err(ConfigError::Invalid("at least one range is required".into()));
        }
        if !(0.0..1.0).contains(&self.model.train_fraction) || self.model.train_fraction == 0.0 {
            return Err(ConfigError::Invalid(format!(
                "model.train_fraction must be in (0, 1), got {}",
                self.model.train_fraction
            )));
        }
        Ok(())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.cache_dir.join(SNAPSHOT_FILE)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    /// Build the configured provider. Nothing here touches the network, so it
    /// is safe to call from inside the runtime.
    pub fn build_provider(&self) -> Arc<dyn BarProvider> {
        match &self.provider {
            ProviderConfig::None => {
                tracing::warn!("no data provider configured; serving cached data only");
                Arc::new(UnconfiguredProvider)
            }
            ProviderConfig::ChartApi {
                base_url,
                token,
                symbol_template,
            } => {
                let mut api = ChartApiConfig::new(base_url.clone());
                api.token = token.clone();
                api.symbol_template = symbol_template.clone();
                Arc::new(ChartApiProvider::new(api))
            }
            ProviderConfig::CsvDirectory { dir } => Arc::new(CsvDirectoryProvider::new(dir)),
        }
    }
}
