//! Data acquisition: provider trait, concrete providers, and the retrying fetcher.

pub mod chart;
pub mod csv_dir;
pub mod fetcher;
pub mod provider;

pub use chart::{ChartApiConfig, ChartApiProvider};
pub use csv_dir::CsvDirectoryProvider;
pub use fetcher::{BarFetcher, RangeData, RetryPolicy};
pub use provider::{BarProvider, DataError, UnconfiguredProvider};
