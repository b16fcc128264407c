//! CSV directory provider for offline operation.
//!
//! Layout: `{root}/{EXCHANGE}/{SYMBOL}_{interval}.csv` with header
//! `time,open,high,low,close,volume`. Returns the last `n_bars` rows.

use super::provider::{BarProvider, DataError};
use crate::domain::{normalize_rows, Bar, Interval};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CsvRow {
    time: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CsvDirectoryProvider {
    root: PathBuf,
}

impl CsvDirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, symbol: &str, exchange: &str, interval: Interval) -> PathBuf {
        self.root
            .join(exchange.to_ascii_uppercase())
            .join(format!("{}_{interval}.csv", symbol.to_ascii_uppercase()))
    }

    fn read_file(path: &Path) -> Result<Vec<Bar>, DataError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut bars = Vec::new();
        for (line, record) in reader.deserialize::<CsvRow>().enumerate() {
            let row = record?;
            let time = parse_time(&row.time).ok_or_else(|| {
                DataError::ResponseFormatChanged(format!(
                    "{}: bad time '{}' on row {}",
                    path.display(),
                    row.time,
                    line + 1
                ))
            })?;
            bars.push(Bar {
                time,
                open: row.open.unwrap_or(f64::NAN),
                high: row.high.unwrap_or(f64::NAN),
                low: row.low.unwrap_or(f64::NAN),
                close: row.close.unwrap_or(f64::NAN),
                volume: row.volume.unwrap_or(0.0),
            });
        }
        Ok(bars)
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, the `T`-separated form, or a bare date.
fn parse_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl BarProvider for CsvDirectoryProvider {
    fn name(&self) -> &str {
        "csv_directory"
    }

    fn get_hist(
        &self,
        symbol: &str,
        exchange: &str,
        interval: Interval,
        n_bars: usize,
    ) -> Result<Vec<Bar>, DataError> {
        let path = self.path_for(symbol, exchange, interval);
        if !path.exists() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
                exchange: exchange.to_string(),
            });
        }
        let mut bars = normalize_rows(Self::read_file(&path)?);
        if bars.len() > n_bars {
            bars.drain(..bars.len() - n_bars);
        }
        Ok(bars)
    }

    fn is_available(&self) -> bool {
        self.root.is_dir()
    }
}
