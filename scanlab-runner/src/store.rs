//! Cache store: symbol → cache entry, shared by the orchestrator and the service.
//!
//! - No eviction: the symbol set only grows
//! - A failed refresh touches only `status` and `last_error`
//! - A successful refresh replaces data, analysis and timestamps in full
//! - Snapshots are whole-cache JSON; writes are atomic (write to .tmp, rename into place)
//! - Restore merges: entries already in memory win

use crate::error::PersistenceError;
use chrono::{DateTime, Utc};
use scanlab_core::analysis::Analysis;
use scanlab_core::data::RangeData;
use scanlab_core::domain::Bar;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Loading,
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub status: EntryStatus,
    /// Exchange the symbol was requested on; periodic refreshes reuse it.
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub data: BTreeMap<String, Vec<Bar>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub analysis: BTreeMap<String, Analysis>,
    #[serde(default)]
    pub analysis_last_updated: BTreeMap<String, DateTime<Utc>>,
}

impl CacheEntry {
    /// Brand-new symbol: empty data, loading.
    pub fn placeholder(exchange: &str) -> Self {
        Self {
            status: EntryStatus::Loading,
            exchange: exchange.to_string(),
            data: BTreeMap::new(),
            last_updated: None,
            last_error: None,
            analysis: BTreeMap::new(),
            analysis_last_updated: BTreeMap::new(),
        }
    }

    pub fn rows(&self, range: &str) -> Option<&[Bar]> {
        self.data.get(range).map(Vec::as_slice)
    }
}

#[derive(Debug, Default)]
pub struct CacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, symbol: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(symbol).cloned()
    }

    pub async fn contains(&self, symbol: &str) -> bool {
        self.entries.read().await.contains_key(symbol)
    }

    /// Known symbols, sorted.
    pub async fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = self.entries.read().await.keys().cloned().collect();
        out.sort();
        out
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Run `f` over every entry under one read lock.
    pub async fn read_all<R>(&self, f: impl FnOnce(&HashMap<String, CacheEntry>) -> R) -> R {
        f(&*self.entries.read().await)
    }

    /// Install a loading placeholder if the symbol is absent. Returns whether it did.
    pub async fn install_placeholder(&self, symbol: &str, exchange: &str) -> bool {
        let mut entries = self.entries.write().await;
        if entries.contains_key(symbol) {
            return false;
        }
        entries.insert(symbol.to_string(), CacheEntry::placeholder(exchange));
        true
    }

    /// Replace the entry with a fresh fetch and its analysis.
    pub async fn record_success(
        &self,
        symbol: &str,
        exchange: &str,
        data: RangeData,
        analysis: BTreeMap<String, Analysis>,
        at: DateTime<Utc>,
    ) {
        let analysis_last_updated = analysis.keys().map(|k| (k.clone(), at)).collect();
        let entry = CacheEntry {
            status: EntryStatus::Ok,
            exchange: exchange.to_string(),
            data,
            last_updated: Some(at),
            last_error: None,
            analysis,
            analysis_last_updated,
        };
        self.entries.write().await.insert(symbol.to_string(), entry);
    }

    /// Mark a refresh failure. Data and analysis are left as they were.
    pub async fn record_failure(&self, symbol: &str, exchange: &str, error: impl Into<String>) {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(symbol.to_string())
            .or_insert_with(|| CacheEntry::placeholder(exchange));
        entry.status = EntryStatus::Error;
        entry.last_error = Some(error.into());
    }

    /// Store one lazily computed bundle. Returns false if the symbol vanished.
    pub async fn store_analysis(&self, symbol: &str, range: &str, analysis: Analysis) -> bool {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(symbol) else {
            return false;
        };
        entry.analysis.insert(range.to_string(), analysis);
        entry
            .analysis_last_updated
            .insert(range.to_string(), Utc::now());
        true
    }

    /// JSON-safe deep copy of the whole cache. Non-finite floats become null.
    pub async fn snapshot(&self) -> Result<serde_json::Value, PersistenceError> {
        let entries = self.entries.read().await;
        Ok(serde_json::to_value(&*entries)?)
    }

    /// Merge a snapshot into the live map. Entries already present are kept;
    /// malformed entries are skipped. Returns how many were added.
    pub async fn restore(&self, snapshot: serde_json::Value) -> usize {
        let serde_json::Value::Object(map) = snapshot else {
            tracing::warn!("snapshot is not a JSON object; ignoring");
            return 0;
        };

        let mut added = 0;
        let mut entries = self.entries.write().await;
        for (symbol, value) in map {
            if entries.contains_key(&symbol) {
                continue;
            }
            match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) => {
                    entries.insert(symbol, entry);
                    added += 1;
                }
                Err(e) => tracing::warn!(%symbol, error = %e, "skipping malformed cache entry"),
            }
        }
        added
    }

    /// Write the snapshot as indented JSON, atomically.
    pub async fn save_to_disk(&self, path: &Path) -> Result<(), PersistenceError> {
        let snapshot = self.snapshot().await?;
        let json = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PersistenceError::io(parent, e))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| PersistenceError::io(&tmp_path, e))?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(PersistenceError::io(path, e));
        }
        tracing::debug!(path = %path.display(), "cache snapshot written");
        Ok(())
    }

    /// Merge the on-disk snapshot. A missing file adds nothing.
    pub async fn load_from_disk(&self, path: &Path) -> Result<usize, PersistenceError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(PersistenceError::io(path, e)),
        };
        let value = serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let added = self.restore(value).await;
        tracing::info!(added, path = %path.display(), "loaded cache snapshot");
        Ok(added)
    }
}
