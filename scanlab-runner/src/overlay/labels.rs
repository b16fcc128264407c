//! Append-only outcome label store, keyed by symbol.

use crate::error::PersistenceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeLabel {
    pub symbol: String,
    pub date: String,
    /// -1/0/1 or a continuous return; positive means the trade was good.
    pub outcome: f64,
}

impl OutcomeLabel {
    pub fn is_good(&self) -> bool {
        self.outcome > 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelStore {
    by_symbol: BTreeMap<String, Vec<OutcomeLabel>>,
}

impl LabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a label. Returns the new total.
    pub fn add(&mut self, symbol: &str, date: &str, outcome: f64) -> usize {
        self.by_symbol
            .entry(symbol.to_string())
            .or_default()
            .push(OutcomeLabel {
                symbol: symbol.to_string(),
                date: date.to_string(),
                outcome,
            });
        self.count()
    }

    pub fn count(&self) -> usize {
        self.by_symbol.values().map(Vec::len).sum()
    }

    pub fn for_symbol(&self, symbol: &str) -> &[OutcomeLabel] {
        self.by_symbol.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<OutcomeLabel>)> {
        self.by_symbol.iter()
    }

    /// Missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| PersistenceError::Json {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(PersistenceError::io(path, e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        write_json(path, self)
    }
}

/// Pretty JSON, creating parent directories.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|e| PersistenceError::io(path, e))
}
