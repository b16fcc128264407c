//! Error types for the runner layer.

use std::path::PathBuf;
use thiserror::Error;

/// Snapshot, label and model files. Callers log these and keep running
/// on in-memory state.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed json in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PersistenceError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Structured failure of a request-facing operation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    /// The symbol or range is not present. A client condition, not a fault.
    #[error("not found: {0}")]
    NotFound(String),

    /// Upstream could not provide data and nothing is cached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ServiceError {
    /// Short machine-readable kind, used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::Analysis(_) => "analysis",
            ServiceError::InvalidRequest(_) => "invalid_request",
        }
    }
}
