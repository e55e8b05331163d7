//! Error taxonomy. Nothing here is fatal: callers log and keep the loop alive.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardianError {
    /// A host metric could not be read. The probe substitutes a default.
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// The state file could not be read or written.
    #[error("state file {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The state file exists but is not a valid state document.
    #[error("malformed state document: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The knowledge lookup errored or timed out.
    #[error("lookup failed: {0}")]
    LookupFailure(String),
}

impl GuardianError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GuardianError>;
