use schema::{CodecError, MigrationError};
use thiserror::Error;

/// Failure of the storage layer itself. Never downgraded to a report entry.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored document for {key} is not valid JSON: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not serialize document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("document structure is invalid: {}", .0.join("; "))]
    Structural(Vec<String>),
    #[error("clip {index} ({clip}) failed validation: {}", .errors.join("; "))]
    ClipValidation {
        index: usize,
        clip: String,
        errors: Vec<String>,
    },
    #[error("asset not found: {path} (clip {clip})")]
    AssetMissing { clip: String, path: String },
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("load cancelled")]
    Cancelled,
}

impl LoadError {
    /// Errors that must reach the caller even when partial loads are allowed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoadError::Persistence(_) | LoadError::Cancelled)
    }
}
