//! Versioned, seconds-indexed persisted form of a [`timeline::Timeline`].
//!
//! The current shape is `2.0` (flat clip list). Legacy `1.0` documents nest
//! frame-indexed clips under tracks and are upgraded by [`migrate`].

use serde_json::Value;
use std::fmt;
use thiserror::Error;
use timeline::TimelineError;

mod codec;
pub use codec::*;
mod document;
pub use document::*;
mod migrate;
pub use migrate::*;
mod validate;
pub use validate::*;

pub const CURRENT_VERSION: &str = "2.0";
pub const LEGACY_VERSION: &str = "1.0";

pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_CHANNELS: u16 = 2;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported document version {found} (expected 2.0)")]
    UnsupportedVersion { found: String },
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

#[derive(Debug, Error, PartialEq)]
pub enum MigrationError {
    #[error("legacy document is malformed: {0}")]
    Malformed(String),
    #[error("legacy frame rate must be a positive number, got {0}")]
    InvalidFrameRate(f64),
}

/// Schema versions this crate knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaVersion {
    V1,
    V2,
}

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion::V2;

    pub fn as_str(self) -> &'static str {
        match self {
            SchemaVersion::V1 => LEGACY_VERSION,
            SchemaVersion::V2 => CURRENT_VERSION,
        }
    }

    pub fn parse(version: &str) -> Option<Self> {
        match version {
            LEGACY_VERSION => Some(SchemaVersion::V1),
            CURRENT_VERSION => Some(SchemaVersion::V2),
            _ => None,
        }
    }

    pub fn is_current(self) -> bool {
        self == Self::CURRENT
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectedVersion {
    Known(SchemaVersion),
    Unknown(String),
}

impl DetectedVersion {
    pub fn label(&self) -> String {
        match self {
            DetectedVersion::Known(v) => v.to_string(),
            DetectedVersion::Unknown(v) => v.clone(),
        }
    }
}

/// Reads the `version` tag of a raw document.
///
/// A document without a tag predates versioning and is treated as `1.0`.
pub fn detect_version(raw: &Value) -> DetectedVersion {
    match raw.get("version") {
        None | Some(Value::Null) => DetectedVersion::Known(SchemaVersion::V1),
        Some(Value::String(s)) => SchemaVersion::parse(s)
            .map(DetectedVersion::Known)
            .unwrap_or_else(|| DetectedVersion::Unknown(s.clone())),
        Some(other) => DetectedVersion::Unknown(other.to_string()),
    }
}
