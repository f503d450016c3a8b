use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use timeline::{Effect, TrackType, DEFAULT_FRAME_RATE};

use crate::{
    CodecError, CURRENT_VERSION, DEFAULT_CHANNELS, DEFAULT_HEIGHT, DEFAULT_SAMPLE_RATE,
    DEFAULT_WIDTH,
};

/// Schema `2.0` document as stored by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: String,
    pub timeline: TimelineSettings,
    pub clips: Vec<ClipRecord>,
    #[serde(default)]
    pub transitions: Vec<Value>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSettings {
    pub frame_rate: f64,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    /// Seconds; the largest `timeline_end` across clips.
    #[serde(default)]
    pub duration: f64,
}

fn default_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_channels() -> u16 {
    DEFAULT_CHANNELS
}

impl TimelineSettings {
    pub fn new(frame_rate: f64, duration: f64) -> Self {
        Self {
            frame_rate,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            duration,
        }
    }
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_RATE, 0.0)
    }
}

/// One clip, positions in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub file_path: Option<String>,
    pub timeline_start: f64,
    pub timeline_end: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub in_point: f64,
    #[serde(default)]
    pub track: u32,
    #[serde(rename = "type", default)]
    pub clip_type: TrackType,
    #[serde(default)]
    pub effects: Vec<Effect>,
}

/// Bookkeeping that does not affect timeline semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "current_version")]
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrated_from: Option<String>,
}

fn current_version() -> String {
    CURRENT_VERSION.to_string()
}

impl DocumentMetadata {
    pub fn stamped(now: DateTime<Utc>) -> Self {
        Self {
            created_at: Some(now),
            updated_at: Some(now),
            schema_version: current_version(),
            migrated_from: None,
        }
    }
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            created_at: None,
            updated_at: None,
            schema_version: current_version(),
            migrated_from: None,
        }
    }
}

impl Document {
    /// An empty current-version document.
    pub fn empty(frame_rate: f64, now: DateTime<Utc>) -> Self {
        Self {
            version: current_version(),
            timeline: TimelineSettings::new(frame_rate, 0.0),
            clips: Vec::new(),
            transitions: Vec::new(),
            metadata: DocumentMetadata::stamped(now),
        }
    }

    pub fn from_value(raw: Value) -> Result<Self, CodecError> {
        Ok(serde_json::from_value(raw)?)
    }

    pub fn to_value(&self) -> Result<Value, CodecError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Largest `timeline_end` across clips, `0.0` when there are none.
    pub fn max_clip_end(&self) -> f64 {
        self.clips
            .iter()
            .map(|c| c.timeline_end)
            .fold(0.0, f64::max)
    }
}

/// Legacy `1.0` document: frame-indexed clips nested under tracks.
///
/// Clip entries stay untyped; only entries carrying the `_type: "VideoClip"`
/// marker are understood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyDocument {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub frame_rate: Option<f64>,
    #[serde(default)]
    pub tracks: Vec<LegacyTrack>,
    #[serde(default)]
    pub transitions: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyTrack {
    #[serde(default)]
    pub clips: Vec<Value>,
}
