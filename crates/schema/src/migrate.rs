use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use timeline::{Effect, TrackType, DEFAULT_FRAME_RATE};
use tracing::{debug, info, warn};

use crate::{
    detect_version, ClipRecord, DetectedVersion, Document, DocumentMetadata, LegacyDocument,
    MigrationError, SchemaVersion, TimelineSettings,
};

/// Marker carried by legacy clip entries the editor understood.
pub const LEGACY_CLIP_MARKER: &str = "VideoClip";

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOutcome {
    /// Already current; the document is returned untouched.
    Current,
    Migrated { from: SchemaVersion },
    /// Unrecognised tag; the document is returned untouched.
    UnknownVersion(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    pub document: Value,
    pub outcome: MigrationOutcome,
    pub warnings: Vec<String>,
}

impl Migration {
    pub fn migrated_from(&self) -> Option<SchemaVersion> {
        match self.outcome {
            MigrationOutcome::Migrated { from } => Some(from),
            _ => None,
        }
    }
}

/// Upgrades a raw document to the current schema.
///
/// Current documents and documents with an unknown version come back unchanged;
/// the latter with a warning. `now` stamps the metadata of upgraded documents.
pub fn migrate(raw: Value, now: DateTime<Utc>) -> Result<Migration, MigrationError> {
    let from = match detect_version(&raw) {
        DetectedVersion::Known(version) if version.is_current() => {
            return Ok(Migration {
                document: raw,
                outcome: MigrationOutcome::Current,
                warnings: Vec::new(),
            })
        }
        DetectedVersion::Known(version) => version,
        DetectedVersion::Unknown(version) => {
            warn!(version = %version, "unknown schema version, leaving document as is");
            return Ok(Migration {
                document: raw,
                outcome: MigrationOutcome::UnknownVersion(version.clone()),
                warnings: vec![format!("unknown schema version {version}")],
            });
        }
    };

    info!(from = %from, to = %SchemaVersion::CURRENT, "migrating timeline document");
    let mut warnings = Vec::new();
    let mut document = raw;
    let mut version = from;
    while !version.is_current() {
        let (next, upgraded) = step(version, document, now, &mut warnings)?;
        version = next;
        document = upgraded;
    }
    debug!(warnings = warnings.len(), "migration finished");

    Ok(Migration {
        document,
        outcome: MigrationOutcome::Migrated { from },
        warnings,
    })
}

/// One edge of the upgrade path.
fn step(
    version: SchemaVersion,
    document: Value,
    now: DateTime<Utc>,
    warnings: &mut Vec<String>,
) -> Result<(SchemaVersion, Value), MigrationError> {
    match version {
        SchemaVersion::V1 => {
            let upgraded = v1_to_v2(document, now, warnings)?;
            let value = serde_json::to_value(&upgraded)
                .map_err(|e| MigrationError::Malformed(e.to_string()))?;
            Ok((SchemaVersion::V2, value))
        }
        SchemaVersion::V2 => Ok((SchemaVersion::V2, document)),
    }
}

fn v1_to_v2(
    raw: Value,
    now: DateTime<Utc>,
    warnings: &mut Vec<String>,
) -> Result<Document, MigrationError> {
    let legacy: LegacyDocument =
        serde_json::from_value(raw).map_err(|e| MigrationError::Malformed(e.to_string()))?;

    let frame_rate = legacy.frame_rate.unwrap_or(DEFAULT_FRAME_RATE);
    if !frame_rate.is_finite() || frame_rate <= 0.0 {
        return Err(MigrationError::InvalidFrameRate(frame_rate));
    }

    let mut clips = Vec::new();
    let mut dropped = 0usize;
    for (track_pos, track) in legacy.tracks.iter().enumerate() {
        for (clip_pos, entry) in track.clips.iter().enumerate() {
            let location = format!("track {track_pos} clip {clip_pos}");
            match legacy_clip(entry, frame_rate, &location, warnings) {
                Some(record) => clips.push(record),
                None => dropped += 1,
            }
        }
    }
    if dropped > 0 {
        warn!(dropped, kept = clips.len(), "legacy clips dropped during migration");
    }

    let duration = clips.iter().map(|c| c.timeline_end).fold(0.0, f64::max);
    let mut metadata = DocumentMetadata::stamped(now);
    metadata.migrated_from = Some(SchemaVersion::V1.to_string());

    Ok(Document {
        version: SchemaVersion::V2.to_string(),
        timeline: TimelineSettings::new(frame_rate, duration),
        clips,
        transitions: legacy.transitions,
        metadata,
    })
}

/// Converts one legacy clip entry, or explains in `warnings` why it was dropped.
fn legacy_clip(
    entry: &Value,
    frame_rate: f64,
    location: &str,
    warnings: &mut Vec<String>,
) -> Option<ClipRecord> {
    let Some(obj) = entry.as_object() else {
        warnings.push(format!("{location}: dropped, entry is not an object"));
        return None;
    };
    if obj.get("_type").and_then(Value::as_str) != Some(LEGACY_CLIP_MARKER) {
        warnings.push(format!(
            "{location}: dropped, missing _type marker \"{LEGACY_CLIP_MARKER}\""
        ));
        return None;
    }

    let id = text_field(obj, "clip_id")
        .or_else(|| text_field(obj, "id"))
        .unwrap_or_default();

    let mut frames = [0.0f64; 3];
    for (slot, key) in frames.iter_mut().zip(["start", "end", "in_point"]) {
        match obj.get(key) {
            None | Some(Value::Null) => {}
            Some(v) => match v.as_f64() {
                Some(n) => *slot = n,
                None => {
                    warnings.push(format!("{location}: dropped clip {id}, {key} is not a number"));
                    return None;
                }
            },
        }
    }
    let [start, end, in_point] = frames;

    let clip_type = match text_field(obj, "track_type") {
        None => TrackType::default(),
        Some(name) => match name.parse::<TrackType>() {
            Ok(kind) => kind,
            Err(_) => {
                warnings.push(format!("{location}: dropped clip {id}, unknown track type {name}"));
                return None;
            }
        },
    };

    let track = match obj.get("track_index").and_then(Value::as_i64) {
        Some(index) if index < 0 => {
            warnings.push(format!("{location}: negative track_index {index} set to 0"));
            0
        }
        Some(index) => u32::try_from(index).unwrap_or(u32::MAX),
        None => 0,
    };

    let effects = match obj.get("effects") {
        None | Some(Value::Null) => Vec::new(),
        Some(raw) => serde_json::from_value::<Vec<Effect>>(raw.clone()).unwrap_or_else(|e| {
            warnings.push(format!("{location}: effects of clip {id} dropped ({e})"));
            Vec::new()
        }),
    };

    Some(ClipRecord {
        name: text_field(obj, "name").unwrap_or_default(),
        file_path: text_field(obj, "file_path").filter(|p| !p.is_empty()),
        timeline_start: start / frame_rate,
        timeline_end: end / frame_rate,
        duration: (end - start) / frame_rate,
        in_point: in_point / frame_rate,
        track,
        clip_type,
        effects,
        id,
    })
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}
