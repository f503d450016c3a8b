use chrono::{DateTime, Utc};
use timeline::{frames_to_seconds, seconds_to_frames, Clip, Timeline};

use crate::{ClipRecord, CodecError, Document, DocumentMetadata, TimelineSettings, CURRENT_VERSION};

/// Flattens a timeline into a current-version document.
///
/// Clips are written track by track in the timeline's own order, so decoding
/// the result rebuilds the same tracks.
pub fn encode(timeline: &Timeline, now: DateTime<Utc>) -> Document {
    let frame_rate = timeline.frame_rate();
    let clips: Vec<ClipRecord> = timeline
        .clips()
        .map(|clip| clip_to_record(clip, frame_rate))
        .collect();
    let duration = clips.iter().map(|c| c.timeline_end).fold(0.0, f64::max);

    Document {
        version: CURRENT_VERSION.to_string(),
        timeline: TimelineSettings::new(frame_rate, duration),
        clips,
        transitions: Vec::new(),
        metadata: DocumentMetadata::stamped(now),
    }
}

pub fn clip_to_record(clip: &Clip, frame_rate: f64) -> ClipRecord {
    ClipRecord {
        id: clip.id.clone(),
        name: clip.name.clone(),
        file_path: clip.file_path.clone(),
        timeline_start: frames_to_seconds(clip.start_frame, frame_rate),
        timeline_end: frames_to_seconds(clip.end_frame, frame_rate),
        duration: frames_to_seconds(clip.duration_frames(), frame_rate),
        in_point: frames_to_seconds(clip.in_point_frame, frame_rate),
        track: clip.track_index,
        clip_type: clip.track_type,
        effects: clip.effects.clone(),
    }
}

/// Rebuilds a timeline from a current-version document.
///
/// No validation happens here: ranges are converted as found and clips are
/// placed without overlap checks.
pub fn decode(document: &Document) -> Result<Timeline, CodecError> {
    if document.version != CURRENT_VERSION {
        return Err(CodecError::UnsupportedVersion {
            found: document.version.clone(),
        });
    }

    let frame_rate = document.timeline.frame_rate;
    let mut timeline = Timeline::new(frame_rate)?;
    for record in &document.clips {
        timeline.place_clip(record_to_clip(record, frame_rate));
    }
    Ok(timeline)
}

pub fn record_to_clip(record: &ClipRecord, frame_rate: f64) -> Clip {
    Clip {
        id: record.id.clone(),
        name: record.name.clone(),
        track_type: record.clip_type,
        track_index: record.track,
        start_frame: seconds_to_frames(record.timeline_start, frame_rate),
        end_frame: seconds_to_frames(record.timeline_end, frame_rate),
        in_point_frame: seconds_to_frames(record.in_point, frame_rate),
        file_path: record.file_path.clone(),
        effects: record.effects.clone(),
    }
}
