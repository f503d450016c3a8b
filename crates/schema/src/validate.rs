//! Read-only checks over raw documents, single clip records and built timelines.
//!
//! Nothing here mutates its input or fails; findings are collected into a
//! [`ValidationReport`] and callers decide what is fatal.

use serde::Serialize;
use serde_json::{Map, Value};
use timeline::{
    is_supported_frame_rate, one_frame_seconds, Clip, Frame, Timeline, TrackType,
    DEFAULT_FRAME_RATE,
};

use crate::{detect_version, DetectedVersion, SchemaVersion};

/// Allowed mismatch between a clip's stored `duration` and its range, in seconds.
pub const DURATION_TOLERANCE_SECS: f64 = 0.01;
/// Clips longer than this are reported as likely corruption.
pub const SUSPICIOUS_CLIP_SECS: f64 = 24.0 * 60.0 * 60.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn from_parts(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Shape of a current-version document, clip contents aside.
pub fn validate_structure(raw: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let Some(doc) = raw.as_object() else {
        return ValidationReport::from_parts(vec!["document must be a JSON object".into()], warnings);
    };

    check_version_field(doc, true, &mut errors);

    match doc.get("timeline") {
        None => errors.push("missing timeline metadata".into()),
        Some(Value::Object(settings)) => {
            match settings.get("frame_rate") {
                None | Some(Value::Null) => errors.push("missing frame_rate in timeline metadata".into()),
                Some(fr) => check_frame_rate(fr, &mut errors, &mut warnings),
            }
            if let Some(duration) = settings.get("duration") {
                if !duration.as_f64().is_some_and(|d| d >= 0.0) {
                    errors.push(format!("invalid duration: {duration}"));
                }
            }
        }
        Some(other) => errors.push(format!("timeline metadata must be an object, got {other}")),
    }

    match doc.get("clips") {
        None => errors.push("missing clips array".into()),
        Some(Value::Array(_)) => {}
        Some(_) => errors.push("clips must be an array".into()),
    }

    ValidationReport::from_parts(errors, warnings)
}

/// Shape of a legacy `1.0` document: optional frame rate, nested track list.
pub fn validate_legacy_structure(raw: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let Some(doc) = raw.as_object() else {
        return ValidationReport::from_parts(vec!["document must be a JSON object".into()], warnings);
    };

    check_version_field(doc, false, &mut errors);
    if let Some(fr) = doc.get("frame_rate").filter(|v| !v.is_null()) {
        check_frame_rate(fr, &mut errors, &mut warnings);
    }

    match doc.get("tracks") {
        None => errors.push("missing tracks array".into()),
        Some(Value::Array(tracks)) => {
            for (i, track) in tracks.iter().enumerate() {
                match track.get("clips") {
                    Some(Value::Array(_)) | None => {}
                    Some(_) => errors.push(format!("track {i}: clips must be an array")),
                }
                if !track.is_object() {
                    errors.push(format!("track {i} must be an object"));
                }
            }
        }
        Some(_) => errors.push("tracks must be an array".into()),
    }

    ValidationReport::from_parts(errors, warnings)
}

/// Dispatches to the structural check matching the document's own version tag.
pub fn validate_structure_for(raw: &Value) -> ValidationReport {
    match detect_version(raw) {
        DetectedVersion::Known(SchemaVersion::V1) => validate_legacy_structure(raw),
        _ => validate_structure(raw),
    }
}

fn check_version_field(doc: &Map<String, Value>, required: bool, errors: &mut Vec<String>) {
    match doc.get("version") {
        None | Some(Value::Null) if required => errors.push("missing version field".into()),
        None | Some(Value::Null) => {}
        Some(Value::String(_)) => {}
        Some(_) => errors.push("version must be a string".into()),
    }
}

fn check_frame_rate(fr: &Value, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
    match fr.as_f64() {
        Some(rate) if rate > 0.0 => {
            if !is_supported_frame_rate(rate) {
                warnings.push(format!(
                    "frame_rate {rate} is outside 1..=120 and will be replaced by {DEFAULT_FRAME_RATE}"
                ));
            }
        }
        _ => errors.push(format!("invalid frame_rate: {fr}")),
    }
}

/// Field and timing consistency of one clip record.
///
/// `frame_rate` is only used for the sub-frame duration warning.
pub fn validate_clip_record(clip: &Value, frame_rate: f64) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let Some(obj) = clip.as_object() else {
        return ValidationReport::from_parts(vec!["clip must be a JSON object".into()], warnings);
    };

    for field in ["id", "name"] {
        match obj.get(field) {
            None => errors.push(format!("missing required field: {field}")),
            Some(Value::String(s)) if s.is_empty() => {
                errors.push(format!("empty required field: {field}"))
            }
            Some(Value::String(_)) => {}
            Some(Value::Null) => errors.push(format!("empty required field: {field}")),
            Some(other) => errors.push(format!("{field} must be a string, got {other}")),
        }
    }

    let start = seconds_field(obj, "timeline_start", &mut errors);
    let end = seconds_field(obj, "timeline_end", &mut errors);
    if let (Some(start), Some(end)) = (start, end) {
        if end <= start {
            errors.push(format!(
                "timeline_end ({end}) must be greater than timeline_start ({start})"
            ));
        } else {
            let span = end - start;
            if frame_rate > 0.0 && span < one_frame_seconds(frame_rate) {
                warnings.push(format!("clip is shorter than one frame ({span}s)"));
            }
            if span > SUSPICIOUS_CLIP_SECS {
                warnings.push(format!("clip lasts {span}s, longer than 24 hours"));
            }
        }
    }

    if let Some(duration) = obj.get("duration").filter(|v| !v.is_null()) {
        match duration.as_f64() {
            None => errors.push(format!("invalid duration type: {duration}")),
            Some(d) => {
                if d <= 0.0 {
                    errors.push(format!("non-positive duration: {d}"));
                }
                if let (Some(start), Some(end)) = (start, end) {
                    let expected = end - start;
                    if (d - expected).abs() > DURATION_TOLERANCE_SECS {
                        errors.push(format!(
                            "duration {d} doesn't match timeline positions (expected {expected})"
                        ));
                    }
                }
            }
        }
    }

    if let Some(in_point) = obj.get("in_point").filter(|v| !v.is_null()) {
        match in_point.as_f64() {
            None => errors.push(format!("invalid in_point type: {in_point}")),
            Some(p) if p < 0.0 => errors.push(format!("negative in_point: {p}")),
            Some(_) => {}
        }
    }

    if let Some(track) = obj.get("track").filter(|v| !v.is_null()) {
        match track.as_i64() {
            Some(t) if t < 0 => errors.push(format!("negative track index: {t}")),
            Some(_) => {}
            None => errors.push(format!("track must be an integer, got {track}")),
        }
    }

    if let Some(kind) = obj.get("type").filter(|v| !v.is_null()) {
        let known = kind
            .as_str()
            .is_some_and(|name| name.parse::<TrackType>().is_ok());
        if !known {
            errors.push(format!("invalid clip type: {kind}"));
        }
    }

    if let Some(effects) = obj.get("effects").filter(|v| !v.is_null()) {
        if !effects.is_array() {
            warnings.push("effects is not an array and will be ignored".into());
        }
    }

    ValidationReport::from_parts(errors, warnings)
}

fn seconds_field(obj: &Map<String, Value>, key: &str, errors: &mut Vec<String>) -> Option<f64> {
    let value = obj.get(key).filter(|v| !v.is_null())?;
    if !value.is_number() {
        errors.push(format!("invalid {key} type: {value}"));
        return None;
    }
    let seconds = value.as_f64()?;
    if seconds < 0.0 {
        errors.push(format!("negative {key}: {seconds}"));
    }
    Some(seconds)
}

/// Cross-clip checks over a built timeline.
///
/// Every overlapping pair on a track is reported, not only neighbours.
pub fn validate_integrity(timeline: &Timeline) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let frame_rate = timeline.frame_rate();
    let suspicious_frames = (SUSPICIOUS_CLIP_SECS * frame_rate).round() as Frame;

    for track in timeline.tracks() {
        let mut ordered: Vec<&Clip> = track.clips.iter().collect();
        ordered.sort_by_key(|c| (c.start_frame, c.end_frame));

        // Clips whose range is still open at the current start.
        let mut open: Vec<&Clip> = Vec::new();
        for clip in ordered {
            if clip.end_frame <= clip.start_frame {
                errors.push(format!(
                    "clip '{}' has end frame {} not after start frame {}",
                    clip.name, clip.end_frame, clip.start_frame
                ));
                continue;
            }
            if clip.duration_frames() > suspicious_frames {
                warnings.push(format!(
                    "clip '{}' spans {:.1}s, longer than 24 hours; possible corruption",
                    clip.name,
                    timeline.frames_to_seconds(clip.duration_frames())
                ));
            }

            open.retain(|earlier| earlier.end_frame > clip.start_frame);
            for earlier in &open {
                errors.push(format!(
                    "overlap on {} track {}: '{}' [{}, {}) and '{}' [{}, {})",
                    track.track_type,
                    track.track_index,
                    earlier.name,
                    earlier.start_frame,
                    earlier.end_frame,
                    clip.name,
                    clip.start_frame,
                    clip.end_frame
                ));
            }
            open.push(clip);
        }
    }

    ValidationReport::from_parts(errors, warnings)
}

/// Findings for one clip record that failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipValidation {
    pub clip_index: usize,
    pub clip_name: String,
    pub errors: Vec<String>,
}

/// Whole-document validation without building a timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentValidation {
    pub structure_validation: ValidationReport,
    pub clip_validations: Vec<ClipValidation>,
    pub overall_valid: bool,
    pub schema_version: String,
}

/// Runs the structural check and, if the shape is sound, every clip check.
///
/// Legacy documents only get the structural check; their clips are read
/// through migration.
pub fn validate_document(raw: &Value) -> DocumentValidation {
    let structure = validate_structure_for(raw);
    let mut clip_validations = Vec::new();

    let is_current = matches!(detect_version(raw), DetectedVersion::Known(v) if v.is_current());
    if structure.valid && is_current {
        let frame_rate = raw
            .pointer("/timeline/frame_rate")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_FRAME_RATE);
        let clips = raw.get("clips").and_then(Value::as_array);
        for (clip_index, clip) in clips.into_iter().flatten().enumerate() {
            let report = validate_clip_record(clip, frame_rate);
            if !report.valid {
                clip_validations.push(ClipValidation {
                    clip_index,
                    clip_name: clip
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    errors: report.errors,
                });
            }
        }
    }

    DocumentValidation {
        overall_valid: structure.valid && clip_validations.is_empty(),
        structure_validation: structure,
        clip_validations,
        schema_version: raw
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn video(id: &str, name: &str, start: Frame, end: Frame) -> Clip {
        Clip::new(id, name, TrackType::Video, 0, start, end).unwrap()
    }

    #[test]
    fn test_structure_accepts_current_document() {
        let report = validate_structure(&json!({
            "version": "2.0",
            "timeline": {"frame_rate": 30, "duration": 12.5},
            "clips": []
        }));
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_structure_collects_every_error() {
        let report = validate_structure(&json!({
            "version": 2,
            "timeline": {"frame_rate": -1, "duration": "long"},
            "clips": {}
        }));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 4);

        let report = validate_structure(&json!({}));
        assert_eq!(
            report.errors,
            vec![
                "missing version field".to_string(),
                "missing timeline metadata".to_string(),
                "missing clips array".to_string(),
            ]
        );
    }

    #[test]
    fn test_out_of_range_frame_rate_is_warning() {
        let report = validate_structure(&json!({
            "version": "2.0",
            "timeline": {"frame_rate": 240},
            "clips": []
        }));
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_legacy_structure() {
        let ok = validate_structure_for(&json!({"version": "1.0", "frame_rate": 25, "tracks": [{"clips": []}]}));
        assert!(ok.valid, "{:?}", ok.errors);

        let bad = validate_legacy_structure(&json!({"tracks": [{"clips": 3}, 7]}));
        assert_eq!(bad.errors.len(), 2);

        let null_version = validate_structure_for(&json!({"version": null, "tracks": []}));
        assert!(null_version.valid, "{:?}", null_version.errors);

        let wrong_type = validate_legacy_structure(&json!({"version": 1, "tracks": []}));
        assert_eq!(wrong_type.errors, vec!["version must be a string".to_string()]);
    }

    #[test]
    fn test_clip_record_valid() {
        let report = validate_clip_record(
            &json!({"id": "c1", "name": "Intro", "timeline_start": 0.0, "timeline_end": 5.0,
                    "duration": 5.005, "in_point": 1.0, "track": 2, "type": "text", "effects": []}),
            30.0,
        );
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn test_clip_record_errors() {
        let report = validate_clip_record(
            &json!({"id": "", "timeline_start": -1.0, "timeline_end": 4.0, "duration": 3.0,
                    "in_point": -2, "track": -1, "type": "hologram"}),
            30.0,
        );
        assert_eq!(
            report.errors,
            vec![
                "empty required field: id".to_string(),
                "missing required field: name".to_string(),
                "negative timeline_start: -1".to_string(),
                "duration 3 doesn't match timeline positions (expected 5)".to_string(),
                "negative in_point: -2".to_string(),
                "negative track index: -1".to_string(),
                "invalid clip type: \"hologram\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_clip_record_inverted_range_and_types() {
        let report = validate_clip_record(
            &json!({"id": "c", "name": "C", "timeline_start": 4.0, "timeline_end": 4.0}),
            30.0,
        );
        assert_eq!(report.errors.len(), 1);

        let report = validate_clip_record(
            &json!({"id": "c", "name": "C", "timeline_start": "0", "track": 1.5}),
            30.0,
        );
        assert_eq!(report.errors.len(), 2);
        assert!(!validate_clip_record(&json!([1, 2]), 30.0).valid);
    }

    #[test]
    fn test_clip_record_warnings() {
        let report = validate_clip_record(
            &json!({"id": "c", "name": "C", "timeline_start": 0.0, "timeline_end": 0.01, "effects": "x"}),
            30.0,
        );
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_integrity_reports_overlap_once() {
        let mut timeline = Timeline::default();
        timeline.place_clip(video("a", "First", 0, 150));
        timeline.place_clip(video("b", "Second", 120, 240));

        let report = validate_integrity(&timeline);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("First"));
        assert!(report.errors[0].contains("Second"));
    }

    #[test]
    fn test_integrity_ignores_touching_clips() {
        let mut timeline = Timeline::default();
        timeline.place_clip(video("a", "First", 0, 150));
        timeline.place_clip(video("b", "Second", 150, 240));
        let mut other = video("c", "Other", 0, 240);
        other.track_index = 1;
        timeline.place_clip(other);

        assert!(validate_integrity(&timeline).valid);
    }

    #[test]
    fn test_integrity_reports_non_adjacent_pairs() {
        let mut timeline = Timeline::default();
        timeline.place_clip(video("a", "Long", 0, 1000));
        timeline.place_clip(video("b", "Short", 100, 200));
        timeline.place_clip(video("c", "Later", 300, 400));

        let report = validate_integrity(&timeline);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().all(|e| e.contains("Long")));
    }

    #[test]
    fn test_integrity_flags_bad_and_long_clips() {
        let mut timeline = Timeline::default();
        let mut broken = video("a", "Broken", 0, 10);
        broken.end_frame = 0;
        timeline.place_clip(broken);
        let mut huge = video("b", "Huge", 0, 10);
        huge.track_index = 1;
        huge.end_frame = 30 * 60 * 60 * 25;
        timeline.place_clip(huge);

        let report = validate_integrity(&timeline);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_validate_document() {
        let result = validate_document(&json!({
            "version": "2.0",
            "timeline": {"frame_rate": 30},
            "clips": [
                {"id": "a", "name": "Good", "timeline_start": 0, "timeline_end": 1},
                {"id": "b", "name": "Bad", "timeline_start": 2, "timeline_end": 1}
            ]
        }));
        assert!(!result.overall_valid);
        assert!(result.structure_validation.valid);
        assert_eq!(result.clip_validations.len(), 1);
        assert_eq!(result.clip_validations[0].clip_index, 1);
        assert_eq!(result.clip_validations[0].clip_name, "Bad");
        assert_eq!(result.schema_version, "2.0");

        let legacy = validate_document(&json!({"version": "1.0", "tracks": []}));
        assert!(legacy.overall_valid);
        assert_eq!(legacy.schema_version, "1.0");
    }
}
