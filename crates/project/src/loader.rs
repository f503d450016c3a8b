//! Fault-tolerant loading and the mirror save path.
//!
//! A load walks raw document -> structural check -> migration -> structural
//! re-check -> per-clip build -> integrity check. Recoverable findings land in
//! the [`LoadingReport`]; only storage failures, cancellation and (in strict
//! mode) validation failures come back as errors.

use chrono::{DateTime, Utc};
use schema::{
    detect_version, encode, migrate, validate_clip_record, validate_document,
    validate_integrity, validate_structure, validate_structure_for, Document, DocumentValidation,
    MigrationOutcome, LEGACY_CLIP_MARKER,
};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Instant;
use timeline::{
    clamp_frame_rate, seconds_to_frames, Clip, Effect, Frame, Timeline, TrackType,
    DEFAULT_FRAME_RATE,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{IssueKind, LoadError, LoadOptions, LoadSource, LoaderContext, LoadingReport};

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub timeline: Timeline,
    pub report: LoadingReport,
}

/// Loads the timeline stored under `asset_key`.
///
/// With `allow_partial_load` the call only fails on storage errors or
/// cancellation; everything else degrades to a smaller, fallback or default
/// timeline. In strict mode the first structural, clip or missing-asset
/// failure is returned instead.
pub fn load_timeline(
    ctx: &LoaderContext,
    asset_key: &str,
    options: LoadOptions,
) -> Result<LoadOutcome, LoadError> {
    let started = Instant::now();
    let mut report = LoadingReport::new();
    ctx.check_cancelled()?;

    let Some(raw) = ctx.store().load_raw(asset_key)? else {
        info!(asset = asset_key, "no stored timeline, creating default");
        let timeline = default_timeline(ctx, asset_key);
        report.source = LoadSource::NewProject;
        report.total_clips = timeline.clip_count();
        report.loaded_clips = timeline.clip_count();
        report.finish(started);
        return Ok(LoadOutcome { timeline, report });
    };

    let now = Utc::now();
    let timeline = match load_document(ctx, &raw, options, &mut report, now) {
        Ok(timeline) => {
            report.source = LoadSource::Stored;
            timeline
        }
        Err(e) if e.is_fatal() || !options.allow_partial_load => {
            error!(asset = asset_key, error = %e, "timeline load failed");
            return Err(e);
        }
        Err(e) => {
            error!(asset = asset_key, error = %e, "robust load failed, trying simple decode");
            report.push(IssueKind::Recovery, format!("robust load failed: {e}"));
            recover(ctx, asset_key, &raw, &mut report)
        }
    };

    report.finish(started);
    info!(
        asset = asset_key,
        loaded = report.loaded_clips,
        total = report.total_clips,
        success_rate = %format!("{:.1}%", report.success_rate()),
        elapsed_ms = %format!("{:.1}", report.elapsed_ms),
        "timeline loaded"
    );
    if !report.issues.is_empty() {
        let preview: Vec<&str> = report.messages().take(3).collect();
        warn!(
            asset = asset_key,
            issues = report.issues.len(),
            first = ?preview,
            "timeline loaded with issues"
        );
    }

    Ok(LoadOutcome { timeline, report })
}

fn recover(
    ctx: &LoaderContext,
    asset_key: &str,
    raw: &Value,
    report: &mut LoadingReport,
) -> Timeline {
    match simple_decode(raw) {
        Ok(timeline) => {
            info!(asset = asset_key, clips = timeline.clip_count(), "simple decode fallback succeeded");
            report.source = LoadSource::Fallback;
            report.loaded_clips = timeline.clip_count();
            report.total_clips = report.total_clips.max(report.loaded_clips);
            report.failed_clips = report.total_clips - report.loaded_clips;
            timeline
        }
        Err(e) => {
            warn!(asset = asset_key, error = %e, "simple decode failed, using default timeline");
            report.push(IssueKind::Recovery, format!("simple decode failed: {e}"));
            let timeline = default_timeline(ctx, asset_key);
            report.source = LoadSource::Default;
            report.loaded_clips = timeline.clip_count();
            report.failed_clips = report.total_clips;
            timeline
        }
    }
}

/// Reads clips straight out of the raw document, skipping migration and
/// validation.
///
/// Both shapes are accepted: a flat `clips` list in seconds and legacy
/// `tracks[].clips[]` entries in frames. Records that cannot become a clip
/// are ignored. Fails only when the document has no clip list at all.
pub fn simple_decode(raw: &Value) -> Result<Timeline, LoadError> {
    let Some(doc) = raw.as_object() else {
        return Err(LoadError::Structural(vec![
            "document is not a JSON object".into(),
        ]));
    };
    let flat = doc.get("clips").and_then(Value::as_array);
    let tracks = doc.get("tracks").and_then(Value::as_array);
    if flat.is_none() && tracks.is_none() {
        return Err(LoadError::Structural(vec![
            "document has neither clips nor tracks".into(),
        ]));
    }

    let rate = doc
        .get("timeline")
        .and_then(|t| t.get("frame_rate"))
        .or_else(|| doc.get("frame_rate"))
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_FRAME_RATE);
    let (frame_rate, _) = clamp_frame_rate(rate);
    let mut timeline = Timeline::new(frame_rate).unwrap_or_default();

    let legacy: Vec<Value> = tracks
        .into_iter()
        .flatten()
        .filter_map(|track| track.get("clips").and_then(Value::as_array))
        .flatten()
        .filter_map(|entry| legacy_as_record(entry, frame_rate))
        .collect();

    let mut skipped = 0usize;
    for record in flat.into_iter().flatten().chain(legacy.iter()) {
        match build_clip(record, frame_rate, &timeline) {
            Ok(built) => timeline.place_clip(built.clip),
            Err(reason) => {
                debug!(reason = %reason, "simple decode skipped clip");
                skipped += 1;
            }
        }
    }
    debug!(clips = timeline.clip_count(), skipped, "simple decode finished");
    Ok(timeline)
}

/// Rewrites a marked legacy clip entry as a flat record in seconds.
fn legacy_as_record(entry: &Value, frame_rate: f64) -> Option<Value> {
    let obj = entry.as_object()?;
    if obj.get("_type").and_then(Value::as_str) != Some(LEGACY_CLIP_MARKER) {
        return None;
    }
    let field = |key: &str| obj.get(key).cloned().unwrap_or(Value::Null);
    let seconds = |key: &str| match obj.get(key).and_then(Value::as_f64) {
        Some(frames) => Value::from(frames / frame_rate),
        None => field(key),
    };
    let id = match obj.get("clip_id") {
        Some(Value::String(s)) if !s.is_empty() => Value::from(s.clone()),
        _ => field("id"),
    };

    let mut record = Map::new();
    record.insert("id".into(), id);
    record.insert("name".into(), field("name"));
    record.insert("file_path".into(), field("file_path"));
    record.insert("timeline_start".into(), seconds("start"));
    record.insert("timeline_end".into(), seconds("end"));
    record.insert("in_point".into(), seconds("in_point"));
    record.insert("track".into(), field("track_index"));
    record.insert("type".into(), field("track_type"));
    record.insert("effects".into(), field("effects"));
    Some(Value::Object(record))
}

fn load_document(
    ctx: &LoaderContext,
    raw: &Value,
    options: LoadOptions,
    report: &mut LoadingReport,
    now: DateTime<Utc>,
) -> Result<Timeline, LoadError> {
    let strict = !options.allow_partial_load;
    report.schema_version = Some(detect_version(raw).label());

    let structure = validate_structure_for(raw);
    report.extend(IssueKind::Structural, structure.warnings);
    if !structure.valid {
        report.extend(IssueKind::Structural, structure.errors.iter().cloned());
        if strict {
            return Err(LoadError::Structural(structure.errors));
        }
    }

    let migration = migrate(raw.clone(), now)?;
    report.extend(IssueKind::Migration, migration.warnings);
    if let MigrationOutcome::Migrated { from } = migration.outcome {
        report.migrated_from = Some(from.to_string());
        let revalidated = validate_structure(&migration.document);
        report.extend(IssueKind::Structural, revalidated.warnings);
        if !revalidated.valid {
            error!(errors = ?revalidated.errors, "migrated document failed structural validation");
            report.extend(IssueKind::Structural, revalidated.errors.iter().cloned());
            if strict {
                return Err(LoadError::Structural(revalidated.errors));
            }
        }
    }
    let doc = migration.document;

    let frame_rate = match doc.pointer("/timeline/frame_rate").and_then(Value::as_f64) {
        Some(rate) => {
            let (rate_used, corrected) = clamp_frame_rate(rate);
            if corrected {
                warn!(frame_rate = rate, "invalid frame rate, using default");
                report.push(
                    IssueKind::Structural,
                    format!("invalid frame rate {rate} corrected to {DEFAULT_FRAME_RATE}"),
                );
            }
            rate_used
        }
        None => {
            report.push(
                IssueKind::Structural,
                format!("frame rate missing, using {DEFAULT_FRAME_RATE}"),
            );
            DEFAULT_FRAME_RATE
        }
    };
    let mut timeline = Timeline::new(frame_rate).unwrap_or_default();

    let records: &[Value] = doc
        .get("clips")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    report.total_clips = records.len();

    for (index, record) in records.iter().enumerate() {
        ctx.check_cancelled()?;
        let label = record
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let check = validate_clip_record(record, frame_rate);
        report.extend(
            IssueKind::ClipValidation,
            check.warnings.iter().map(|w| format!("clip {index}: {w}")),
        );
        if !check.valid {
            report.extend(
                IssueKind::ClipValidation,
                check.errors.iter().map(|e| format!("clip {index}: {e}")),
            );
            if strict {
                return Err(LoadError::ClipValidation {
                    index,
                    clip: label,
                    errors: check.errors,
                });
            }
        }

        if options.validate_assets {
            if let Some(path) = record.get("file_path").and_then(Value::as_str) {
                check_asset(ctx, path, &label, strict, report)?;
            }
        }

        match build_clip(record, frame_rate, &timeline) {
            Ok(built) => {
                for correction in built.corrections {
                    warn!(clip = %built.clip.id, "{correction}");
                    report.push(
                        IssueKind::ClipValidation,
                        format!("clip {index}: {correction}"),
                    );
                }
                if options.validate_assets {
                    check_source_fit(ctx, &built.clip, frame_rate, index, strict, report)?;
                }
                timeline.place_clip(built.clip);
                report.loaded_clips += 1;
            }
            Err(reason) => {
                warn!(index, clip = %label, reason = %reason, "skipping clip");
                report.failed_clips += 1;
                report.push(
                    IssueKind::ClipValidation,
                    format!("failed to load clip {index}: {reason}"),
                );
                if strict {
                    return Err(LoadError::ClipValidation {
                        index,
                        clip: label,
                        errors: vec![reason],
                    });
                }
            }
        }
    }

    let integrity = validate_integrity(&timeline);
    report.extend(IssueKind::Integrity, integrity.errors);
    report.extend(IssueKind::Integrity, integrity.warnings);

    Ok(timeline)
}

fn check_asset(
    ctx: &LoaderContext,
    path: &str,
    clip: &str,
    strict: bool,
    report: &mut LoadingReport,
) -> Result<(), LoadError> {
    if path.is_empty() {
        return Ok(());
    }
    let Some(checker) = ctx.asset_checker() else {
        debug!(path, "no asset checker configured, skipping");
        return Ok(());
    };
    if checker.exists(path) {
        return Ok(());
    }
    report.missing_assets += 1;
    report.push(IssueKind::AssetMissing, format!("missing asset: {path}"));
    if strict {
        return Err(LoadError::AssetMissing {
            clip: clip.to_string(),
            path: path.to_string(),
        });
    }
    Ok(())
}

/// Flags a clip that reads past the end of its source, when the source
/// length is known.
fn check_source_fit(
    ctx: &LoaderContext,
    clip: &Clip,
    frame_rate: f64,
    index: usize,
    strict: bool,
    report: &mut LoadingReport,
) -> Result<(), LoadError> {
    let Some(path) = clip.file_path.as_deref() else {
        return Ok(());
    };
    let Some(seconds) = ctx
        .duration_lookup()
        .and_then(|lookup| lookup.duration_seconds(path))
        .filter(|s| s.is_finite() && *s >= 0.0)
    else {
        return Ok(());
    };
    let source_frames = seconds_to_frames(seconds, frame_rate);
    if clip.fits_source(source_frames) {
        return Ok(());
    }
    let message = format!(
        "in_point {} + duration {} frames exceeds source length {source_frames} frames of {path}",
        clip.in_point_frame,
        clip.duration_frames()
    );
    warn!(clip = %clip.id, "{message}");
    report.push(IssueKind::ClipValidation, format!("clip {index}: {message}"));
    if strict {
        return Err(LoadError::ClipValidation {
            index,
            clip: clip.name.clone(),
            errors: vec![message],
        });
    }
    Ok(())
}

struct BuiltClip {
    clip: Clip,
    corrections: Vec<String>,
}

/// Turns one clip record into a [`Clip`], applying corrective defaults.
///
/// Returns the reason when the record cannot become a clip at all.
fn build_clip(record: &Value, frame_rate: f64, timeline: &Timeline) -> Result<BuiltClip, String> {
    let obj = record
        .as_object()
        .ok_or_else(|| "clip record is not an object".to_string())?;
    let id = required_text(obj, "id")?;
    let name = required_text(obj, "name")?;
    if timeline.clip(&id).is_some() {
        return Err(format!("duplicate clip id {id}"));
    }

    let mut corrections = Vec::new();
    let mut start = number_or(obj, "timeline_start", 0.0)?;
    let end = number_or(obj, "timeline_end", 0.0)?;
    let mut in_point = number_or(obj, "in_point", 0.0)?;

    if start < 0.0 {
        corrections.push(format!("negative timeline_start {start} clamped to 0"));
        start = 0.0;
    }
    if in_point < 0.0 {
        corrections.push(format!("negative in_point {in_point} clamped to 0"));
        in_point = 0.0;
    }

    let start_frame = frame_at(start, frame_rate, "timeline_start")?;
    let mut end_frame = frame_at(end, frame_rate, "timeline_end")?;
    let in_point_frame = frame_at(in_point, frame_rate, "in_point")?;
    if end_frame <= start_frame {
        corrections.push(format!(
            "timeline_end {end} not after timeline_start {start}, extended to one frame"
        ));
        end_frame = start_frame + 1;
    }

    let track_type = match obj.get("type").filter(|v| !v.is_null()) {
        None => TrackType::default(),
        Some(v) => v
            .as_str()
            .and_then(|s| s.parse::<TrackType>().ok())
            .ok_or_else(|| format!("unknown clip type {v}"))?,
    };

    let track_index = match obj.get("track").filter(|v| !v.is_null()) {
        None => 0,
        Some(v) => {
            let index = v
                .as_i64()
                .ok_or_else(|| format!("track must be an integer, got {v}"))?;
            if index < 0 {
                corrections.push(format!("negative track {index} set to 0"));
            }
            u32::try_from(index.max(0)).unwrap_or(u32::MAX)
        }
    };

    let effects = match obj.get("effects") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match serde_json::from_value::<Effect>(item.clone()) {
                Ok(effect) => Some(effect),
                Err(e) => {
                    corrections.push(format!("effect {i} dropped: {e}"));
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    let file_path = obj
        .get("file_path")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    Ok(BuiltClip {
        clip: Clip {
            id,
            name,
            track_type,
            track_index,
            start_frame,
            end_frame,
            in_point_frame,
            file_path,
            effects,
        },
        corrections,
    })
}

// Positions past 2^52 frames lose integer precision in f64 and leave no
// headroom for the one-frame extension.
const MAX_POSITION_FRAMES: f64 = (1u64 << 52) as f64;

/// Converts a clip position to frames, refusing values too large to place.
fn frame_at(seconds: f64, frame_rate: f64, key: &str) -> Result<Frame, String> {
    let frames = (seconds * frame_rate).round();
    if !frames.is_finite() || frames.abs() > MAX_POSITION_FRAMES {
        return Err(format!("{key} {seconds} is outside the representable timeline"));
    }
    Ok(seconds_to_frames(seconds, frame_rate))
}

fn required_text(obj: &Map<String, Value>, key: &str) -> Result<String, String> {
    match obj.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(format!("missing or empty {key}")),
    }
}

fn number_or(obj: &Map<String, Value>, key: &str, default: f64) -> Result<f64, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_f64()
            .filter(|n| n.is_finite())
            .ok_or_else(|| format!("{key} is not a number: {v}")),
    }
}

/// Fresh 30 fps timeline for `asset_key`, seeded with one clip spanning the
/// whole asset when its duration is known.
pub fn default_timeline(ctx: &LoaderContext, asset_key: &str) -> Timeline {
    let mut timeline = Timeline::default();
    let Some(seconds) = ctx
        .duration_lookup()
        .and_then(|lookup| lookup.duration_seconds(asset_key))
        .filter(|s| s.is_finite() && *s > 0.0)
    else {
        info!(asset = asset_key, "creating empty timeline");
        return timeline;
    };

    let end_frame = timeline.seconds_to_frames(seconds);
    let name = Path::new(asset_key)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| asset_key.to_string());
    match Clip::new(
        Uuid::new_v4().to_string(),
        name,
        TrackType::Video,
        0,
        0,
        end_frame,
    ) {
        Ok(clip) => {
            info!(asset = asset_key, duration = seconds, "seeding default timeline with primary asset");
            timeline.place_clip(clip.with_file_path(asset_key));
        }
        Err(e) => warn!(asset = asset_key, error = %e, "could not seed default timeline"),
    }
    timeline
}

/// Encodes `timeline` and writes it under `asset_key` in one store call.
pub fn save_timeline(
    ctx: &LoaderContext,
    asset_key: &str,
    timeline: &Timeline,
) -> Result<Document, LoadError> {
    ctx.check_cancelled()?;
    let document = encode(timeline, Utc::now());
    let value = document.to_value()?;
    ctx.store().save_raw(asset_key, &value)?;
    info!(
        asset = asset_key,
        clips = document.clips.len(),
        duration = document.timeline.duration,
        "timeline saved"
    );
    Ok(document)
}

/// Validates the stored document without building a timeline.
///
/// `None` when nothing is stored under the key.
pub fn validate_stored(
    ctx: &LoaderContext,
    asset_key: &str,
) -> Result<Option<DocumentValidation>, LoadError> {
    ctx.check_cancelled()?;
    Ok(ctx
        .store()
        .load_raw(asset_key)?
        .map(|raw| validate_document(&raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CancelFlag, MemoryStore, PersistenceError, PersistenceStore};
    use serde_json::json;
    use std::sync::Arc;

    fn context(store: Arc<MemoryStore>) -> LoaderContext {
        LoaderContext::new(store.clone())
            .with_asset_checker(store.clone())
            .with_duration_lookup(store)
    }

    fn clip_json(id: &str, name: &str, start: f64, end: f64) -> Value {
        json!({"id": id, "name": name, "timeline_start": start, "timeline_end": end,
               "duration": end - start, "in_point": 0.0, "track": 0, "type": "video", "effects": []})
    }

    fn document(clips: Vec<Value>) -> Value {
        json!({"version": "2.0", "timeline": {"frame_rate": 30.0}, "clips": clips})
    }

    #[test]
    fn test_new_project_is_empty_without_duration() {
        let store = Arc::new(MemoryStore::new());
        let outcome = load_timeline(&context(store), "fresh.mp4", LoadOptions::default()).unwrap();
        assert!(outcome.timeline.is_empty());
        assert_eq!(outcome.report.source, LoadSource::NewProject);
    }

    #[test]
    fn test_new_project_seeds_primary_asset() {
        let store = Arc::new(MemoryStore::new());
        store.register_asset("media/interview.mp4", Some(12.0));
        let outcome =
            load_timeline(&context(store), "media/interview.mp4", LoadOptions::default()).unwrap();

        let clip = outcome.timeline.clips().next().unwrap();
        assert_eq!(clip.name, "interview.mp4");
        assert_eq!(clip.end_frame, 360);
        assert_eq!(clip.file_path.as_deref(), Some("media/interview.mp4"));
        assert_eq!(outcome.report.loaded_clips, 1);
    }

    #[test]
    fn test_load_builds_tracks() {
        let store = Arc::new(MemoryStore::new());
        let mut audio = clip_json("b", "Music", 0.0, 10.0);
        audio["type"] = json!("audio");
        store.insert("k", document(vec![clip_json("a", "Intro", 0.0, 5.0), audio]));

        let outcome = load_timeline(
            &context(store),
            "k",
            LoadOptions {
                validate_assets: false,
                ..LoadOptions::default()
            },
        )
        .unwrap();
        assert_eq!(outcome.report.source, LoadSource::Stored);
        assert_eq!(outcome.report.loaded_clips, 2);
        assert_eq!(outcome.report.schema_version.as_deref(), Some("2.0"));
        assert!(outcome.report.issues.is_empty(), "{:?}", outcome.report.issues);
        assert_eq!(outcome.timeline.tracks().len(), 2);
        assert_eq!(outcome.timeline.duration_frames(), 300);
    }

    #[test]
    fn test_negative_start_is_clamped() {
        let store = Arc::new(MemoryStore::new());
        store.insert("k", document(vec![clip_json("a", "Early", -2.0, 3.0)]));
        let outcome = load_timeline(&context(store), "k", LoadOptions::default()).unwrap();

        let clip = outcome.timeline.clip("a").unwrap();
        assert_eq!(clip.start_frame, 0);
        assert_eq!(clip.end_frame, 90);
        assert_eq!(outcome.report.loaded_clips, 1);
        assert!(outcome
            .report
            .messages()
            .any(|m| m.contains("clamped to 0")));
    }

    #[test]
    fn test_inverted_range_is_extended_by_one_frame() {
        let store = Arc::new(MemoryStore::new());
        store.insert("k", document(vec![clip_json("a", "Flat", 4.0, 4.0)]));
        let outcome = load_timeline(&context(store), "k", LoadOptions::default()).unwrap();

        let clip = outcome.timeline.clip("a").unwrap();
        assert_eq!(clip.start_frame, 120);
        assert_eq!(clip.end_frame, 121);
        assert!(outcome
            .report
            .messages()
            .any(|m| m.contains("extended to one frame")));
    }

    #[test]
    fn test_missing_asset_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.register_asset("here.mp4", Some(5.0));
        let mut present = clip_json("a", "Here", 0.0, 1.0);
        present["file_path"] = json!("here.mp4");
        let mut absent = clip_json("b", "Gone", 1.0, 2.0);
        absent["file_path"] = json!("gone.mp4");
        store.insert("k", document(vec![present, absent]));

        let ctx = context(store);
        let outcome = load_timeline(&ctx, "k", LoadOptions::default()).unwrap();
        assert_eq!(outcome.report.missing_assets, 1);
        assert_eq!(outcome.report.loaded_clips, 2);
        assert_eq!(outcome.report.count(IssueKind::AssetMissing), 1);

        let err = load_timeline(&ctx, "k", LoadOptions::strict()).unwrap_err();
        assert!(matches!(err, LoadError::AssetMissing { ref path, .. } if path == "gone.mp4"));
    }

    #[test]
    fn test_duplicate_ids_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        store.insert(
            "k",
            document(vec![clip_json("a", "One", 0.0, 1.0), clip_json("a", "Two", 2.0, 3.0)]),
        );
        let outcome = load_timeline(&context(store), "k", LoadOptions::default()).unwrap();
        assert_eq!(outcome.report.loaded_clips, 1);
        assert_eq!(outcome.report.failed_clips, 1);
    }

    #[test]
    fn test_overlaps_are_kept_and_reported() {
        let store = Arc::new(MemoryStore::new());
        store.insert(
            "k",
            document(vec![clip_json("a", "A", 0.0, 5.0), clip_json("b", "B", 4.0, 8.0)]),
        );
        let outcome = load_timeline(&context(store), "k", LoadOptions::default()).unwrap();
        assert_eq!(outcome.timeline.clip_count(), 2);
        assert_eq!(outcome.report.count(IssueKind::Integrity), 1);
    }

    #[test]
    fn test_bad_frame_rate_is_corrected() {
        let store = Arc::new(MemoryStore::new());
        store.insert(
            "k",
            json!({"version": "2.0", "timeline": {"frame_rate": 500}, "clips": [clip_json("a", "A", 0.0, 1.0)]}),
        );
        let outcome = load_timeline(&context(store), "k", LoadOptions::default()).unwrap();
        assert_eq!(outcome.timeline.frame_rate(), 30.0);
        assert_eq!(outcome.timeline.clip("a").unwrap().end_frame, 30);
    }

    #[test]
    fn test_legacy_document_is_migrated() {
        let store = Arc::new(MemoryStore::new());
        store.insert(
            "k",
            json!({"version": "1.0", "frame_rate": 25, "tracks": [{"clips": [
                {"_type": "VideoClip", "clip_id": "c1", "name": "Old", "start": 0, "end": 50},
                {"_type": "Marker", "clip_id": "m1"}
            ]}]}),
        );
        let outcome = load_timeline(&context(store), "k", LoadOptions::strict()).unwrap();
        assert_eq!(outcome.report.migrated_from.as_deref(), Some("1.0"));
        assert_eq!(outcome.report.schema_version.as_deref(), Some("1.0"));
        assert_eq!(outcome.report.count(IssueKind::Migration), 1);
        assert_eq!(outcome.timeline.frame_rate(), 25.0);
        assert_eq!(outcome.timeline.clip("c1").unwrap().end_frame, 50);
    }

    #[test]
    fn test_null_version_loads_strictly_as_legacy() {
        let store = Arc::new(MemoryStore::new());
        store.insert(
            "k",
            json!({"version": null, "frame_rate": 25, "tracks": [{"clips": [
                {"_type": "VideoClip", "clip_id": "c1", "name": "Old", "start": 0, "end": 25}
            ]}]}),
        );
        let outcome = load_timeline(&context(store), "k", LoadOptions::strict()).unwrap();
        assert_eq!(outcome.report.migrated_from.as_deref(), Some("1.0"));
        assert_eq!(outcome.timeline.clip("c1").unwrap().end_frame, 25);
    }

    #[test]
    fn test_broken_legacy_document_falls_back_to_default() {
        let store = Arc::new(MemoryStore::new());
        store.insert("k", json!({"version": "1.0", "frame_rate": -5}));
        let ctx = context(store);

        let outcome = load_timeline(&ctx, "k", LoadOptions::default()).unwrap();
        assert_eq!(outcome.report.source, LoadSource::Default);
        assert!(outcome.timeline.is_empty());
        assert!(outcome.report.count(IssueKind::Recovery) >= 1);

        assert!(load_timeline(&ctx, "k", LoadOptions::strict()).is_err());
    }

    #[test]
    fn test_unmigratable_legacy_document_uses_simple_decode() {
        let store = Arc::new(MemoryStore::new());
        store.insert(
            "k",
            json!({"version": "1.0", "frame_rate": -5, "tracks": [{"clips": [
                {"_type": "VideoClip", "clip_id": "c1", "name": "Kept", "start": 0, "end": 60},
                {"_type": "VideoClip", "clip_id": "c2", "start": 60, "end": 90},
                {"_type": "Marker", "clip_id": "m1"}
            ]}]}),
        );
        let outcome = load_timeline(&context(store), "k", LoadOptions::default()).unwrap();

        assert_eq!(outcome.report.source, LoadSource::Fallback);
        assert_eq!(outcome.report.count(IssueKind::Recovery), 1);
        assert_eq!(outcome.report.loaded_clips, 1);
        assert_eq!(outcome.timeline.frame_rate(), 30.0);
        let clip = outcome.timeline.clip("c1").unwrap();
        assert_eq!((clip.start_frame, clip.end_frame), (0, 60));
    }

    #[test]
    fn test_simple_decode_reads_flat_clips() {
        let timeline = simple_decode(&json!({
            "timeline": {"frame_rate": 25},
            "clips": [clip_json("a", "A", 0.0, 2.0), {"id": "", "name": "No id"}]
        }))
        .unwrap();
        assert_eq!(timeline.frame_rate(), 25.0);
        assert_eq!(timeline.clip_count(), 1);
        assert_eq!(timeline.clip("a").unwrap().end_frame, 50);

        assert!(simple_decode(&json!({"version": "1.0"})).is_err());
        assert!(simple_decode(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_unplaceable_position_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        store.insert(
            "k",
            document(vec![
                clip_json("far", "Far", 1e300, 1e300),
                clip_json("late", "Late", 1e300, 2e300),
                clip_json("ok", "Ok", 0.0, 1.0),
            ]),
        );
        let ctx = context(store);
        let outcome = load_timeline(&ctx, "k", LoadOptions::default()).unwrap();

        assert_eq!(outcome.report.source, LoadSource::Stored);
        assert_eq!(outcome.report.loaded_clips, 1);
        assert_eq!(outcome.report.failed_clips, 2);
        assert!(outcome.timeline.clip("ok").is_some());
        assert!(outcome
            .report
            .messages()
            .any(|m| m.contains("outside the representable timeline")));

        assert!(matches!(
            load_timeline(&ctx, "k", LoadOptions::strict()),
            Err(LoadError::ClipValidation { index: 0, .. })
        ));
    }

    #[test]
    fn test_clip_past_source_end_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.register_asset("src.mp4", Some(2.0));
        store.register_asset("long.mp4", Some(10.0));
        let mut overrun = clip_json("a", "Overrun", 0.0, 3.0);
        overrun["file_path"] = json!("src.mp4");
        overrun["in_point"] = json!(5.0);
        let mut fits = clip_json("b", "Fits", 3.0, 6.0);
        fits["file_path"] = json!("long.mp4");
        fits["in_point"] = json!(1.0);
        store.insert("k", document(vec![overrun, fits]));
        let ctx = context(store);

        let outcome = load_timeline(&ctx, "k", LoadOptions::default()).unwrap();
        assert_eq!(outcome.report.loaded_clips, 2);
        assert_eq!(outcome.report.count(IssueKind::ClipValidation), 1);
        assert!(outcome
            .report
            .messages()
            .any(|m| m.starts_with("clip 0:") && m.contains("exceeds source length 60 frames")));

        let err = load_timeline(&ctx, "k", LoadOptions::strict()).unwrap_err();
        assert!(matches!(err, LoadError::ClipValidation { index: 0, .. }));

        let unchecked = LoadOptions {
            validate_assets: false,
            allow_partial_load: false,
        };
        assert!(load_timeline(&ctx, "k", unchecked).is_ok());
    }

    #[test]
    fn test_structural_failure_in_strict_mode() {
        let store = Arc::new(MemoryStore::new());
        store.insert("k", json!({"version": "2.0", "clips": []}));
        let ctx = context(store);

        let err = load_timeline(&ctx, "k", LoadOptions::strict()).unwrap_err();
        assert!(matches!(err, LoadError::Structural(_)));

        let outcome = load_timeline(&ctx, "k", LoadOptions::default()).unwrap();
        assert!(outcome.timeline.is_empty());
        assert!(outcome.report.count(IssueKind::Structural) >= 1);
    }

    struct BrokenStore;

    impl PersistenceStore for BrokenStore {
        fn load_raw(&self, _asset_key: &str) -> Result<Option<Value>, PersistenceError> {
            Err(PersistenceError::Unavailable("offline".into()))
        }

        fn save_raw(&self, _asset_key: &str, _document: &Value) -> Result<(), PersistenceError> {
            Err(PersistenceError::Unavailable("offline".into()))
        }
    }

    #[test]
    fn test_persistence_errors_always_propagate() {
        let ctx = LoaderContext::new(Arc::new(BrokenStore));
        let err = load_timeline(&ctx, "k", LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Persistence(_)));

        let err = save_timeline(&ctx, "k", &Timeline::default()).unwrap_err();
        assert!(matches!(err, LoadError::Persistence(_)));
    }

    #[test]
    fn test_cancelled_load() {
        let store = Arc::new(MemoryStore::new());
        store.insert("k", document(vec![clip_json("a", "A", 0.0, 1.0)]));
        let cancel = CancelFlag::new();
        let ctx = context(store.clone()).with_cancel_flag(cancel.clone());
        cancel.cancel();

        assert!(matches!(
            load_timeline(&ctx, "k", LoadOptions::default()),
            Err(LoadError::Cancelled)
        ));
        assert!(matches!(
            save_timeline(&ctx, "k", &Timeline::default()),
            Err(LoadError::Cancelled)
        ));
        assert_eq!(store.get("k"), Some(document(vec![clip_json("a", "A", 0.0, 1.0)])));
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());
        let mut timeline = Timeline::new(24.0).unwrap();
        timeline
            .add_clip(
                Clip::new("c1", "Shot", TrackType::Video, 1, 12, 96)
                    .unwrap()
                    .with_in_point(6),
            )
            .unwrap();

        let saved = save_timeline(&ctx, "k", &timeline).unwrap();
        assert_eq!(saved.version, "2.0");
        assert_eq!(store.get("k").unwrap()["clips"][0]["track"], 1);

        let outcome = load_timeline(
            &ctx,
            "k",
            LoadOptions {
                validate_assets: false,
                allow_partial_load: false,
            },
        )
        .unwrap();
        assert_eq!(outcome.timeline, timeline);
    }

    #[test]
    fn test_validate_stored() {
        let store = Arc::new(MemoryStore::new());
        store.insert("k", document(vec![clip_json("a", "", 0.0, 1.0)]));
        let ctx = context(store);

        let result = validate_stored(&ctx, "k").unwrap().unwrap();
        assert!(!result.overall_valid);
        assert!(validate_stored(&ctx, "missing").unwrap().is_none());
    }
}
