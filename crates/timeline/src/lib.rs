use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error;

pub mod time;
pub use time::*;
mod edit_operations;
pub use edit_operations::*;

#[derive(Debug, Error, PartialEq)]
pub enum TimelineError {
    #[error("invalid operation: {0}")]
    InvalidOp(String),
    #[error("unsupported frame rate: {0} (expected 1..=120)")]
    InvalidFrameRate(f64),
    #[error("unknown track type: {0}")]
    UnknownTrackType(String),
    #[error("clip already exists: {0}")]
    ClipExists(String),
    #[error("clip not found: {0}")]
    ClipNotFound(String),
    #[error("clip {clip} overlaps {other} on {track_type} track {track_index}")]
    Overlap {
        clip: String,
        other: String,
        track_type: TrackType,
        track_index: u32,
    },
    #[error("effect index {index} out of range for clip {clip}")]
    EffectNotFound { clip: String, index: usize },
}

pub type Frame = i64; // 0-based frame index, end positions are exclusive

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Video,
    Audio,
    Subtitle,
    Effect,
    Text,
    Image,
}

impl TrackType {
    pub const ALL: [TrackType; 6] = [
        TrackType::Video,
        TrackType::Audio,
        TrackType::Subtitle,
        TrackType::Effect,
        TrackType::Text,
        TrackType::Image,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrackType::Video => "video",
            TrackType::Audio => "audio",
            TrackType::Subtitle => "subtitle",
            TrackType::Effect => "effect",
            TrackType::Text => "text",
            TrackType::Image => "image",
        }
    }
}

impl Default for TrackType {
    fn default() -> Self {
        Self::Video
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackType {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrackType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TimelineError::UnknownTrackType(s.to_string()))
    }
}

/// Scalar effect parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EffectValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// An effect applied to a clip. List order on the clip is application order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    #[serde(rename = "type")]
    pub effect_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, EffectValue>,
}

impl Effect {
    pub fn new(effect_type: impl Into<String>) -> Self {
        Self {
            effect_type: effect_type.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: EffectValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub id: String,
    pub name: String,
    pub track_type: TrackType,
    pub track_index: u32,
    pub start_frame: Frame,
    /// Exclusive.
    pub end_frame: Frame,
    /// Offset into the source media.
    pub in_point_frame: Frame,
    /// `None` for generator and title clips.
    pub file_path: Option<String>,
    pub effects: Vec<Effect>,
}

impl Clip {
    /// Builds a clip, rejecting empty identifiers and empty or inverted ranges.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        track_type: TrackType,
        track_index: u32,
        start_frame: Frame,
        end_frame: Frame,
    ) -> Result<Self, TimelineError> {
        let id = id.into();
        let name = name.into();
        if id.is_empty() {
            return Err(TimelineError::InvalidOp("clip id must not be empty".into()));
        }
        if name.is_empty() {
            return Err(TimelineError::InvalidOp(format!(
                "clip {id} must have a name"
            )));
        }
        if start_frame < 0 || end_frame <= start_frame {
            return Err(TimelineError::InvalidOp(format!(
                "clip {id} has an invalid range {start_frame}..{end_frame}"
            )));
        }
        Ok(Self {
            id,
            name,
            track_type,
            track_index,
            start_frame,
            end_frame,
            in_point_frame: 0,
            file_path: None,
            effects: Vec::new(),
        })
    }

    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_in_point(mut self, in_point_frame: Frame) -> Self {
        self.in_point_frame = in_point_frame.max(0);
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn duration_frames(&self) -> Frame {
        self.end_frame - self.start_frame
    }

    pub fn overlaps(&self, other: &Clip) -> bool {
        self.start_frame < other.end_frame && other.start_frame < self.end_frame
    }

    /// Checks `in_point + duration <= source duration` when the source length is known.
    pub fn fits_source(&self, source_duration_frames: Frame) -> bool {
        self.in_point_frame
            .checked_add(self.duration_frames())
            .is_some_and(|needed| needed <= source_duration_frames)
    }
}

/// Clips of one media kind at one compositing priority, ordered by start frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub track_type: TrackType,
    pub track_index: u32,
    pub clips: Vec<Clip>,
}

impl Track {
    pub fn new(track_type: TrackType, track_index: u32) -> Self {
        Self {
            track_type,
            track_index,
            clips: Vec::new(),
        }
    }

    fn sort_key(&self) -> (u32, TrackType) {
        (self.track_index, self.track_type)
    }

    /// First clip on this track that overlaps `clip`, ignoring a clip with the same id.
    pub fn find_overlap(&self, clip: &Clip) -> Option<&Clip> {
        self.clips
            .iter()
            .find(|other| other.id != clip.id && other.overlaps(clip))
    }

    fn insert_sorted(&mut self, clip: Clip) {
        let idx = self
            .clips
            .partition_point(|existing| existing.start_frame <= clip.start_frame);
        self.clips.insert(idx, clip);
    }

    pub fn end_frame(&self) -> Frame {
        self.clips.iter().map(|c| c.end_frame).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    frame_rate: f64,
    tracks: Vec<Track>,
}

impl Default for Timeline {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            tracks: Vec::new(),
        }
    }
}

impl Timeline {
    pub fn new(frame_rate: f64) -> Result<Self, TimelineError> {
        if !is_supported_frame_rate(frame_rate) {
            return Err(TimelineError::InvalidFrameRate(frame_rate));
        }
        Ok(Self {
            frame_rate,
            tracks: Vec::new(),
        })
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Tracks ordered by `(track_index, track_type)`.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, track_type: TrackType, track_index: u32) -> Option<&Track> {
        self.tracks
            .iter()
            .find(|t| t.track_type == track_type && t.track_index == track_index)
    }

    /// All clips, track by track, each track in start order.
    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.tracks.iter().flat_map(|t| t.clips.iter())
    }

    pub fn clip(&self, clip_id: &str) -> Option<&Clip> {
        self.clips().find(|c| c.id == clip_id)
    }

    pub fn clip_count(&self) -> usize {
        self.tracks.iter().map(|t| t.clips.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.clip_count() == 0
    }

    pub fn duration_frames(&self) -> Frame {
        self.tracks.iter().map(Track::end_frame).max().unwrap_or(0)
    }

    pub fn duration_seconds(&self) -> f64 {
        frames_to_seconds(self.duration_frames(), self.frame_rate)
    }

    pub fn seconds_to_frames(&self, seconds: f64) -> Frame {
        seconds_to_frames(seconds, self.frame_rate)
    }

    pub fn frames_to_seconds(&self, frame: Frame) -> f64 {
        frames_to_seconds(frame, self.frame_rate)
    }

    /// Places a clip on its track without overlap or duplicate checks.
    ///
    /// Used when materialising persisted data; same-track overlaps are left in
    /// place and surface through integrity validation instead.
    pub fn place_clip(&mut self, clip: Clip) {
        self.track_mut_or_insert(clip.track_type, clip.track_index)
            .insert_sorted(clip);
    }

    fn track_mut_or_insert(&mut self, track_type: TrackType, track_index: u32) -> &mut Track {
        let key = (track_index, track_type);
        let idx = match self.tracks.binary_search_by(|t| t.sort_key().cmp(&key)) {
            Ok(idx) => idx,
            Err(idx) => {
                self.tracks.insert(idx, Track::new(track_type, track_index));
                idx
            }
        };
        &mut self.tracks[idx]
    }

    fn track_mut(&mut self, track_type: TrackType, track_index: u32) -> Option<&mut Track> {
        self.tracks
            .iter_mut()
            .find(|t| t.track_type == track_type && t.track_index == track_index)
    }

    fn locate(&self, clip_id: &str) -> Option<(usize, usize)> {
        self.tracks.iter().enumerate().find_map(|(ti, track)| {
            track
                .clips
                .iter()
                .position(|c| c.id == clip_id)
                .map(|ci| (ti, ci))
        })
    }

    fn drop_empty_tracks(&mut self) {
        self.tracks.retain(|t| !t.clips.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(id: &str, start: Frame, end: Frame) -> Clip {
        Clip::new(id, format!("Clip {id}"), TrackType::Video, 0, start, end).unwrap()
    }

    #[test]
    fn test_track_type_parse() {
        assert_eq!("audio".parse::<TrackType>().unwrap(), TrackType::Audio);
        assert_eq!(TrackType::Subtitle.to_string(), "subtitle");
        assert!("hologram".parse::<TrackType>().is_err());
    }

    #[test]
    fn test_clip_new_rejects_bad_input() {
        assert!(Clip::new("", "a", TrackType::Video, 0, 0, 10).is_err());
        assert!(Clip::new("a", "", TrackType::Video, 0, 0, 10).is_err());
        assert!(Clip::new("a", "a", TrackType::Video, 0, 10, 10).is_err());
        assert!(Clip::new("a", "a", TrackType::Video, 0, -1, 10).is_err());
    }

    #[test]
    fn test_timeline_new_rejects_frame_rate() {
        assert!(Timeline::new(0.0).is_err());
        assert!(Timeline::new(121.0).is_err());
        assert_eq!(Timeline::new(24.0).unwrap().frame_rate(), 24.0);
        assert_eq!(Timeline::default().frame_rate(), DEFAULT_FRAME_RATE);
    }

    #[test]
    fn test_duration_is_max_end() {
        let mut timeline = Timeline::default();
        assert_eq!(timeline.duration_frames(), 0);

        timeline.place_clip(clip("a", 0, 150));
        let mut audio = clip("b", 30, 300);
        audio.track_type = TrackType::Audio;
        timeline.place_clip(audio);

        assert_eq!(timeline.duration_frames(), 300);
        assert_eq!(timeline.duration_seconds(), 10.0);
    }

    #[test]
    fn test_place_clip_keeps_order() {
        let mut timeline = Timeline::default();
        let mut upper = clip("c", 0, 10);
        upper.track_index = 2;
        timeline.place_clip(upper);
        timeline.place_clip(clip("b", 100, 200));
        timeline.place_clip(clip("a", 0, 50));

        let track_indices: Vec<u32> = timeline.tracks().iter().map(|t| t.track_index).collect();
        assert_eq!(track_indices, vec![0, 2]);

        let ids: Vec<&str> = timeline.tracks()[0].clips.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_place_clip_allows_overlap() {
        let mut timeline = Timeline::default();
        timeline.place_clip(clip("a", 0, 150));
        timeline.place_clip(clip("b", 120, 240));
        assert_eq!(timeline.clip_count(), 2);
    }

    #[test]
    fn test_fits_source() {
        let c = clip("a", 100, 200).with_in_point(50);
        assert!(c.fits_source(150));
        assert!(!c.fits_source(149));

        let far = clip("b", 0, 10).with_in_point(Frame::MAX);
        assert!(!far.fits_source(Frame::MAX));
    }

    #[test]
    fn test_effect_serializes_with_type_tag() {
        let effect = Effect::new("blur").with_property("radius", EffectValue::Float(2.5));
        let json = serde_json::to_value(&effect).unwrap();
        assert_eq!(json["type"], "blur");
        assert_eq!(json["properties"]["radius"], 2.5);

        let back: Effect = serde_json::from_value(json).unwrap();
        assert_eq!(back, effect);
    }
}
