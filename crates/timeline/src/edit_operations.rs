//! Explicit edit operations. These are the only ways an already-built timeline
//! changes; each one keeps the same-track no-overlap rule intact.

use crate::{Clip, Effect, Frame, Timeline, TimelineError, TrackType};

impl Timeline {
    /// Adds a clip to its track, creating the track if needed.
    pub fn add_clip(&mut self, clip: Clip) -> Result<(), TimelineError> {
        if self.clip(&clip.id).is_some() {
            return Err(TimelineError::ClipExists(clip.id));
        }
        self.check_free(&clip)?;
        self.place_clip(clip);
        Ok(())
    }

    /// Removes a clip and returns it. Tracks left empty are dropped.
    pub fn remove_clip(&mut self, clip_id: &str) -> Result<Clip, TimelineError> {
        let (ti, ci) = self
            .locate(clip_id)
            .ok_or_else(|| TimelineError::ClipNotFound(clip_id.to_string()))?;
        let removed = self.tracks[ti].clips.remove(ci);
        self.drop_empty_tracks();
        Ok(removed)
    }

    /// Moves a clip to `new_start`, optionally onto another track index of the
    /// same type. Duration and in-point are preserved.
    pub fn move_clip(
        &mut self,
        clip_id: &str,
        new_start: Frame,
        new_track_index: Option<u32>,
    ) -> Result<(), TimelineError> {
        if new_start < 0 {
            return Err(TimelineError::InvalidOp(format!(
                "cannot move clip {clip_id} before frame 0"
            )));
        }
        let current = self
            .clip(clip_id)
            .ok_or_else(|| TimelineError::ClipNotFound(clip_id.to_string()))?;

        let mut moved = current.clone();
        let duration = moved.duration_frames();
        moved.start_frame = new_start;
        moved.end_frame = new_start + duration;
        if let Some(index) = new_track_index {
            moved.track_index = index;
        }

        self.replace_clip(moved)
    }

    /// Changes the timeline range of a clip. Moving the start shifts the
    /// in-point by the same amount so the visible media stays anchored.
    pub fn trim_clip(
        &mut self,
        clip_id: &str,
        new_start: Frame,
        new_end: Frame,
    ) -> Result<(), TimelineError> {
        if new_start < 0 || new_end <= new_start {
            return Err(TimelineError::InvalidOp(format!(
                "invalid trim range {new_start}..{new_end} for clip {clip_id}"
            )));
        }
        let current = self
            .clip(clip_id)
            .ok_or_else(|| TimelineError::ClipNotFound(clip_id.to_string()))?;

        let mut trimmed = current.clone();
        let in_point = trimmed.in_point_frame + (new_start - trimmed.start_frame);
        if in_point < 0 {
            return Err(TimelineError::InvalidOp(format!(
                "trim would move clip {clip_id} before the start of its source"
            )));
        }
        trimmed.in_point_frame = in_point;
        trimmed.start_frame = new_start;
        trimmed.end_frame = new_end;

        self.replace_clip(trimmed)
    }

    /// Appends an effect to the end of a clip's effect chain.
    pub fn add_effect(&mut self, clip_id: &str, effect: Effect) -> Result<(), TimelineError> {
        let (ti, ci) = self
            .locate(clip_id)
            .ok_or_else(|| TimelineError::ClipNotFound(clip_id.to_string()))?;
        self.tracks[ti].clips[ci].effects.push(effect);
        Ok(())
    }

    pub fn remove_effect(&mut self, clip_id: &str, index: usize) -> Result<Effect, TimelineError> {
        let (ti, ci) = self
            .locate(clip_id)
            .ok_or_else(|| TimelineError::ClipNotFound(clip_id.to_string()))?;
        let effects = &mut self.tracks[ti].clips[ci].effects;
        if index >= effects.len() {
            return Err(TimelineError::EffectNotFound {
                clip: clip_id.to_string(),
                index,
            });
        }
        Ok(effects.remove(index))
    }

    /// Swaps in an updated copy of an existing clip after checking its target range.
    fn replace_clip(&mut self, updated: Clip) -> Result<(), TimelineError> {
        self.check_free(&updated)?;
        let (ti, ci) = self
            .locate(&updated.id)
            .ok_or_else(|| TimelineError::ClipNotFound(updated.id.clone()))?;
        self.tracks[ti].clips.remove(ci);
        self.drop_empty_tracks();
        self.place_clip(updated);
        Ok(())
    }

    fn check_free(&self, clip: &Clip) -> Result<(), TimelineError> {
        let Some(track) = self.track(clip.track_type, clip.track_index) else {
            return Ok(());
        };
        match track.find_overlap(clip) {
            Some(other) => Err(overlap_error(clip, &other.id, clip.track_type, clip.track_index)),
            None => Ok(()),
        }
    }
}

fn overlap_error(clip: &Clip, other: &str, track_type: TrackType, track_index: u32) -> TimelineError {
    TimelineError::Overlap {
        clip: clip.id.clone(),
        other: other.to_string(),
        track_type,
        track_index,
    }
}
