//! Frame <-> seconds conversion for a floating frame rate.
//!
//! Seconds are converted to frames with round-half-away-from-zero (`f64::round`),
//! so a value survives repeated round trips without drifting by truncation.

use crate::Frame;

pub const MIN_FRAME_RATE: f64 = 1.0;
pub const MAX_FRAME_RATE: f64 = 120.0;
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Converts a position in seconds to the nearest whole frame.
pub fn seconds_to_frames(seconds: f64, frame_rate: f64) -> Frame {
    (seconds * frame_rate).round() as Frame
}

/// Converts a frame index back to seconds.
pub fn frames_to_seconds(frame: Frame, frame_rate: f64) -> f64 {
    frame as f64 / frame_rate
}

/// Length of a single frame in seconds.
pub fn one_frame_seconds(frame_rate: f64) -> f64 {
    1.0 / frame_rate
}

pub fn is_supported_frame_rate(frame_rate: f64) -> bool {
    frame_rate.is_finite() && (MIN_FRAME_RATE..=MAX_FRAME_RATE).contains(&frame_rate)
}

/// Returns a usable frame rate and whether the input had to be replaced.
///
/// Out-of-range or non-finite values fall back to [`DEFAULT_FRAME_RATE`].
pub fn clamp_frame_rate(frame_rate: f64) -> (f64, bool) {
    if is_supported_frame_rate(frame_rate) {
        (frame_rate, false)
    } else {
        (DEFAULT_FRAME_RATE, true)
    }
}
