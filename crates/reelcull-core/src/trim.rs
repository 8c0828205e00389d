//! Normalized trim bounds for a clip under review.
//!
//! Trim handles are stored as fractions of the clip duration so they
//! survive re-probes that change the reported duration slightly. The
//! pair always satisfies `0.0 <= start <= end - MIN_TRIM_SPAN` and
//! `end <= 1.0`; every mutation clamps rather than errors.

use crate::time::{RationalTime, TimeRange};
use serde::{Deserialize, Serialize};

/// Smallest allowed distance between the trim handles.
pub const MIN_TRIM_SPAN: f64 = 0.01;

/// An in/out point pair as normalized fractions of clip duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTrimBounds")]
pub struct TrimBounds {
    start: f64,
    end: f64,
}

impl TrimBounds {
    /// The whole clip.
    pub const FULL: Self = Self {
        start: 0.0,
        end: 1.0,
    };

    /// Build bounds from possibly dirty values (persisted data, user
    /// input). Reversed handles are swapped, everything is clamped to
    /// [0, 1], and the minimum span is restored end-first.
    pub fn new(start: f64, end: f64) -> Self {
        let (a, b) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };
        let mut start = if a.is_finite() { a.clamp(0.0, 1.0) } else { 0.0 };
        let mut end = if b.is_finite() { b.clamp(0.0, 1.0) } else { 1.0 };
        if end - start < MIN_TRIM_SPAN {
            end = (start + MIN_TRIM_SPAN).min(1.0);
            if end - start < MIN_TRIM_SPAN {
                start = end - MIN_TRIM_SPAN;
            }
        }
        Self { start, end }
    }

    /// Normalized in point.
    #[inline]
    pub fn start(self) -> f64 {
        self.start
    }

    /// Normalized out point.
    #[inline]
    pub fn end(self) -> f64 {
        self.end
    }

    /// Fraction of the clip inside the window.
    #[inline]
    pub fn span(self) -> f64 {
        self.end - self.start
    }

    /// Move the in point. Clamped so it can never push the out point.
    pub fn with_start(self, value: f64) -> Self {
        let value = if value.is_finite() { value } else { self.start };
        Self {
            start: value.clamp(0.0, self.end - MIN_TRIM_SPAN),
            end: self.end,
        }
    }

    /// Move the out point. Clamped so it can never cross the in point.
    pub fn with_end(self, value: f64) -> Self {
        let value = if value.is_finite() { value } else { self.end };
        Self {
            start: self.start,
            end: value.clamp(self.start + MIN_TRIM_SPAN, 1.0),
        }
    }

    /// Is `position` inside the window? Both edges are inclusive; a
    /// playhead parked exactly on the out point is legal.
    #[inline]
    pub fn contains(self, position: f64) -> bool {
        position >= self.start && position <= self.end
    }

    /// Clamp a normalized position into the window.
    #[inline]
    pub fn clamp(self, position: f64) -> f64 {
        if position.is_nan() {
            return self.start;
        }
        position.clamp(self.start, self.end)
    }

    /// True when the window covers the whole clip.
    #[inline]
    pub fn is_full(self) -> bool {
        self.start == 0.0 && self.end == 1.0
    }

    /// The window in clip time for a clip of the given duration.
    pub fn to_time_range(self, duration: RationalTime) -> TimeRange {
        let secs = duration.to_seconds_f64();
        TimeRange::from_start_end(
            RationalTime::from_seconds_f64(self.start * secs),
            RationalTime::from_seconds_f64(self.end * secs),
        )
    }
}

impl Default for TrimBounds {
    fn default() -> Self {
        Self::FULL
    }
}

/// Wire shape for [`TrimBounds`]. Deserialized values pass through
/// [`TrimBounds::new`], so a hand-edited sidecar cannot smuggle in
/// reversed or degenerate handles.
#[derive(Deserialize)]
struct RawTrimBounds {
    start: f64,
    end: f64,
}

impl From<RawTrimBounds> for TrimBounds {
    fn from(raw: RawTrimBounds) -> Self {
        Self::new(raw.start, raw.end)
    }
}
