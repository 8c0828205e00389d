//! Source probing: turn an opaque locator into stream metadata.

use reelcull_core::{FrameRate, RationalTime, ReelCullError, Result, SourceLocator};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Limits a probe will accept before declaring the source broken.
const MAX_DIMENSION: u32 = 8192;
const MIN_DIMENSION: u32 = 8;
const MAX_DURATION_SECS: f64 = 86_400.0;

/// Metadata for a single playable source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProbe {
    /// The locator this probe resolved
    pub locator: SourceLocator,
    /// Clip duration
    pub duration: RationalTime,
    /// Native frame rate
    pub frame_rate: FrameRate,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl SourceProbe {
    /// Resolve a locator.
    ///
    /// Two forms are understood today: the in-memory fixture scheme
    /// `mem:<name>?dur=<secs>&fps=<n>&w=<px>&h=<px>` (used by tests and
    /// the demo), and a path to an existing file. Anything else is a
    /// missing source.
    pub fn probe(locator: &SourceLocator) -> Result<Self> {
        let raw = locator.as_str();
        if let Some(rest) = raw.strip_prefix("mem:") {
            return Self::parse_mem(locator, rest);
        }

        let path = Path::new(raw);
        if !path.exists() {
            return Err(ReelCullError::ResourceUnavailable(format!(
                "source not found: {raw}"
            )));
        }

        // For now, file sources get placeholder metadata.
        // In a real implementation, we would probe with ffprobe via
        // ffmpeg-sidecar.
        Ok(Self {
            locator: locator.clone(),
            duration: RationalTime::from_seconds_f64(10.0),
            frame_rate: FrameRate::FPS_24,
            width: 1920,
            height: 1080,
        })
    }

    fn parse_mem(locator: &SourceLocator, rest: &str) -> Result<Self> {
        let bad = |detail: &str| {
            ReelCullError::ResourceUnavailable(format!(
                "malformed mem locator {}: {detail}",
                locator.as_str()
            ))
        };

        let (name, query) = match rest.split_once('?') {
            Some((n, q)) => (n, q),
            None => (rest, ""),
        };
        if name.is_empty() {
            return Err(bad("empty name"));
        }

        let mut duration_secs = 10.0_f64;
        let mut fps = 30_u32;
        let mut width = 1280_u32;
        let mut height = 720_u32;

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| bad(pair))?;
            match key {
                "dur" => {
                    duration_secs = value.parse().map_err(|_| bad(pair))?;
                }
                "fps" => {
                    fps = value.parse().map_err(|_| bad(pair))?;
                }
                "w" => {
                    width = value.parse().map_err(|_| bad(pair))?;
                }
                "h" => {
                    height = value.parse().map_err(|_| bad(pair))?;
                }
                _ => return Err(bad(pair)),
            }
        }

        if !(duration_secs > 0.0 && duration_secs <= MAX_DURATION_SECS) {
            return Err(bad("duration out of range"));
        }
        if fps == 0 || fps > 240 {
            return Err(bad("fps out of range"));
        }
        if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&width)
            || !(MIN_DIMENSION..=MAX_DIMENSION).contains(&height)
        {
            return Err(bad("dimensions out of range"));
        }

        Ok(Self {
            locator: locator.clone(),
            duration: RationalTime::from_seconds_f64(duration_secs),
            frame_rate: FrameRate::new(fps, 1),
            width,
            height,
        })
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.duration.to_seconds_f64()
    }

    /// Total frame count at the native rate.
    pub fn frame_count(&self) -> i64 {
        self.duration.to_frames(self.frame_rate).max(1)
    }
}
