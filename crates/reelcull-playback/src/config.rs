//! Tunables for playback sessions and the preview service.

use reelcull_core::defaults;
use serde::{Deserialize, Serialize};

/// Playback-side tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Engines kept in the pool.
    pub pool_capacity: usize,
    /// Position update rate while playing (Hz).
    pub tick_hz: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            pool_capacity: defaults::POOL_CAPACITY,
            tick_hz: defaults::POSITION_TICK_HZ,
        }
    }
}

/// Preview-side tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Concurrent decodes allowed for throttled requests. Immediate
    /// requests bypass this bound.
    pub throttled_concurrency: usize,
    /// Byte budget for the decoded-frame cache.
    pub cache_bytes: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            throttled_concurrency: defaults::PREVIEW_CONCURRENCY,
            cache_bytes: defaults::PREVIEW_CACHE_BYTES,
        }
    }
}
