//! ReelCull Core - Foundation types for the clip review tool
//!
//! This crate provides the fundamental types used throughout ReelCull:
//! - Time representation (RationalTime, FrameRate, TimeRange)
//! - Normalized trim bounds with their clamping rules
//! - RGBA frame buffers and colors
//! - Asset identities and the error taxonomy

pub mod asset;
pub mod color;
pub mod error;
pub mod frame;
pub mod time;
pub mod trim;

pub use asset::{AssetId, MediaAsset, SourceLocator, TransformId};
pub use color::Color;
pub use error::{ReelCullError, Result};
pub use frame::{FrameBuffer, SharedFrame};
pub use time::{FrameRate, RationalTime, TimeRange};
pub use trim::{TrimBounds, MIN_TRIM_SPAN};

/// Tuning defaults for a single-seat review workstation
pub mod defaults {
    use crate::time::FrameRate;

    /// Playback engines kept warm in the pool
    pub const POOL_CAPACITY: usize = 4;

    /// Concurrent throttled preview decodes
    pub const PREVIEW_CONCURRENCY: usize = 4;

    /// Position observer tick rate while playing (Hz)
    pub const POSITION_TICK_HZ: u32 = 30;

    /// Preview frame cache budget (1080p RGBA is ~8MB per frame)
    pub const PREVIEW_CACHE_BYTES: usize = 256 * 1024 * 1024; // 256 MB

    /// Presentation cadence of the render path, independent of source rate
    pub const OUTPUT_RATE: FrameRate = FrameRate::FPS_30;
}
