//! ReelCull Playback - Review sessions and frame delivery
//!
//! This crate handles:
//! - The review session controller (bind, transport, trim, flags)
//! - The capped pool of reusable playback engines
//! - On-demand preview frames for filmstrips and scrubbing
//! - Review persistence and render surface ports

pub mod config;
pub mod controller;
pub mod engine;
pub mod pool;
pub mod preview;
pub mod store;
pub mod surface;

pub use config::{PlaybackConfig, PreviewConfig};
pub use controller::{
    ControllerEvent, MediaPlaybackController, PlaybackState, StepDirection,
};
pub use engine::{EngineContent, EngineEvent, EngineId, PlaybackEngine};
pub use pool::{EngineHandle, EngineLease, EnginePool};
pub use preview::{
    FramePreviewService, MediaPreviewDecoder, PreviewClass, PreviewDecoder, PreviewRequest,
    PreviewStats, PreviewTicket,
};
pub use store::{JsonStore, MemoryStore, ReviewRecord, ReviewStore};
pub use surface::{CaptureSurface, NullSurface, RenderSurface};
