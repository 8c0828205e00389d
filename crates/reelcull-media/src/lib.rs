//! ReelCull Media - FFmpeg integration for source I/O
//!
//! This crate handles:
//! - Resolving opaque source locators
//! - Probing stream metadata
//! - Random-access frame decode for playback and previews

pub mod decoder;
pub mod probe;

pub use decoder::{ClipDecoder, DecoderCache};
pub use probe::SourceProbe;

/// Initialize the media layer (call once at startup).
pub fn init() {
    tracing::info!("ReelCull media layer initialized");
}
