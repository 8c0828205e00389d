//! Clip decoding via FFmpeg through ffmpeg-sidecar.

use crate::probe::SourceProbe;
use parking_lot::Mutex;
use reelcull_core::{Color, FrameBuffer, FrameRate, Result, SourceLocator};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::info;

/// Random-access decoder for one source.
///
/// Uses ffmpeg-sidecar to spawn FFmpeg as a subprocess, which works
/// without system FFmpeg development headers. Until that wiring lands,
/// frames are synthesized deterministically from the locator and frame
/// index: the same request always yields the identical buffer, and the
/// frame index is stamped into the first pixels so tests can identify
/// exactly which frame was delivered.
pub struct ClipDecoder {
    probe: SourceProbe,
    seed: u64,
}

impl ClipDecoder {
    /// Open a source for decoding.
    pub fn open(locator: &SourceLocator) -> Result<Self> {
        let probe = SourceProbe::probe(locator)?;
        info!(
            locator = %locator,
            duration = %probe.duration,
            rate = %probe.frame_rate,
            "opened source"
        );
        Ok(Self {
            seed: hash64(locator.as_str()),
            probe,
        })
    }

    /// Stream metadata for this source.
    pub fn probe(&self) -> &SourceProbe {
        &self.probe
    }

    /// Native dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.probe.width, self.probe.height)
    }

    /// Native frame rate.
    pub fn frame_rate(&self) -> FrameRate {
        self.probe.frame_rate
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.probe.duration_secs()
    }

    /// The frame index presented at `secs`, clamped to the stream.
    pub fn frame_index_at(&self, secs: f64) -> i64 {
        let fps = self.probe.frame_rate.to_fps_f64();
        let index = (secs.max(0.0) * fps).floor() as i64;
        index.min(self.probe.frame_count() - 1)
    }

    /// Decode the frame presented at `secs` at native size. Times
    /// outside the stream clamp to the first/last frame.
    pub fn decode_at(&self, secs: f64) -> Result<FrameBuffer> {
        let index = self.frame_index_at(secs);
        Ok(self.render_frame(index, self.probe.width, self.probe.height))
    }

    /// Decode the frame presented at `secs`, aspect-fit into `max`
    /// (width, height). Never upscales.
    pub fn decode_scaled(&self, secs: f64, max: Option<(u32, u32)>) -> Result<FrameBuffer> {
        let (width, height) = match max {
            Some((mw, mh)) => fit_within(self.probe.width, self.probe.height, mw, mh),
            None => (self.probe.width, self.probe.height),
        };
        let index = self.frame_index_at(secs);
        Ok(self.render_frame(index, width, height))
    }

    /// Read back the frame index a decoded frame was stamped with.
    pub fn stamped_index(frame: &FrameBuffer) -> Option<i64> {
        let bytes: [u8; 8] = frame.data().get(0..8)?.try_into().ok()?;
        Some(u64::from_le_bytes(bytes) as i64)
    }

    // A two-color vertical gradient keyed to the source, a white sweep
    // column that moves with the frame index, and the index stamped
    // into the first two pixels.
    fn render_frame(&self, index: i64, width: u32, height: u32) -> FrameBuffer {
        let mut frame = FrameBuffer::new(width, height);
        let top = seed_color(self.seed);
        let bottom = seed_color(hash64((self.seed, 0xb0u8)));
        let sweep_x = ((index as u64).wrapping_mul(7) % width as u64) as u32;

        for y in 0..height {
            let t = y as f32 / height.max(1) as f32;
            let px = top.lerp(bottom, t).to_rgba8();
            for chunk in frame.row_mut(y).chunks_exact_mut(4) {
                chunk.copy_from_slice(&px);
            }
        }
        for y in 0..height {
            frame.set_pixel(sweep_x, y, Color::WHITE);
        }

        frame.data_mut()[0..8].copy_from_slice(&(index as u64).to_le_bytes());
        frame
    }
}

/// Default cap on decoders held open at once.
const MAX_OPEN_DECODERS: usize = 64;

/// Open decoders, shared per locator and capped.
///
/// Opening is cheap for fixtures but will not be once the sidecar path
/// lands, and preview traffic hits the same few sources repeatedly
/// while scrubbing. Once the cap is reached the least recently used
/// decoder is dropped; outstanding `Arc`s stay valid. Failures are not
/// cached; a missing file is retried on the next request.
pub struct DecoderCache {
    state: Mutex<OpenDecoders>,
    capacity: usize,
}

#[derive(Default)]
struct OpenDecoders {
    by_locator: HashMap<SourceLocator, Arc<ClipDecoder>>,
    lru_order: Vec<SourceLocator>,
}

impl Default for DecoderCache {
    fn default() -> Self {
        Self::with_capacity(MAX_OPEN_DECODERS)
    }
}

impl DecoderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `capacity` open decoders.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(OpenDecoders::default()),
            capacity: capacity.max(1),
        }
    }

    /// Fetch the shared decoder for a locator, opening it on first use.
    pub fn get_or_open(&self, locator: &SourceLocator) -> Result<Arc<ClipDecoder>> {
        {
            let mut state = self.state.lock();
            if let Some(found) = state.by_locator.get(locator).cloned() {
                state.lru_order.retain(|k| k != locator);
                state.lru_order.push(locator.clone());
                return Ok(found);
            }
        }
        let opened = Arc::new(ClipDecoder::open(locator)?);
        let mut state = self.state.lock();
        state.lru_order.retain(|k| k != locator);
        state.lru_order.push(locator.clone());
        state.by_locator.insert(locator.clone(), Arc::clone(&opened));
        while state.by_locator.len() > self.capacity {
            let oldest = state.lru_order.remove(0);
            state.by_locator.remove(&oldest);
        }
        Ok(opened)
    }

    /// Drop the cached decoder for a locator, if any.
    pub fn evict(&self, locator: &SourceLocator) {
        let mut state = self.state.lock();
        state.by_locator.remove(locator);
        state.lru_order.retain(|k| k != locator);
    }

    pub fn len(&self) -> usize {
        self.state.lock().by_locator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().by_locator.is_empty()
    }
}

fn hash64(value: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

// Mid-range channels so the sweep column and the stamp stay visible
// against the gradient.
fn seed_color(seed: u64) -> Color {
    let channel = |shift: u64| 0.15 + ((seed >> shift) & 0xff) as f32 / 255.0 * 0.7;
    Color::rgb(channel(0), channel(8), channel(16))
}

fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    let scale = (max_w as f64 / width as f64)
        .min(max_h as f64 / height as f64)
        .min(1.0);
    let fitted_w = ((width as f64 * scale).round() as u32).max(2);
    let fitted_h = ((height as f64 * scale).round() as u32).max(2);
    (fitted_w, fitted_h)
}
