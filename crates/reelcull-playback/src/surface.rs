//! Render surface port.

use parking_lot::Mutex;
use reelcull_core::SharedFrame;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque drawable target for engine output. The shell owns the real
/// implementation; the core only pushes frames at it.
pub trait RenderSurface: Send + Sync {
    fn present(&self, frame: SharedFrame);
}

/// Discards every frame.
#[derive(Debug, Default)]
pub struct NullSurface;

impl RenderSurface for NullSurface {
    fn present(&self, _frame: SharedFrame) {}
}

/// Keeps the last presented frame and a present count, for tests.
#[derive(Default)]
pub struct CaptureSurface {
    last: Mutex<Option<SharedFrame>>,
    presented: AtomicU64,
}

impl CaptureSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> Option<SharedFrame> {
        self.last.lock().clone()
    }

    pub fn presented_count(&self) -> u64 {
        self.presented.load(Ordering::SeqCst)
    }
}

impl RenderSurface for CaptureSurface {
    fn present(&self, frame: SharedFrame) {
        self.presented.fetch_add(1, Ordering::SeqCst);
        *self.last.lock() = Some(frame);
    }
}
