//! Pool of reusable playback engines.
//!
//! Engines are expensive to hold, so a small arena caps how many exist
//! at once. A lease hands out one engine and a release token; the
//! token carries the slot's generation, so releasing twice (or through
//! a handle that outlived a reuse) is a safe no-op.

use crate::config::PlaybackConfig;
use crate::engine::PlaybackEngine;
use parking_lot::Mutex;
use reelcull_core::{ReelCullError, Result};
use std::sync::Arc;
use tracing::debug;

/// Release token for one leased engine. Valid for exactly one release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineHandle {
    slot: usize,
    generation: u32,
}

/// One acquired engine plus its release token.
pub struct EngineLease {
    pub handle: EngineHandle,
    pub engine: Arc<PlaybackEngine>,
}

impl std::fmt::Debug for EngineLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineLease")
            .field("handle", &self.handle)
            .field("engine", &self.engine.id())
            .finish()
    }
}

struct Slot {
    engine: Arc<PlaybackEngine>,
    generation: u32,
    leased: bool,
}

struct PoolInner {
    slots: Vec<Slot>,
    capacity: usize,
}

/// Capped arena of playback engines.
pub struct EnginePool {
    inner: Mutex<PoolInner>,
    tick_hz: u32,
}

impl EnginePool {
    pub fn new(config: &PlaybackConfig) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                slots: Vec::new(),
                capacity: config.pool_capacity.max(1),
            }),
            tick_hz: config.tick_hz,
        }
    }

    /// Lease an engine: an idle one if any exists, a fresh one while
    /// under capacity, otherwise `ResourceUnavailable`.
    pub fn acquire(&self) -> Result<EngineLease> {
        let mut inner = self.inner.lock();

        if let Some((index, slot)) = inner
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| !slot.leased)
        {
            slot.leased = true;
            return Ok(EngineLease {
                handle: EngineHandle {
                    slot: index,
                    generation: slot.generation,
                },
                engine: Arc::clone(&slot.engine),
            });
        }

        if inner.slots.len() < inner.capacity {
            let engine = Arc::new(PlaybackEngine::new(self.tick_hz));
            let index = inner.slots.len();
            debug!(engine = %engine.id(), slot = index, "engine allocated");
            inner.slots.push(Slot {
                engine: Arc::clone(&engine),
                generation: 0,
                leased: true,
            });
            return Ok(EngineLease {
                handle: EngineHandle {
                    slot: index,
                    generation: 0,
                },
                engine,
            });
        }

        Err(ReelCullError::ResourceUnavailable(format!(
            "all {} playback engines leased",
            inner.capacity
        )))
    }

    /// Return a leased engine. The engine is reset to idle before its
    /// slot becomes reusable. Returns false when the token is stale
    /// (already released, or from a previous lease of the slot).
    pub fn release(&self, handle: &EngineHandle) -> bool {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.slots.get_mut(handle.slot) else {
            return false;
        };
        if slot.generation != handle.generation || !slot.leased {
            debug!(slot = handle.slot, "stale engine release ignored");
            return false;
        }

        slot.engine.reset();
        slot.generation = slot.generation.wrapping_add(1);
        slot.leased = false;
        true
    }

    /// Engines allocated so far (leased or idle).
    pub fn engine_count(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Engines currently leased out.
    pub fn leased_count(&self) -> usize {
        self.inner.lock().slots.iter().filter(|s| s.leased).count()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }
}
