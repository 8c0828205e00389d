//! The pooled decode/present unit a playback session drives.
//!
//! An engine owns no policy: it plays from its current position toward
//! an armed boundary, streams position events, and pushes rendered
//! frames at an attached surface. Trim semantics, persistence, and
//! fallback behavior all live in the session layer above.
//!
//! Position is derived from the tokio clock, so transport state never
//! drifts between the ticker task and synchronous readers.

use crate::surface::RenderSurface;
use parking_lot::Mutex;
use reelcull_color::RenderGraph;
use reelcull_media::ClipDecoder;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, warn};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of one pooled engine, stable across reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(u64);

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine-{}", self.0)
    }
}

/// Events streamed to the bound session while the transport runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    /// Emitted each tick while playing, tagged with the epoch of the
    /// transport run that produced it. An event whose epoch no longer
    /// matches [`PlaybackEngine::transport_epoch`] predates a rebase.
    Position { secs: f64, epoch: u64 },
    /// Emitted once when playback reaches the armed boundary.
    Boundary { limit_secs: f64 },
}

/// Everything a session hands the engine at attach time.
pub struct EngineContent {
    pub decoder: Arc<ClipDecoder>,
    pub graph: Option<RenderGraph>,
    pub events: UnboundedSender<EngineEvent>,
    pub surface: Option<Arc<dyn RenderSurface>>,
    /// Position the boundary event fires at (seconds).
    pub boundary_secs: f64,
    /// Starting position (seconds).
    pub start_secs: f64,
}

#[derive(Clone, Copy)]
enum Transport {
    Stopped,
    Playing { base_secs: f64, started: Instant },
}

struct Loaded {
    decoder: Arc<ClipDecoder>,
    graph: Option<RenderGraph>,
    duration_secs: f64,
}

struct EngineInner {
    content: Option<Loaded>,
    transport: Transport,
    position_secs: f64,
    boundary_secs: f64,
    events: Option<UnboundedSender<EngineEvent>>,
    surface: Option<Arc<dyn RenderSurface>>,
    ticker: Option<JoinHandle<()>>,
    /// Bumped on every transport change; a ticker from an older epoch
    /// exits without touching anything.
    epoch: u64,
    tick_hz: u32,
}

impl EngineInner {
    fn duration_secs(&self) -> f64 {
        self.content.as_ref().map(|c| c.duration_secs).unwrap_or(0.0)
    }

    fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }

    fn effective_boundary(&self) -> f64 {
        self.boundary_secs.min(self.duration_secs())
    }

    fn live_position(&self) -> f64 {
        match self.transport {
            Transport::Stopped => self.position_secs,
            Transport::Playing { base_secs, started } => {
                (base_secs + started.elapsed().as_secs_f64()).min(self.effective_boundary())
            }
        }
    }
}

enum Tick {
    Stale,
    Finished,
    Silent,
    Render {
        decoder: Arc<ClipDecoder>,
        graph: Option<RenderGraph>,
        surface: Arc<dyn RenderSurface>,
        secs: f64,
    },
}

pub struct PlaybackEngine {
    id: EngineId,
    inner: Arc<Mutex<EngineInner>>,
}

impl PlaybackEngine {
    pub(crate) fn new(tick_hz: u32) -> Self {
        Self {
            id: EngineId(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed)),
            inner: Arc::new(Mutex::new(EngineInner {
                content: None,
                transport: Transport::Stopped,
                position_secs: 0.0,
                boundary_secs: 0.0,
                events: None,
                surface: None,
                ticker: None,
                epoch: 0,
                tick_hz,
            })),
        }
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    /// Load content and present the first frame at the start position.
    /// Replaces whatever was attached before.
    pub fn attach(&self, content: EngineContent) {
        let EngineContent {
            decoder,
            graph,
            events,
            surface,
            boundary_secs,
            start_secs,
        } = content;
        let duration = decoder.duration_secs();
        let start = start_secs.clamp(0.0, duration);

        let ticker = {
            let mut inner = self.inner.lock();
            inner.transport = Transport::Stopped;
            inner.epoch += 1;
            inner.position_secs = start;
            inner.boundary_secs = boundary_secs.clamp(0.0, duration);
            inner.content = Some(Loaded {
                decoder: Arc::clone(&decoder),
                graph: graph.clone(),
                duration_secs: duration,
            });
            inner.events = Some(events);
            inner.surface = surface.clone();
            inner.ticker.take()
        };
        if let Some(ticker) = ticker {
            ticker.abort();
        }

        if let Some(surface) = surface {
            present_frame(&decoder, graph.as_ref(), surface.as_ref(), start);
        }
        debug!(engine = %self.id, start_secs = start, "content attached");
    }

    /// Start the transport from the current position. No-op while
    /// already playing or with nothing attached.
    pub fn play(&self) {
        let (epoch, period) = {
            let mut inner = self.inner.lock();
            if inner.content.is_none() {
                debug!(engine = %self.id, "play ignored, no content attached");
                return;
            }
            if matches!(inner.transport, Transport::Playing { .. }) {
                return;
            }
            inner.epoch += 1;
            inner.transport = Transport::Playing {
                base_secs: inner.position_secs,
                started: Instant::now(),
            };
            (inner.epoch, inner.tick_period())
        };
        self.spawn_ticker(epoch, period);
        debug!(engine = %self.id, "playing");
    }

    /// Stop the transport, freezing position where the clock stands.
    pub fn pause(&self) {
        let ticker = {
            let mut inner = self.inner.lock();
            inner.position_secs = inner.live_position();
            inner.transport = Transport::Stopped;
            inner.epoch += 1;
            inner.ticker.take()
        };
        if let Some(ticker) = ticker {
            ticker.abort();
        }
    }

    /// Move to a position in seconds, clamped to the content duration.
    /// While playing the transport rebases under a fresh epoch and
    /// keeps running; while stopped the seeked frame is presented
    /// immediately.
    pub fn seek_secs(&self, secs: f64) {
        let (render, respawn) = {
            let mut inner = self.inner.lock();
            let target = secs.clamp(0.0, inner.duration_secs());
            inner.position_secs = target;
            match inner.transport {
                Transport::Playing { .. } => {
                    inner.epoch += 1;
                    inner.transport = Transport::Playing {
                        base_secs: target,
                        started: Instant::now(),
                    };
                    (None, Some((inner.epoch, inner.tick_period())))
                }
                Transport::Stopped => match (&inner.content, &inner.surface) {
                    (Some(content), Some(surface)) => (
                        Some((
                            Arc::clone(&content.decoder),
                            content.graph.clone(),
                            Arc::clone(surface),
                            target,
                        )),
                        None,
                    ),
                    _ => (None, None),
                },
            }
        };
        if let Some((epoch, period)) = respawn {
            self.spawn_ticker(epoch, period);
        }
        if let Some((decoder, graph, surface, secs)) = render {
            present_frame(&decoder, graph.as_ref(), surface.as_ref(), secs);
        }
    }

    /// Re-arm the position the boundary event fires at.
    pub fn set_boundary(&self, secs: f64) {
        let mut inner = self.inner.lock();
        inner.boundary_secs = secs.clamp(0.0, inner.duration_secs());
    }

    /// Current position in seconds, clock-derived while playing.
    pub fn position_secs(&self) -> f64 {
        self.inner.lock().live_position()
    }

    /// Epoch of the current transport run. Position events from an
    /// earlier epoch were produced before the last rebase.
    pub fn transport_epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.inner.lock().transport, Transport::Playing { .. })
    }

    /// Detach everything and return to idle. Called on release back to
    /// the pool.
    pub fn reset(&self) {
        let ticker = {
            let mut inner = self.inner.lock();
            inner.transport = Transport::Stopped;
            inner.epoch += 1;
            inner.position_secs = 0.0;
            inner.boundary_secs = 0.0;
            inner.content = None;
            inner.events = None;
            inner.surface = None;
            inner.ticker.take()
        };
        if let Some(ticker) = ticker {
            ticker.abort();
        }
        debug!(engine = %self.id, "reset to idle");
    }

    fn spawn_ticker(&self, epoch: u64, period: Duration) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                match advance_transport(&inner, epoch) {
                    Tick::Stale | Tick::Finished => return,
                    Tick::Silent => {}
                    Tick::Render {
                        decoder,
                        graph,
                        surface,
                        secs,
                    } => present_frame(&decoder, graph.as_ref(), surface.as_ref(), secs),
                }
            }
        });
        let old = self.inner.lock().ticker.replace(handle);
        if let Some(old) = old {
            old.abort();
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if let Some(ticker) = self.inner.lock().ticker.take() {
            ticker.abort();
        }
    }
}

/// One transport tick: update position, emit events, decide whether a
/// frame render is due. Decoding happens outside the lock.
fn advance_transport(inner: &Mutex<EngineInner>, epoch: u64) -> Tick {
    let mut inner = inner.lock();
    if inner.epoch != epoch {
        return Tick::Stale;
    }
    let Transport::Playing { base_secs, started } = inner.transport else {
        return Tick::Stale;
    };
    let duration = match inner.content.as_ref() {
        Some(content) => content.duration_secs,
        None => return Tick::Stale,
    };

    let boundary = inner.boundary_secs.min(duration);
    let position = base_secs + started.elapsed().as_secs_f64();

    if position >= boundary {
        inner.position_secs = boundary;
        inner.transport = Transport::Stopped;
        inner.epoch += 1;
        if let Some(events) = &inner.events {
            let _ = events.send(EngineEvent::Boundary {
                limit_secs: boundary,
            });
        }
        return Tick::Finished;
    }

    inner.position_secs = position;
    if let Some(events) = &inner.events {
        let _ = events.send(EngineEvent::Position {
            secs: position,
            epoch,
        });
    }
    match (&inner.content, &inner.surface) {
        (Some(content), Some(surface)) => Tick::Render {
            decoder: Arc::clone(&content.decoder),
            graph: content.graph.clone(),
            surface: Arc::clone(surface),
            secs: position,
        },
        _ => Tick::Silent,
    }
}

fn present_frame(
    decoder: &ClipDecoder,
    graph: Option<&RenderGraph>,
    surface: &dyn RenderSurface,
    secs: f64,
) {
    match decoder.decode_at(secs) {
        Ok(mut frame) => {
            if let Some(graph) = graph {
                graph.process(&mut frame);
            }
            surface.present(Arc::new(frame));
        }
        Err(err) => warn!(error = %err, secs, "frame decode failed"),
    }
}
