//! The review session controller.
//!
//! One controller per review surface, owning at most one bound clip.
//! All methods run on the owning thread; the engine talks back through
//! an event channel that `pump()` folds into session state, so state
//! transitions and observer callbacks never race the ticker.

use crate::engine::{EngineContent, EngineEvent, EngineId, PlaybackEngine};
use crate::pool::{EngineLease, EnginePool};
use crate::store::ReviewStore;
use crate::surface::RenderSurface;
use reelcull_color::{
    build_render_graph, resolve_transform, StreamGeometry, StreamGeometrySource, TransformResolver,
};
use reelcull_core::{FrameBuffer, FrameRate, MediaAsset, TransformId, TrimBounds};
use reelcull_media::ClipDecoder;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

/// Poster dimensions when the source never opened and the real frame
/// size is unknown.
const POSTER_WIDTH: u32 = 640;
const POSTER_HEIGHT: u32 = 360;

/// Floor for the play-restart window, for sources with very long
/// durations where one frame rounds to nearly zero.
const MIN_RESTART_EPSILON: f64 = 1e-4;

/// Tolerance when matching a boundary event against the armed trim
/// end, both derived from the same product of trim and duration.
const BOUNDARY_TOLERANCE: f64 = 1e-6;

/// Where the review session stands. Positions are normalized fractions
/// of the clip duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackState {
    Unbound,
    Paused { position: f64 },
    Playing { position: f64 },
}

/// What `pump()` reports back to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    StateChanged(PlaybackState),
    PositionChanged { position: f64 },
    /// Playback ran into the trim end and snapped back to the start.
    ReachedTrimEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Forward,
    Backward,
}

/// Writes that failed and wait for a retry. The in-memory session
/// stays authoritative either way.
#[derive(Debug, Default)]
struct StagedWrites {
    trim: bool,
    flag: bool,
}

struct EngineLink {
    lease: EngineLease,
    events: UnboundedReceiver<EngineEvent>,
}

struct Session {
    asset: MediaAsset,
    /// None for a no-playback session (pool exhausted or source
    /// unreadable); stills and review edits keep working.
    link: Option<EngineLink>,
    duration_secs: f64,
    frame_rate: FrameRate,
    trim: TrimBounds,
    playing: bool,
    /// Normalized position, authoritative between engine ticks.
    position: f64,
    /// Normalized trim end the engine boundary is armed at; a boundary
    /// event for any other value is stale.
    armed_end: f64,
    gesture_depth: u32,
    gesture_dirty: bool,
    staged: StagedWrites,
}

impl Session {
    fn fallback(asset: MediaAsset, surface: &dyn RenderSurface) -> Self {
        surface.present(Arc::new(FrameBuffer::poster(POSTER_WIDTH, POSTER_HEIGHT)));
        let trim = asset.trim;
        Self {
            asset,
            link: None,
            duration_secs: 0.0,
            frame_rate: FrameRate::FPS_30,
            trim,
            playing: false,
            position: trim.start(),
            armed_end: trim.end(),
            gesture_depth: 0,
            gesture_dirty: false,
            staged: StagedWrites::default(),
        }
    }

    fn engine(&self) -> Option<Arc<PlaybackEngine>> {
        self.link.as_ref().map(|link| Arc::clone(&link.lease.engine))
    }

    fn normalized(&self, secs: f64) -> f64 {
        if self.duration_secs > 0.0 {
            (secs / self.duration_secs).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn to_secs(&self, position: f64) -> f64 {
        position * self.duration_secs
    }

    /// One source frame as a normalized fraction of the duration.
    fn frame_step(&self) -> f64 {
        if self.duration_secs <= 0.0 {
            return 0.0;
        }
        self.frame_rate.frame_duration().to_seconds_f64() / self.duration_secs
    }
}

/// Adapts the decoder to the render-graph builder's geometry port.
struct DecoderGeometry(Arc<ClipDecoder>);

impl StreamGeometrySource for DecoderGeometry {
    fn geometry(&self) -> reelcull_core::Result<StreamGeometry> {
        let (width, height) = self.0.dimensions();
        Ok(StreamGeometry {
            width,
            height,
            frame_rate: self.0.frame_rate(),
        })
    }
}

/// Drives the clip currently under review.
pub struct MediaPlaybackController {
    pool: Arc<EnginePool>,
    store: Arc<dyn ReviewStore>,
    resolver: Arc<dyn TransformResolver>,
    session: Option<Session>,
    pending: Vec<ControllerEvent>,
}

impl MediaPlaybackController {
    pub fn new(
        pool: Arc<EnginePool>,
        store: Arc<dyn ReviewStore>,
        resolver: Arc<dyn TransformResolver>,
    ) -> Self {
        Self {
            pool,
            store,
            resolver,
            session: None,
            pending: Vec::new(),
        }
    }

    /// Bind a clip for review, tearing down any previous session
    /// first. Ends Paused at the trim start with a first frame on the
    /// surface. A clip that cannot play (pool exhausted, unreadable
    /// source) still binds; it just presents a poster and ignores
    /// transport calls.
    pub async fn bind(
        &mut self,
        asset: MediaAsset,
        transform: Option<&TransformId>,
        surface: Arc<dyn RenderSurface>,
    ) {
        self.unbind();

        let color = resolve_transform(self.resolver.as_ref(), transform);

        let lease = match self.pool.acquire() {
            Ok(lease) => lease,
            Err(err) => {
                warn!(
                    asset = %asset.id,
                    error = %err,
                    "no playback engine available, review continues without playback"
                );
                self.session = Some(Session::fallback(asset, surface.as_ref()));
                return;
            }
        };

        let locator = asset.locator.clone();
        let opened = tokio::task::spawn_blocking(move || ClipDecoder::open(&locator)).await;
        let decoder = match opened {
            Ok(Ok(decoder)) => Arc::new(decoder),
            Ok(Err(err)) => {
                warn!(
                    asset = %asset.id,
                    locator = %asset.locator,
                    error = %err,
                    "source unreadable, presenting poster"
                );
                self.pool.release(&lease.handle);
                self.session = Some(Session::fallback(asset, surface.as_ref()));
                return;
            }
            Err(err) => {
                warn!(asset = %asset.id, error = %err, "decoder open task failed");
                self.pool.release(&lease.handle);
                self.session = Some(Session::fallback(asset, surface.as_ref()));
                return;
            }
        };

        let geometry = Arc::new(DecoderGeometry(Arc::clone(&decoder)));
        let graph = build_render_graph(geometry, &color).await;

        let duration_secs = decoder.duration_secs();
        let frame_rate = decoder.frame_rate();
        let trim = asset.trim;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        lease.engine.attach(EngineContent {
            decoder,
            graph,
            events: events_tx,
            surface: Some(surface),
            boundary_secs: trim.end() * duration_secs,
            start_secs: trim.start() * duration_secs,
        });

        info!(
            asset = %asset.id,
            label = %asset.label,
            duration_secs,
            "clip bound for review"
        );

        self.session = Some(Session {
            asset,
            link: Some(EngineLink {
                lease,
                events: events_rx,
            }),
            duration_secs,
            frame_rate,
            trim,
            playing: false,
            position: trim.start(),
            armed_end: trim.end(),
            gesture_depth: 0,
            gesture_dirty: false,
            staged: StagedWrites::default(),
        });
    }

    /// Paused to Playing. Restarts from the trim start when the
    /// position sits outside the window or within one frame of its
    /// end.
    pub fn play(&mut self) {
        self.fold_engine_events();
        let Some(session) = self.session.as_mut() else {
            debug!("play ignored, nothing bound");
            return;
        };
        let Some(engine) = session.engine() else {
            debug!("play ignored, session has no engine");
            return;
        };
        if session.playing {
            return;
        }
        let restart_window = session.frame_step().max(MIN_RESTART_EPSILON);
        if !session.trim.contains(session.position)
            || session.position >= session.trim.end() - restart_window
        {
            session.position = session.trim.start();
            engine.seek_secs(session.to_secs(session.position));
        }
        engine.play();
        session.playing = true;
    }

    /// Playing to Paused; the position freezes where the engine clock
    /// stands.
    pub fn pause(&mut self) {
        self.fold_engine_events();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(engine) = session.engine() else {
            return;
        };
        if !session.playing {
            return;
        }
        let frozen = engine.position_secs();
        engine.pause();
        session.playing = false;
        session.position = session.trim.clamp(session.normalized(frozen));
    }

    /// Exact seek, clamped into the trim window. Preserves the playing
    /// flag; idempotent.
    pub fn seek(&mut self, position: f64) {
        self.fold_engine_events();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let target = session.trim.clamp(position);
        session.position = target;
        if let Some(engine) = session.engine() {
            engine.seek_secs(session.to_secs(target));
        }
    }

    /// Pause and move exactly one source frame, clamped at the trim
    /// edges.
    pub fn step_frame(&mut self, direction: StepDirection) {
        self.pause();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let step = session.frame_step();
        if step <= 0.0 {
            return;
        }
        let delta = match direction {
            StepDirection::Forward => step,
            StepDirection::Backward => -step,
        };
        let target = session.trim.clamp(session.position + delta);
        session.position = target;
        if let Some(engine) = session.engine() {
            engine.seek_secs(session.to_secs(target));
        }
    }

    pub fn set_trim_start(&mut self, value: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let updated = session.trim.with_start(value);
        apply_trim(self.store.as_ref(), session, updated);
    }

    pub fn set_trim_end(&mut self, value: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let updated = session.trim.with_end(value);
        apply_trim(self.store.as_ref(), session, updated);
    }

    /// Open a trim drag. Setters inside the bracket defer their store
    /// commit until `end_trim_gesture`.
    pub fn begin_trim_gesture(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.gesture_depth = session.gesture_depth.saturating_add(1);
        }
    }

    /// Close a trim drag, committing at most one store write for the
    /// whole gesture.
    pub fn end_trim_gesture(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.gesture_depth == 0 {
            return;
        }
        session.gesture_depth -= 1;
        if session.gesture_depth == 0 && session.gesture_dirty {
            session.gesture_dirty = false;
            commit_trim(self.store.as_ref(), session);
        }
    }

    /// Flag or unflag the bound clip, committing immediately. A failed
    /// write keeps the in-memory value and stages the retry.
    pub fn set_flagged(&mut self, flagged: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.asset.flagged = flagged;
        commit_flag(self.store.as_ref(), session);
    }

    /// Re-attempt writes that failed earlier.
    pub fn retry_staged_writes(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.staged.trim {
            commit_trim(self.store.as_ref(), session);
        }
        if session.staged.flag {
            commit_flag(self.store.as_ref(), session);
        }
    }

    /// Tear the session down: commit anything staged best-effort,
    /// quiesce the engine and hand it back to the pool. Safe to call
    /// twice.
    pub fn unbind(&mut self) {
        self.pending.clear();
        let Some(mut session) = self.session.take() else {
            return;
        };
        if session.gesture_dirty || session.staged.trim {
            session.gesture_dirty = false;
            commit_trim(self.store.as_ref(), &mut session);
        }
        if session.staged.flag {
            commit_flag(self.store.as_ref(), &mut session);
        }
        if let Some(link) = session.link.take() {
            link.lease.engine.pause();
            if !self.pool.release(&link.lease.handle) {
                debug!(engine = %link.lease.engine.id(), "engine was already back in the pool");
            }
        }
        debug!(asset = %session.asset.id, "review session closed");
    }

    /// Drain engine events into session state and report the resulting
    /// observer events. Call from the owning thread, typically once
    /// per UI frame.
    pub fn pump(&mut self) -> Vec<ControllerEvent> {
        self.fold_engine_events();
        std::mem::take(&mut self.pending)
    }

    pub fn state(&self) -> PlaybackState {
        match &self.session {
            None => PlaybackState::Unbound,
            Some(session) if session.playing => PlaybackState::Playing {
                position: session.position,
            },
            Some(session) => PlaybackState::Paused {
                position: session.position,
            },
        }
    }

    pub fn trim(&self) -> Option<TrimBounds> {
        self.session.as_ref().map(|session| session.trim)
    }

    pub fn asset(&self) -> Option<&MediaAsset> {
        self.session.as_ref().map(|session| &session.asset)
    }

    /// True when the session is bound but has no playable engine.
    pub fn is_fallback(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.link.is_none())
    }

    pub fn engine_id(&self) -> Option<EngineId> {
        self.session
            .as_ref()
            .and_then(|session| session.link.as_ref())
            .map(|link| link.lease.engine.id())
    }

    pub fn has_staged_writes(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.staged.trim || session.staged.flag)
    }

    /// Fold pending engine events into the session. Position updates
    /// apply only while playing, only from the current transport
    /// epoch, and only moving forward, so ticks queued before a pause,
    /// seek, or rebase cannot drag the position around.
    fn fold_engine_events(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let mut drained = Vec::new();
        if let Some(link) = session.link.as_mut() {
            while let Ok(event) = link.events.try_recv() {
                drained.push(event);
            }
        }
        for event in drained {
            match event {
                EngineEvent::Position { secs, epoch } => {
                    if !session.playing {
                        continue;
                    }
                    // A tick that raced a rebase carries the old epoch.
                    let live = session
                        .engine()
                        .is_some_and(|engine| engine.transport_epoch() == epoch);
                    if !live {
                        continue;
                    }
                    let position = session.trim.clamp(session.normalized(secs));
                    if position > session.position {
                        session.position = position;
                        self.pending
                            .push(ControllerEvent::PositionChanged { position });
                    }
                }
                EngineEvent::Boundary { limit_secs } => {
                    let armed_secs = session.armed_end * session.duration_secs;
                    if (limit_secs - armed_secs).abs() > BOUNDARY_TOLERANCE {
                        debug!(
                            limit_secs,
                            armed_secs, "boundary for a superseded trim end ignored"
                        );
                        // The engine stopped at the old limit; resume
                        // toward the re-armed one.
                        if session.playing {
                            if let Some(engine) = session.engine() {
                                engine.play();
                            }
                        }
                        continue;
                    }
                    session.playing = false;
                    session.position = session.trim.start();
                    if let Some(engine) = session.engine() {
                        engine.seek_secs(session.to_secs(session.position));
                    }
                    self.pending.push(ControllerEvent::ReachedTrimEnd);
                    self.pending.push(ControllerEvent::StateChanged(
                        PlaybackState::Paused {
                            position: session.position,
                        },
                    ));
                }
            }
        }
    }
}

impl Drop for MediaPlaybackController {
    fn drop(&mut self) {
        self.unbind();
    }
}

/// Apply a validated trim to the session: push the position inside the
/// new window, re-arm the engine boundary, and commit (now, or at
/// gesture end).
fn apply_trim(store: &dyn ReviewStore, session: &mut Session, updated: TrimBounds) {
    if updated == session.trim {
        return;
    }
    session.trim = updated;
    session.asset.trim = updated;

    if !updated.contains(session.position) {
        session.position = updated.clamp(session.position);
        if let Some(engine) = session.engine() {
            engine.seek_secs(session.to_secs(session.position));
        }
    }

    session.armed_end = updated.end();
    if let Some(engine) = session.engine() {
        engine.set_boundary(updated.end() * session.duration_secs);
    }

    if session.gesture_depth > 0 {
        session.gesture_dirty = true;
    } else {
        commit_trim(store, session);
    }
}

fn commit_trim(store: &dyn ReviewStore, session: &mut Session) {
    match store.save_trim(session.asset.id, session.trim) {
        Ok(()) => session.staged.trim = false,
        Err(err) => {
            warn!(
                asset = %session.asset.id,
                error = %err,
                "trim write failed, staged for retry"
            );
            session.staged.trim = true;
        }
    }
}

fn commit_flag(store: &dyn ReviewStore, session: &mut Session) {
    match store.save_flag(session.asset.id, session.asset.flagged) {
        Ok(()) => session.staged.flag = false,
        Err(err) => {
            warn!(
                asset = %session.asset.id,
                error = %err,
                "flag write failed, staged for retry"
            );
            session.staged.flag = true;
        }
    }
}
