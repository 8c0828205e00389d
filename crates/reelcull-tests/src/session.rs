//! Integration tests for review sessions.
//!
//! Exercises the controller, engine pool, and media layer together
//! over deterministic in-memory clips, with the tokio clock paused so
//! playback timing is exact.

use reelcull_color::{LutCatalog, TransformResolver};
use reelcull_core::{MediaAsset, SourceLocator, TrimBounds};
use reelcull_media::ClipDecoder;
use reelcull_playback::{
    CaptureSurface, ControllerEvent, EnginePool, MediaPlaybackController, MemoryStore,
    PlaybackConfig, PlaybackState, ReviewStore,
};
use std::sync::Arc;
use std::time::Duration;

// ── Helpers ────────────────────────────────────────────────────

/// Let spawned tickers observe the advanced clock.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

fn review_rig(
    capacity: usize,
) -> (MediaPlaybackController, Arc<MemoryStore>, Arc<EnginePool>) {
    let pool = Arc::new(EnginePool::new(&PlaybackConfig {
        pool_capacity: capacity,
        tick_hz: 30,
    }));
    let store = Arc::new(MemoryStore::new());
    let controller = MediaPlaybackController::new(
        Arc::clone(&pool),
        Arc::clone(&store) as Arc<dyn ReviewStore>,
        Arc::new(LutCatalog::new()) as Arc<dyn TransformResolver>,
    );
    (controller, store, pool)
}

fn clip(name: &str, query: &str) -> MediaAsset {
    MediaAsset::new(name, SourceLocator::new(format!("mem:{name}?{query}")))
}

// ── A trimmed clip plays its window and snaps back ─────────────

#[tokio::test(start_paused = true)]
async fn trimmed_clip_plays_the_window_and_pauses_at_its_start() {
    let (mut controller, _store, _pool) = review_rig(1);
    let surface = Arc::new(CaptureSurface::new());
    let mut hero = clip("hero", "dur=100&fps=30&w=96&h=54");
    hero.trim = TrimBounds::new(0.2, 0.8);

    controller.bind(hero, None, surface.clone()).await;

    // Bound Paused at the trim start, 20s into the clip.
    assert_eq!(controller.state(), PlaybackState::Paused { position: 0.2 });
    let first = surface.last_frame().unwrap();
    assert_eq!(ClipDecoder::stamped_index(&first), Some(600));

    controller.play();
    assert_eq!(controller.state(), PlaybackState::Playing { position: 0.2 });

    // Ten seconds of playback moves the position to 30s.
    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    let events = controller.pump();
    assert!(events
        .iter()
        .any(|event| matches!(event, ControllerEvent::PositionChanged { .. })));
    let PlaybackState::Playing { position } = controller.state() else {
        panic!("expected the session to still be playing");
    };
    assert!((position - 0.3).abs() < 1e-6);

    // Running past the trim end at 80s pauses, snapped back to the
    // trim start, with the start frame back on the surface.
    tokio::time::advance(Duration::from_secs(51)).await;
    settle().await;
    let events = controller.pump();
    assert!(events.contains(&ControllerEvent::ReachedTrimEnd));
    assert_eq!(controller.state(), PlaybackState::Paused { position: 0.2 });
    let snapped = surface.last_frame().unwrap();
    assert_eq!(ClipDecoder::stamped_index(&snapped), Some(600));
}

// ── Rebinding hands the engine back exactly once ───────────────

#[tokio::test(start_paused = true)]
async fn rebind_releases_the_previous_engine_exactly_once() {
    let (mut controller, _store, pool) = review_rig(1);
    let surface = Arc::new(CaptureSurface::new());
    let mut first = clip("first", "dur=30&w=64&h=36");
    first.trim = TrimBounds::new(0.1, 0.9);
    let second = clip("second", "dur=12&w=64&h=36");

    controller.bind(first, None, surface.clone()).await;
    let engine_a = controller.engine_id().unwrap();
    assert_eq!(pool.leased_count(), 1);

    controller.play();
    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;

    // Rebinding mid-play: with capacity 1 the new session can only
    // lease an engine if the old session gave its one back.
    controller.bind(second, None, surface.clone()).await;
    assert!(!controller.is_fallback());
    assert_eq!(controller.engine_id(), Some(engine_a));
    assert_eq!(pool.engine_count(), 1);
    assert_eq!(pool.leased_count(), 1);
    assert_eq!(controller.state(), PlaybackState::Paused { position: 0.0 });

    // The old session's ticker is dead; nothing leaks into the new
    // session's event stream.
    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;
    assert!(controller.pump().is_empty());

    controller.unbind();
    assert_eq!(pool.leased_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn repeated_reviews_share_the_pooled_engine() {
    let (mut controller, _store, pool) = review_rig(1);
    let surface = Arc::new(CaptureSurface::new());

    let mut seen = None;
    for take in 0..5 {
        let asset = clip(&format!("take-{take}"), "dur=8&w=64&h=36");
        controller.bind(asset, None, surface.clone()).await;
        let id = controller.engine_id().unwrap();
        match seen {
            None => seen = Some(id),
            Some(existing) => assert_eq!(id, existing),
        }
        controller.unbind();
    }
    assert_eq!(pool.engine_count(), 1);
}

// ── Trim edits while playing ───────────────────────────────────

#[tokio::test(start_paused = true)]
async fn tightened_trim_end_rearms_the_running_boundary() {
    let (mut controller, _store, _pool) = review_rig(1);
    let surface = Arc::new(CaptureSurface::new());
    controller
        .bind(clip("loose", "dur=10&w=64&h=36"), None, surface)
        .await;

    controller.play();
    // Tighten the end mid-play; the boundary must fire at 5s, not 10s.
    controller.set_trim_end(0.5);
    tokio::time::advance(Duration::from_millis(5100)).await;
    settle().await;

    let events = controller.pump();
    assert!(events.contains(&ControllerEvent::ReachedTrimEnd));
    assert_eq!(controller.state(), PlaybackState::Paused { position: 0.0 });
}

#[tokio::test(start_paused = true)]
async fn boundary_for_an_old_trim_end_is_ignored() {
    let (mut controller, _store, _pool) = review_rig(1);
    let surface = Arc::new(CaptureSurface::new());
    let mut short = clip("short", "dur=10&w=64&h=36");
    short.trim = TrimBounds::new(0.0, 0.5);
    controller.bind(short, None, surface).await;

    controller.play();
    tokio::time::advance(Duration::from_millis(5050)).await;
    settle().await;

    // The engine already stopped at 5s and queued its boundary event,
    // but the reviewer moved the end outward before it was consumed.
    controller.set_trim_end(0.9);
    let events = controller.pump();
    assert!(!events.contains(&ControllerEvent::ReachedTrimEnd));
    assert_eq!(controller.state(), PlaybackState::Playing { position: 0.0 });

    // Playback resumed toward the new end and pauses there instead.
    tokio::time::advance(Duration::from_millis(4100)).await;
    settle().await;
    let events = controller.pump();
    assert!(events.contains(&ControllerEvent::ReachedTrimEnd));
    assert_eq!(controller.state(), PlaybackState::Paused { position: 0.0 });
}

// ── Session state survives store failures ──────────────────────

#[tokio::test(start_paused = true)]
async fn staged_trim_write_commits_on_unbind() {
    let (mut controller, store, _pool) = review_rig(1);
    let surface = Arc::new(CaptureSurface::new());
    let asset = clip("flaky", "dur=10&w=64&h=36");
    let asset_id = asset.id;
    controller.bind(asset, None, surface).await;

    store.set_fail_writes(true);
    controller.set_trim_end(0.6);
    assert_eq!(store.trim_save_count(), 0);
    assert!(controller.has_staged_writes());

    // The store recovers before the reviewer moves on; unbind commits
    // the staged value.
    store.set_fail_writes(false);
    controller.unbind();
    assert_eq!(store.trim_save_count(), 1);
    let record = store.record(asset_id).unwrap();
    assert_eq!(record.trim, TrimBounds::new(0.0, 0.6));
}
