//! ReelCull - Batch clip review
//!
//! Headless entry point: builds the review stack over fixture clips
//! and walks one full review pass, so the whole pipeline can be run
//! and profiled without a window.

use anyhow::Result;
use glam::Vec3;
use reelcull_color::{Lut3D, LutCatalog, TransformResolver};
use reelcull_core::{MediaAsset, SourceLocator, TransformId, TrimBounds};
use reelcull_media::SourceProbe;
use reelcull_playback::{
    CaptureSurface, ControllerEvent, EnginePool, FramePreviewService, JsonStore,
    MediaPlaybackController, MediaPreviewDecoder, PlaybackConfig, PreviewClass, PreviewConfig,
    PreviewRequest, ReviewStore, StepDirection,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Thumbnails per clip in the filmstrip pass.
const FILMSTRIP_FRAMES: usize = 5;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("ReelCull starting...");

    // Initialize media subsystem
    reelcull_media::init();

    // Review records land in .reelcull/ under the project directory.
    let project_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut catalog = LutCatalog::new();
    let warm = TransformId::new("warm-contrast");
    catalog.insert(warm.clone(), demo_look()?);

    let store = Arc::new(JsonStore::new(&project_dir));
    let pool = Arc::new(EnginePool::new(&PlaybackConfig::default()));
    let preview = FramePreviewService::new(
        &PreviewConfig::default(),
        Arc::new(MediaPreviewDecoder::new()),
    );
    let mut controller = MediaPlaybackController::new(
        Arc::clone(&pool),
        Arc::clone(&store) as Arc<dyn ReviewStore>,
        Arc::new(catalog) as Arc<dyn TransformResolver>,
    );

    let assets = fixture_assets();

    fill_filmstrips(&preview, &assets).await;
    review_first_clip(&mut controller, &assets[0], &warm).await;
    scrub_second_clip(&preview, &assets[1]).await;

    let stats = preview.stats();
    info!(
        delivered = stats.delivered(),
        cancelled = stats.cancelled(),
        peak_in_flight = stats.peak_in_flight(),
        "preview service totals"
    );
    info!(engines = pool.engine_count(), "engine pool size");
    for asset in &assets {
        if let Ok(Some(record)) = store.load(asset.id) {
            info!(
                asset = %asset.label,
                trim_start = record.trim.start(),
                trim_end = record.trim.end(),
                flagged = record.flagged,
                "review record"
            );
        }
    }

    info!("ReelCull demo complete");
    Ok(())
}

/// A mild warm grade: lifted shadows, warmer highs.
fn demo_look() -> Result<Lut3D> {
    let lut = Lut3D::from_fn(17, |rgb| {
        let lifted = rgb.powf(0.95);
        Vec3::new(
            (lifted.x * 1.06).min(1.0),
            lifted.y,
            (lifted.z * 0.94).min(1.0),
        )
    })?;
    Ok(lut)
}

fn fixture_assets() -> Vec<MediaAsset> {
    let mut hero = MediaAsset::new(
        "A001_C007_chase",
        SourceLocator::new("mem:a001-c007?dur=100&fps=30&w=1920&h=1080"),
    );
    hero.trim = TrimBounds::new(0.2, 0.8);

    let interview = MediaAsset::new(
        "A001_C012_interview",
        SourceLocator::new("mem:a001-c012?dur=45&fps=25&w=1920&h=1080"),
    );
    let broll = MediaAsset::new(
        "B002_C003_broll",
        SourceLocator::new("mem:b002-c003?dur=12&w=1280&h=720"),
    );
    vec![hero, interview, broll]
}

/// Queue a strip of throttled thumbnails for every clip and wait for
/// them all.
async fn fill_filmstrips(preview: &FramePreviewService, assets: &[MediaAsset]) {
    let mut tickets = Vec::new();
    for asset in assets {
        let duration = match SourceProbe::probe(&asset.locator) {
            Ok(probe) => probe.duration_secs(),
            Err(err) => {
                warn!(asset = %asset.label, error = %err, "probe failed, skipping filmstrip");
                continue;
            }
        };
        for slot in 0..FILMSTRIP_FRAMES {
            let at = duration * (slot as f64 + 0.5) / FILMSTRIP_FRAMES as f64;
            tickets.push(preview.request_frame(
                PreviewRequest::new(asset.locator.clone(), at, PreviewClass::Throttled)
                    .with_max_size((160, 90)),
            ));
        }
    }

    let mut delivered = 0usize;
    for ticket in tickets {
        match ticket.frame().await {
            Ok(_) => delivered += 1,
            Err(err) if err.is_cancellation() => {}
            Err(err) => warn!(error = %err, "filmstrip frame failed"),
        }
    }
    info!(delivered, "filmstrip pass complete");
}

/// Bind, play a stretch, tighten the trim, flag, unbind.
async fn review_first_clip(
    controller: &mut MediaPlaybackController,
    asset: &MediaAsset,
    look: &TransformId,
) {
    let surface = Arc::new(CaptureSurface::new());
    controller.bind(asset.clone(), Some(look), surface.clone()).await;
    info!(state = ?controller.state(), "session bound");

    controller.play();
    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        for event in controller.pump() {
            match event {
                ControllerEvent::PositionChanged { position } => {
                    info!(position, "review position");
                }
                ControllerEvent::ReachedTrimEnd => info!("trim end reached"),
                ControllerEvent::StateChanged(state) => info!(?state, "state changed"),
            }
        }
    }
    controller.pause();
    controller.step_frame(StepDirection::Forward);

    controller.begin_trim_gesture();
    controller.set_trim_start(0.25);
    controller.set_trim_end(0.75);
    controller.end_trim_gesture();

    controller.set_flagged(true);
    info!(
        frames_presented = surface.presented_count(),
        state = ?controller.state(),
        "review of first clip done"
    );
    controller.unbind();
}

/// Simulate a scrub: a burst of immediate requests where only the
/// newest position matters.
async fn scrub_second_clip(preview: &FramePreviewService, asset: &MediaAsset) {
    let mut newest = None;
    for step in 0..10 {
        let at = f64::from(step) * 0.5;
        newest = Some(preview.request_frame(
            PreviewRequest::new(asset.locator.clone(), at, PreviewClass::Immediate)
                .with_max_size((320, 180)),
        ));
    }
    if let Some(ticket) = newest {
        match ticket.frame().await {
            Ok(frame) => info!(
                width = frame.width,
                height = frame.height,
                "scrub frame delivered"
            ),
            Err(err) if err.is_cancellation() => {}
            Err(err) => warn!(error = %err, "scrub frame failed"),
        }
    }
}
