//! Integration tests for colour grading across the stack: stills,
//! preview delivery, and bound playback.

use glam::Vec3;
use reelcull_color::{apply_to_still, ColorTransform, Lut3D, LutCatalog, TransformResolver};
use reelcull_core::{Color, FrameBuffer, MediaAsset, SourceLocator, TransformId};
use reelcull_media::ClipDecoder;
use reelcull_playback::{
    CaptureSurface, EnginePool, FramePreviewService, MediaPlaybackController,
    MediaPreviewDecoder, MemoryStore, PlaybackConfig, PreviewClass, PreviewConfig,
    PreviewRequest, ReviewStore,
};
use std::sync::Arc;

// ── Helpers ────────────────────────────────────────────────────

fn sample_frame() -> FrameBuffer {
    let decoder = ClipDecoder::open(&SourceLocator::new("mem:graded?dur=10&w=64&h=36")).unwrap();
    decoder.decode_at(4.0).unwrap()
}

fn invert_look() -> ColorTransform {
    let lut = Lut3D::from_fn(9, |rgb| Vec3::ONE - rgb).unwrap();
    ColorTransform::Resolved(Arc::new(lut))
}

/// Every lattice point maps to pure red, so interpolation is exact.
fn redline_look() -> Lut3D {
    Lut3D::from_fn(2, |_| Vec3::new(1.0, 0.0, 0.0)).unwrap()
}

// ── Stills ─────────────────────────────────────────────────────

#[test]
fn still_with_no_transform_is_bit_identical() {
    let frame = sample_frame();
    let out = apply_to_still(&frame, &ColorTransform::None);
    assert_eq!(out, frame);
}

#[test]
fn resolved_lut_remaps_channels_and_keeps_alpha() {
    let frame = sample_frame();
    let graded = apply_to_still(&frame, &invert_look());

    // Probe away from row 0, where the frame-index stamp lives.
    for (x, y) in [(5u32, 5u32), (33, 17), (60, 30)] {
        let before = frame.pixel(x, y).to_rgba8();
        let after = graded.pixel(x, y).to_rgba8();
        for channel in 0..3 {
            let expected = 255 - i16::from(before[channel]);
            let got = i16::from(after[channel]);
            assert!(
                (got - expected).abs() <= 1,
                "pixel ({x},{y}) channel {channel}: expected ~{expected}, got {got}"
            );
        }
        assert_eq!(after[3], 255);
    }
}

// ── Preview delivery ───────────────────────────────────────────

#[tokio::test]
async fn preview_grades_after_the_cache() {
    let service = FramePreviewService::new(
        &PreviewConfig::default(),
        Arc::new(MediaPreviewDecoder::new()),
    );
    let locator = SourceLocator::new("mem:graded?dur=10&w=48&h=27");
    let redline = ColorTransform::Resolved(Arc::new(redline_look()));

    let graded = service
        .request_frame(
            PreviewRequest::new(locator.clone(), 2.0, PreviewClass::Immediate)
                .with_transform(redline),
        )
        .frame()
        .await
        .unwrap();
    assert_eq!(graded.pixel(10, 10), Color::RED);

    // The cache holds the decoded frame, not the graded copy: the same
    // position without a transform comes back ungraded, stamp intact.
    let plain = service
        .request_frame(PreviewRequest::new(locator, 2.0, PreviewClass::Immediate))
        .frame()
        .await
        .unwrap();
    assert_eq!(service.cache_len(), 1);
    assert_eq!(ClipDecoder::stamped_index(&plain), Some(60));
    assert_ne!(plain.pixel(10, 10), Color::RED);
}

// ── Bound playback ─────────────────────────────────────────────

#[tokio::test]
async fn bound_clip_presents_graded_frames() {
    let pool = Arc::new(EnginePool::new(&PlaybackConfig {
        pool_capacity: 1,
        tick_hz: 30,
    }));
    let store = Arc::new(MemoryStore::new());
    let mut catalog = LutCatalog::new();
    catalog.insert(TransformId::new("redline"), redline_look());

    let mut controller = MediaPlaybackController::new(
        pool,
        store as Arc<dyn ReviewStore>,
        Arc::new(catalog) as Arc<dyn TransformResolver>,
    );
    let surface = Arc::new(CaptureSurface::new());
    let asset = MediaAsset::new(
        "graded",
        SourceLocator::new("mem:graded?dur=5&w=48&h=27"),
    );

    controller
        .bind(asset, Some(&TransformId::new("redline")), surface.clone())
        .await;

    let frame = surface.last_frame().unwrap();
    assert_eq!(frame.pixel(10, 10), Color::RED);
    controller.unbind();
}

#[tokio::test]
async fn unknown_look_degrades_to_passthrough() {
    let pool = Arc::new(EnginePool::new(&PlaybackConfig {
        pool_capacity: 1,
        tick_hz: 30,
    }));
    let store = Arc::new(MemoryStore::new());

    let mut controller = MediaPlaybackController::new(
        pool,
        store as Arc<dyn ReviewStore>,
        Arc::new(LutCatalog::new()) as Arc<dyn TransformResolver>,
    );
    let surface = Arc::new(CaptureSurface::new());
    let asset = MediaAsset::new(
        "plain",
        SourceLocator::new("mem:plain?dur=5&w=48&h=27"),
    );

    // The named look does not exist; the clip still binds and plays
    // ungraded.
    controller
        .bind(asset, Some(&TransformId::new("missing")), surface.clone())
        .await;

    assert!(!controller.is_fallback());
    let frame = surface.last_frame().unwrap();
    assert_eq!(ClipDecoder::stamped_index(&frame), Some(0));
    controller.unbind();
}
