//! Integration tests for the preview service under realistic load.
//!
//! Filmstrip fills and scrub bursts are driven against the real media
//! layer, with a counting decoder wrapped around it where a test needs
//! to observe concurrency or decode counts.

use reelcull_core::{FrameBuffer, Result, SourceLocator};
use reelcull_media::ClipDecoder;
use reelcull_playback::{
    FramePreviewService, MediaPreviewDecoder, PreviewClass, PreviewConfig, PreviewDecoder,
    PreviewRequest,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Helpers ────────────────────────────────────────────────────

/// Real decodes with a fixed delay, counting its own concurrency.
struct CountingDecoder {
    delay: Duration,
    inner: MediaPreviewDecoder,
    running: AtomicUsize,
    peak: AtomicUsize,
    decodes: AtomicUsize,
}

impl CountingDecoder {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: MediaPreviewDecoder::new(),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            decodes: AtomicUsize::new(0),
        }
    }
}

impl PreviewDecoder for CountingDecoder {
    fn decode_preview(
        &self,
        locator: &SourceLocator,
        secs: f64,
        max_size: Option<(u32, u32)>,
    ) -> Result<FrameBuffer> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let result = self.inner.decode_preview(locator, secs, max_size);
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.decodes.fetch_add(1, Ordering::SeqCst);
        result
    }
}

fn service_over(decoder: Arc<dyn PreviewDecoder>, concurrency: usize) -> FramePreviewService {
    FramePreviewService::new(
        &PreviewConfig {
            throttled_concurrency: concurrency,
            cache_bytes: 512 * 1024 * 1024,
        },
        decoder,
    )
}

// ── Filmstrip fill stays under the decode cap ──────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn filmstrip_fill_completes_under_the_decode_cap() {
    let decoder = Arc::new(CountingDecoder::new(Duration::from_millis(3)));
    let service = service_over(decoder.clone(), 4);

    // One thumbnail per clip for a fifty-clip batch.
    let tickets: Vec<_> = (0..50)
        .map(|i| {
            let locator = SourceLocator::new(format!("mem:strip-{i}?dur=10&w=64&h=36"));
            service.request_frame(
                PreviewRequest::new(locator, 5.0, PreviewClass::Throttled)
                    .with_max_size((64, 64)),
            )
        })
        .collect();

    for ticket in tickets {
        let frame = ticket.frame().await.unwrap();
        assert_eq!(ClipDecoder::stamped_index(&frame), Some(150));
    }

    assert_eq!(service.stats().delivered(), 50);
    assert_eq!(decoder.decodes.load(Ordering::SeqCst), 50);
    assert!(decoder.peak.load(Ordering::SeqCst) <= 4);
    assert!(service.stats().peak_in_flight() <= 4);
    assert_eq!(service.stats().in_flight(), 0);
}

// ── Cancellation is a guarantee ────────────────────────────────

#[tokio::test]
async fn cancelled_tickets_never_resolve_to_frames() {
    let decoder = Arc::new(CountingDecoder::new(Duration::ZERO));
    let service = service_over(decoder.clone(), 2);

    let mut tickets: Vec<_> = (0..12)
        .map(|i| {
            let locator = SourceLocator::new(format!("mem:cull-{i}?dur=10&w=64&h=36"));
            service.request_frame(PreviewRequest::new(locator, 1.0, PreviewClass::Throttled))
        })
        .collect();

    // The reviewer scrolls away from half the batch before any decode
    // has started.
    for ticket in tickets.iter_mut().step_by(2) {
        ticket.cancel();
    }

    for (i, ticket) in tickets.into_iter().enumerate() {
        let outcome = ticket.frame().await;
        if i % 2 == 0 {
            assert!(outcome.unwrap_err().is_cancellation());
        } else {
            let frame = outcome.unwrap();
            assert_eq!(ClipDecoder::stamped_index(&frame), Some(30));
        }
    }

    assert_eq!(service.stats().delivered(), 6);
    assert_eq!(service.stats().cancelled(), 6);
    assert_eq!(decoder.decodes.load(Ordering::SeqCst), 6);
}

// ── A scrub burst resolves to the newest position only ─────────

#[tokio::test]
async fn scrub_burst_delivers_only_the_newest_position() {
    let service = service_over(Arc::new(MediaPreviewDecoder::new()), 4);
    let locator = SourceLocator::new("mem:scrub?dur=10&w=64&h=36");

    let tickets: Vec<_> = (0..20)
        .map(|i| {
            service.request_frame(PreviewRequest::new(
                locator.clone(),
                f64::from(i) * 0.25,
                PreviewClass::Immediate,
            ))
        })
        .collect();

    let mut delivered = Vec::new();
    for ticket in tickets {
        if let Ok(frame) = ticket.frame().await {
            delivered.push(ClipDecoder::stamped_index(&frame));
        }
    }

    // The drag ended at 4.75s; only that frame reaches the viewer.
    assert_eq!(delivered, vec![Some(142)]);
    assert_eq!(service.stats().delivered(), 1);
    assert_eq!(service.stats().cancelled(), 19);
}

// ── Scrubbing two clips at once cancels per clip ───────────────

#[tokio::test]
async fn immediate_requests_supersede_per_source() {
    let service = service_over(Arc::new(MediaPreviewDecoder::new()), 4);
    let left = SourceLocator::new("mem:left?dur=10&w=64&h=36");
    let right = SourceLocator::new("mem:right?dur=10&w=64&h=36");

    let stale_left =
        service.request_frame(PreviewRequest::new(left.clone(), 1.0, PreviewClass::Immediate));
    let live_right =
        service.request_frame(PreviewRequest::new(right, 2.0, PreviewClass::Immediate));
    let live_left =
        service.request_frame(PreviewRequest::new(left, 3.0, PreviewClass::Immediate));

    assert!(stale_left.frame().await.unwrap_err().is_cancellation());
    // The right-hand clip's request was never superseded.
    let frame = live_right.frame().await.unwrap();
    assert_eq!(ClipDecoder::stamped_index(&frame), Some(60));
    let frame = live_left.frame().await.unwrap();
    assert_eq!(ClipDecoder::stamped_index(&frame), Some(90));
}
