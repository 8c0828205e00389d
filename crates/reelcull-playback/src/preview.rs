//! On-demand single-frame decode service for filmstrips and scrubbing.
//!
//! Two request classes: `Throttled` waits for one of a bounded set of
//! decode permits (filmstrips request dozens of frames at once), while
//! `Immediate` bypasses the bound and supersedes earlier immediate
//! requests for the same source (scrub feedback only ever wants the
//! latest position).
//!
//! Cancellation is a guarantee, not a hint: a cancelled or superseded
//! request resolves to `Cancelled` and never yields a frame. The flag
//! is checked at queue exit, after decode, and once more by the ticket
//! itself at delivery.

use crate::config::PreviewConfig;
use parking_lot::Mutex;
use reelcull_color::{apply_to_still, ColorTransform};
use reelcull_core::{FrameBuffer, ReelCullError, Result, SharedFrame, SourceLocator};
use reelcull_media::DecoderCache;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, warn};

/// Time quantization for cache keys, in buckets per second. Matches
/// the output cadence so neighboring scrub positions share a frame.
const CACHE_BUCKET_RATE: f64 = 30.0;

/// Request priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewClass {
    /// Bounded concurrency; for many-asset filmstrip fills.
    Throttled,
    /// Bypasses the bound and supersedes earlier immediate requests
    /// for the same source; for scrub feedback.
    Immediate,
}

/// One frame request.
#[derive(Debug, Clone)]
pub struct PreviewRequest {
    pub locator: SourceLocator,
    pub time_secs: f64,
    pub max_size: Option<(u32, u32)>,
    pub class: PreviewClass,
    pub transform: ColorTransform,
    /// Immediate requests sharing a key supersede each other. Defaults
    /// to the locator, so scrubbing one clip only cancels its own
    /// stale requests.
    pub supersede_key: Option<String>,
}

impl PreviewRequest {
    pub fn new(locator: SourceLocator, time_secs: f64, class: PreviewClass) -> Self {
        Self {
            locator,
            time_secs,
            max_size: None,
            class,
            transform: ColorTransform::None,
            supersede_key: None,
        }
    }

    pub fn with_max_size(mut self, max_size: (u32, u32)) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn with_transform(mut self, transform: ColorTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_supersede_key(mut self, key: impl Into<String>) -> Self {
        self.supersede_key = Some(key.into());
        self
    }

    fn effective_supersede_key(&self) -> &str {
        self.supersede_key
            .as_deref()
            .unwrap_or_else(|| self.locator.as_str())
    }
}

/// What the service decodes through. The production implementation
/// wraps the decoder cache; tests substitute slow or failing decoders.
pub trait PreviewDecoder: Send + Sync {
    fn decode_preview(
        &self,
        locator: &SourceLocator,
        secs: f64,
        max_size: Option<(u32, u32)>,
    ) -> Result<FrameBuffer>;
}

/// Production decoder over the shared per-source decoder cache.
#[derive(Default)]
pub struct MediaPreviewDecoder {
    decoders: DecoderCache,
}

impl MediaPreviewDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreviewDecoder for MediaPreviewDecoder {
    fn decode_preview(
        &self,
        locator: &SourceLocator,
        secs: f64,
        max_size: Option<(u32, u32)>,
    ) -> Result<FrameBuffer> {
        let decoder = self.decoders.get_or_open(locator)?;
        decoder.decode_scaled(secs, max_size)
    }
}

/// Counters for tests and diagnostics.
#[derive(Debug, Default)]
pub struct PreviewStats {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    delivered: AtomicU64,
    cancelled: AtomicU64,
}

impl PreviewStats {
    fn decode_started(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn decode_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Decodes running right now.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Most decodes ever running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    locator: SourceLocator,
    bucket: i64,
    max_size: Option<(u32, u32)>,
}

impl CacheKey {
    fn new(request: &PreviewRequest) -> Self {
        Self {
            locator: request.locator.clone(),
            bucket: (request.time_secs * CACHE_BUCKET_RATE).round() as i64,
            max_size: request.max_size,
        }
    }
}

/// Byte-budgeted LRU of decoded (ungraded) frames.
struct PreviewCache {
    entries: HashMap<CacheKey, SharedFrame>,
    lru_order: Vec<CacheKey>,
    memory_used: usize,
    max_memory: usize,
}

impl PreviewCache {
    fn new(max_memory: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru_order: Vec::new(),
            memory_used: 0,
            max_memory,
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<SharedFrame> {
        let frame = self.entries.get(key).cloned()?;
        self.lru_order.retain(|k| k != key);
        self.lru_order.push(key.clone());
        Some(frame)
    }

    fn insert(&mut self, key: CacheKey, frame: SharedFrame) {
        let size = frame.memory_bytes();
        while self.memory_used + size > self.max_memory && !self.lru_order.is_empty() {
            let oldest = self.lru_order.remove(0);
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.memory_used -= evicted.memory_bytes();
            }
        }
        if size > self.max_memory {
            return;
        }
        self.memory_used += size;
        self.lru_order.retain(|k| k != &key);
        self.lru_order.push(key.clone());
        if let Some(replaced) = self.entries.insert(key, frame) {
            self.memory_used -= replaced.memory_bytes();
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn memory_usage(&self) -> usize {
        self.memory_used
    }
}

/// Handle to one in-flight request. Await `frame()` for the result;
/// `cancel()` guarantees no frame is ever delivered.
pub struct PreviewTicket {
    cancelled: Arc<AtomicBool>,
    cancel_tx: Option<oneshot::Sender<()>>,
    result_rx: oneshot::Receiver<Result<SharedFrame>>,
}

impl PreviewTicket {
    /// Withdraw the request. Idempotent.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Resolve the request. A cancelled ticket always resolves to
    /// `Cancelled`, even if a frame raced into the channel.
    pub async fn frame(mut self) -> Result<SharedFrame> {
        let outcome = (&mut self.result_rx).await;
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(ReelCullError::Cancelled("preview request cancelled".into()));
        }
        match outcome {
            Ok(result) => result,
            Err(_) => Err(ReelCullError::Cancelled("preview request dropped".into())),
        }
    }
}

/// The preview service. Cheap to share; all state is internally
/// synchronized.
pub struct FramePreviewService {
    decoder: Arc<dyn PreviewDecoder>,
    permits: Arc<Semaphore>,
    cache: Arc<Mutex<PreviewCache>>,
    latest_immediate: Arc<Mutex<HashMap<String, u64>>>,
    next_id: AtomicU64,
    stats: Arc<PreviewStats>,
}

impl FramePreviewService {
    pub fn new(config: &PreviewConfig, decoder: Arc<dyn PreviewDecoder>) -> Self {
        Self {
            decoder,
            permits: Arc::new(Semaphore::new(config.throttled_concurrency.max(1))),
            cache: Arc::new(Mutex::new(PreviewCache::new(config.cache_bytes))),
            latest_immediate: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            stats: Arc::new(PreviewStats::default()),
        }
    }

    pub fn stats(&self) -> &PreviewStats {
        &self.stats
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn cache_memory_bytes(&self) -> usize {
        self.cache.lock().memory_usage()
    }

    /// Supersede entries currently tracking an in-flight immediate
    /// request.
    pub fn tracked_immediates(&self) -> usize {
        self.latest_immediate.lock().len()
    }

    /// Submit a request. Returns immediately with a ticket.
    pub fn request_frame(&self, request: PreviewRequest) -> PreviewTicket {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let cancelled = Arc::new(AtomicBool::new(false));
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (result_tx, result_rx) = oneshot::channel();

        if request.class == PreviewClass::Immediate {
            self.latest_immediate
                .lock()
                .insert(request.effective_supersede_key().to_owned(), id);
        }

        let worker = Worker {
            decoder: Arc::clone(&self.decoder),
            permits: Arc::clone(&self.permits),
            cache: Arc::clone(&self.cache),
            latest_immediate: Arc::clone(&self.latest_immediate),
            stats: Arc::clone(&self.stats),
        };
        let flag = Arc::clone(&cancelled);
        tokio::spawn(async move {
            worker.run(request, id, flag, cancel_rx, result_tx).await;
        });

        PreviewTicket {
            cancelled,
            cancel_tx: Some(cancel_tx),
            result_rx,
        }
    }
}

struct Worker {
    decoder: Arc<dyn PreviewDecoder>,
    permits: Arc<Semaphore>,
    cache: Arc<Mutex<PreviewCache>>,
    latest_immediate: Arc<Mutex<HashMap<String, u64>>>,
    stats: Arc<PreviewStats>,
}

impl Worker {
    async fn run(
        self,
        request: PreviewRequest,
        id: u64,
        cancelled: Arc<AtomicBool>,
        mut cancel_rx: oneshot::Receiver<()>,
        result_tx: oneshot::Sender<Result<SharedFrame>>,
    ) {
        // Queue stage. Throttled requests wait here for a permit, and
        // a cancel during the wait ends the request without a decode.
        let _permit = match request.class {
            PreviewClass::Immediate => None,
            PreviewClass::Throttled => tokio::select! {
                _ = &mut cancel_rx => {
                    self.finish_cancelled(result_tx);
                    return;
                }
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        self.finish_cancelled(result_tx);
                        return;
                    }
                },
            },
        };

        // Queue exit check.
        if self.is_dead(&request, id, &cancelled) {
            self.retire(&request, id);
            self.finish_cancelled(result_tx);
            return;
        }

        // Repeat scrub hits come from the cache without a decode.
        let key = CacheKey::new(&request);
        let cached = self.cache.lock().get(&key);
        let frame = match cached {
            Some(frame) => Ok(frame),
            None => {
                let decoder = Arc::clone(&self.decoder);
                let locator = request.locator.clone();
                let (secs, max_size) = (request.time_secs, request.max_size);

                self.stats.decode_started();
                let outcome = tokio::task::spawn_blocking(move || {
                    decoder.decode_preview(&locator, secs, max_size)
                })
                .await;
                self.stats.decode_finished();

                match outcome {
                    Ok(Ok(frame)) => {
                        let frame: SharedFrame = Arc::new(frame);
                        self.cache.lock().insert(key, Arc::clone(&frame));
                        Ok(frame)
                    }
                    Ok(Err(err)) => Err(err),
                    Err(join_err) => Err(ReelCullError::Internal(format!(
                        "preview decode task failed: {join_err}"
                    ))),
                }
            }
        };

        // After-decode check.
        if self.is_dead(&request, id, &cancelled) {
            self.retire(&request, id);
            self.finish_cancelled(result_tx);
            return;
        }

        self.retire(&request, id);
        match frame {
            Ok(frame) => {
                let graded = if request.transform.is_none() {
                    frame
                } else {
                    Arc::new(apply_to_still(&frame, &request.transform))
                };
                if result_tx.send(Ok(graded)).is_ok() {
                    self.stats.delivered.fetch_add(1, Ordering::SeqCst);
                } else {
                    self.stats.cancelled.fetch_add(1, Ordering::SeqCst);
                }
            }
            Err(err) => {
                warn!(locator = %request.locator, error = %err, "preview decode failed");
                let _ = result_tx.send(Err(ReelCullError::ResourceUnavailable(format!(
                    "preview of {}: {err}",
                    request.locator
                ))));
            }
        }
    }

    /// A request is dead once cancelled, or once a newer immediate
    /// request for the same source exists.
    fn is_dead(&self, request: &PreviewRequest, id: u64, cancelled: &AtomicBool) -> bool {
        if cancelled.load(Ordering::SeqCst) {
            return true;
        }
        if request.class == PreviewClass::Immediate {
            let latest = self
                .latest_immediate
                .lock()
                .get(request.effective_supersede_key())
                .copied();
            if latest != Some(id) {
                debug!(locator = %request.locator, "preview request superseded");
                return true;
            }
        }
        false
    }

    /// Remove the supersede entry when its holder finishes. Entries only
    /// track requests still in flight.
    fn retire(&self, request: &PreviewRequest, id: u64) {
        if request.class != PreviewClass::Immediate {
            return;
        }
        let mut latest = self.latest_immediate.lock();
        if latest.get(request.effective_supersede_key()).copied() == Some(id) {
            latest.remove(request.effective_supersede_key());
        }
    }

    fn finish_cancelled(&self, result_tx: oneshot::Sender<Result<SharedFrame>>) {
        self.stats.cancelled.fetch_add(1, Ordering::SeqCst);
        let _ = result_tx.send(Err(ReelCullError::Cancelled(
            "preview request cancelled".into(),
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcull_media::ClipDecoder;
    use std::time::Duration;

    /// Decodes through the real media layer after a fixed delay, and
    /// tracks its own concurrency so tests can observe the cap.
    struct SlowDecoder {
        delay: Duration,
        inner: MediaPreviewDecoder,
        running: AtomicUsize,
        peak: AtomicUsize,
        decodes: AtomicUsize,
    }

    impl SlowDecoder {
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

    impl PreviewDecoder for SlowDecoder {
        fn decode_preview(
            &self,
            locator: &SourceLocator,
            secs: f64,
            max_size: Option<(u32, u32)>,
        ) -> Result<FrameBuffer> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            let result = self.inner.decode_preview(locator, secs, max_size);
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.decodes.fetch_add(1, Ordering::SeqCst);
            result
        }
    }

    struct FailingDecoder;

    impl PreviewDecoder for FailingDecoder {
        fn decode_preview(
            &self,
            _locator: &SourceLocator,
            _secs: f64,
            _max_size: Option<(u32, u32)>,
        ) -> Result<FrameBuffer> {
            Err(ReelCullError::ResourceUnavailable("no such source".into()))
        }
    }

    fn service_with(decoder: Arc<dyn PreviewDecoder>, concurrency: usize) -> FramePreviewService {
        FramePreviewService::new(
            &PreviewConfig {
                throttled_concurrency: concurrency,
                cache_bytes: 64 * 1024 * 1024,
            },
            decoder,
        )
    }

    fn clip(name: &str) -> SourceLocator {
        SourceLocator::new(format!("mem:{name}?dur=10&w=64&h=36"))
    }

    #[tokio::test]
    async fn immediate_request_delivers_the_right_frame() {
        let service = service_with(Arc::new(MediaPreviewDecoder::new()), 4);

        let ticket = service.request_frame(PreviewRequest::new(
            clip("a"),
            2.0,
            PreviewClass::Immediate,
        ));
        let frame = ticket.frame().await.unwrap();

        assert_eq!(ClipDecoder::stamped_index(&frame), Some(60));
        assert_eq!(service.stats().delivered(), 1);
    }

    #[tokio::test]
    async fn cancel_before_start_never_delivers() {
        let decoder = Arc::new(SlowDecoder::new(Duration::from_millis(20)));
        let service = service_with(decoder.clone(), 4);

        let mut ticket = service.request_frame(PreviewRequest::new(
            clip("a"),
            1.0,
            PreviewClass::Throttled,
        ));
        ticket.cancel();

        let err = ticket.frame().await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(service.stats().delivered(), 0);
        assert_eq!(decoder.decodes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_during_decode_never_delivers() {
        let decoder = Arc::new(SlowDecoder::new(Duration::from_millis(30)));
        let service = service_with(decoder.clone(), 4);

        let mut ticket = service.request_frame(PreviewRequest::new(
            clip("a"),
            1.0,
            PreviewClass::Immediate,
        ));
        // Let the decode get underway, then withdraw.
        tokio::time::sleep(Duration::from_millis(5)).await;
        ticket.cancel();

        let err = ticket.frame().await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(service.stats().delivered(), 0);
    }

    #[tokio::test]
    async fn rapid_immediate_requests_deliver_only_the_last() {
        let service = service_with(Arc::new(SlowDecoder::new(Duration::from_millis(5))), 4);
        let locator = clip("scrubbed");

        let tickets: Vec<_> = (0..5)
            .map(|i| {
                service.request_frame(PreviewRequest::new(
                    locator.clone(),
                    f64::from(i),
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

        // Only the last request (t=4.0s, frame 120) survives.
        assert_eq!(delivered, vec![Some(120)]);
        assert_eq!(service.stats().cancelled(), 4);
    }

    #[tokio::test]
    async fn finished_immediates_are_no_longer_tracked() {
        let service = service_with(Arc::new(MediaPreviewDecoder::new()), 4);

        let delivered = service.request_frame(PreviewRequest::new(
            clip("a"),
            1.0,
            PreviewClass::Immediate,
        ));
        let mut withdrawn = service.request_frame(PreviewRequest::new(
            clip("b"),
            1.0,
            PreviewClass::Immediate,
        ));
        assert_eq!(service.tracked_immediates(), 2);

        withdrawn.cancel();
        delivered.frame().await.unwrap();
        let err = withdrawn.frame().await.unwrap_err();
        assert!(err.is_cancellation());

        assert_eq!(service.tracked_immediates(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn throttled_requests_respect_the_cap() {
        let decoder = Arc::new(SlowDecoder::new(Duration::from_millis(10)));
        let service = service_with(decoder.clone(), 2);

        let tickets: Vec<_> = (0..12)
            .map(|i| {
                service.request_frame(
                    PreviewRequest::new(clip(&format!("clip-{i}")), 1.0, PreviewClass::Throttled)
                        .with_max_size((64, 64)),
                )
            })
            .collect();

        for ticket in tickets {
            ticket.frame().await.unwrap();
        }

        assert_eq!(service.stats().delivered(), 12);
        assert!(decoder.peak.load(Ordering::SeqCst) <= 2);
        assert!(service.stats().peak_in_flight() <= 2);
        assert_eq!(service.stats().in_flight(), 0);
    }

    #[tokio::test]
    async fn repeat_requests_hit_the_cache() {
        let decoder = Arc::new(SlowDecoder::new(Duration::from_millis(1)));
        let service = service_with(decoder.clone(), 4);
        let request = PreviewRequest::new(clip("same"), 3.0, PreviewClass::Throttled);

        let first = service.request_frame(request.clone()).frame().await.unwrap();
        let second = service.request_frame(request).frame().await.unwrap();

        assert_eq!(ClipDecoder::stamped_index(&first), Some(90));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(decoder.decodes.load(Ordering::SeqCst), 1);
        assert_eq!(service.cache_len(), 1);
    }

    #[tokio::test]
    async fn unreadable_source_reports_resource_unavailable() {
        let service = service_with(Arc::new(FailingDecoder), 4);

        let ticket = service.request_frame(PreviewRequest::new(
            SourceLocator::new("mem:gone"),
            0.0,
            PreviewClass::Immediate,
        ));
        let err = ticket.frame().await.unwrap_err();
        assert!(matches!(err, ReelCullError::ResourceUnavailable(_)));
    }

    #[test]
    fn cache_evicts_oldest_first() {
        let frame_bytes = FrameBuffer::black(10, 10).memory_bytes();
        let mut cache = PreviewCache::new(frame_bytes * 2);

        let key = |n: i64| CacheKey {
            locator: SourceLocator::new("mem:x"),
            bucket: n,
            max_size: None,
        };

        cache.insert(key(0), Arc::new(FrameBuffer::black(10, 10)));
        cache.insert(key(1), Arc::new(FrameBuffer::black(10, 10)));
        // Touch key 0 so key 1 becomes the eviction candidate.
        assert!(cache.get(&key(0)).is_some());

        cache.insert(key(2), Arc::new(FrameBuffer::black(10, 10)));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(0)).is_some());
        assert!(cache.get(&key(1)).is_none());
        assert!(cache.get(&key(2)).is_some());
        assert_eq!(cache.memory_usage(), frame_bytes * 2);
    }
}
