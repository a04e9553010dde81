//! ALFA Photo Capture - Virtual Camera
//!
//! A software camera and video surface for development without hardware.
//! Every track reports into a shared `TrackLedger`, so callers can check that
//! nothing was left running.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use image::{imageops::FilterType, Rgb, RgbImage};
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::Notify;

use crate::error::{AcquireError, SinkError, TrackError};
use crate::media::sink::VideoSink;
use crate::media::stream::{
    DeviceStream, FrameSource, MediaTrack, StreamAcquirer, StreamConstraints, TrackKind, TrackState,
};

// ═══════════════════════════════════════════════════════════════════════════════
// TRACKS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct LedgerInner {
    created: AtomicUsize,
    live: AtomicUsize,
    enabled: AtomicUsize,
    stop_calls: AtomicUsize,
}

/// Shared counters for every track a virtual camera has handed out
#[derive(Debug, Clone, Default)]
pub struct TrackLedger {
    inner: Arc<LedgerInner>,
}

impl TrackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.inner.created.load(Ordering::SeqCst)
    }

    /// Tracks still holding the (virtual) hardware
    pub fn live_tracks(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    pub fn enabled_tracks(&self) -> usize {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.inner.stop_calls.load(Ordering::SeqCst)
    }
}

/// Video track handed out by `VirtualCamera`
pub struct VirtualTrack {
    id: String,
    stubborn: bool,
    state: Mutex<TrackState>,
    enabled: AtomicBool,
    ledger: TrackLedger,
}

impl VirtualTrack {
    pub fn new(ledger: &TrackLedger) -> Self {
        Self::build(ledger, false)
    }

    /// A track whose `stop()` always fails
    pub fn stubborn(ledger: &TrackLedger) -> Self {
        Self::build(ledger, true)
    }

    fn build(ledger: &TrackLedger, stubborn: bool) -> Self {
        let inner = &ledger.inner;
        let seq = inner.created.fetch_add(1, Ordering::SeqCst);
        inner.live.fetch_add(1, Ordering::SeqCst);
        inner.enabled.fetch_add(1, Ordering::SeqCst);

        Self {
            id: format!("virtual-video-{}", seq),
            stubborn,
            state: Mutex::new(TrackState::Live),
            enabled: AtomicBool::new(true),
            ledger: ledger.clone(),
        }
    }
}

impl MediaTrack for VirtualTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn state(&self) -> TrackState {
        *self.state.lock()
    }

    fn stop(&self) -> Result<(), TrackError> {
        self.ledger.inner.stop_calls.fetch_add(1, Ordering::SeqCst);

        if self.stubborn {
            return Err(TrackError::StopFailed {
                id: self.id.clone(),
                reason: "device did not respond".into(),
            });
        }

        let mut state = self.state.lock();
        if *state == TrackState::Live {
            *state = TrackState::Ended;
            self.ledger.inner.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        match (was, enabled) {
            (true, false) => {
                self.ledger.inner.enabled.fetch_sub(1, Ordering::SeqCst);
            }
            (false, true) => {
                self.ledger.inner.enabled.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Moving gradient with sensor noise
pub struct TestPattern {
    width: u32,
    height: u32,
    blank: bool,
    frame: AtomicU64,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            blank: false,
            frame: AtomicU64::new(0),
        }
    }

    /// A source that never produces a decodable frame
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            blank: true,
            ..Self::new(width, height)
        }
    }
}

impl FrameSource for TestPattern {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn current_frame(&self) -> Option<RgbImage> {
        if self.blank || self.width == 0 || self.height == 0 {
            return None;
        }

        let shift = self.frame.fetch_add(1, Ordering::Relaxed) as u32;
        let (width, height) = (self.width, self.height);
        let mut rng = rand::thread_rng();

        Some(RgbImage::from_fn(width, height, |x, y| {
            let noise: u8 = rng.gen_range(0..8);
            let r = (x.wrapping_add(shift) % width * 255 / width) as u8;
            let g = (y * 255 / height) as u8;
            Rgb([r.saturating_add(noise), g.saturating_add(noise), 128])
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CAMERA
// ═══════════════════════════════════════════════════════════════════════════════

/// Holds acquisitions in flight until opened
#[derive(Debug, Clone)]
pub struct AcquireGate {
    held: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl AcquireGate {
    fn closed() -> Self {
        Self {
            held: Arc::new(AtomicBool::new(true)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Let every pending and future acquisition through
    pub fn open(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn pass(&self) {
        loop {
            let notified = self.notify.notified();
            if !self.held.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

/// Software camera implementing `StreamAcquirer`
pub struct VirtualCamera {
    ledger: TrackLedger,
    outcomes: Mutex<VecDeque<AcquireError>>,
    gate: Option<AcquireGate>,
    resolution: (u32, u32),
    blank: bool,
    stubborn: bool,
    acquisitions: AtomicUsize,
    requests: Mutex<Vec<StreamConstraints>>,
}

impl VirtualCamera {
    pub fn new() -> Self {
        Self {
            ledger: TrackLedger::new(),
            outcomes: Mutex::new(VecDeque::new()),
            gate: None,
            resolution: (1280, 720),
            blank: false,
            stubborn: false,
            acquisitions: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Camera whose acquisitions wait for the returned gate
    pub fn gated() -> (Self, AcquireGate) {
        let gate = AcquireGate::closed();
        let camera = Self {
            gate: Some(gate.clone()),
            ..Self::new()
        };
        (camera, gate)
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = (width, height);
        self
    }

    /// Streams produce no decodable frames
    pub fn with_blank_frames(mut self) -> Self {
        self.blank = true;
        self
    }

    /// Streams carry an extra track that refuses to stop
    pub fn with_stubborn_track(mut self) -> Self {
        self.stubborn = true;
        self
    }

    /// Fail the next acquisition with `error`
    pub fn fail_next(&self, error: AcquireError) {
        self.outcomes.lock().push_back(error);
    }

    /// Fail the next acquisition the way a runtime reports it, by error name
    pub fn fail_next_named(&self, name: &str, message: &str) {
        self.fail_next(AcquireError::from_media_error(name, message));
    }

    pub fn ledger(&self) -> &TrackLedger {
        &self.ledger
    }

    /// Successful acquisitions
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Every constraint set requested so far
    pub fn requests(&self) -> Vec<StreamConstraints> {
        self.requests.lock().clone()
    }
}

impl Default for VirtualCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamAcquirer for VirtualCamera {
    async fn acquire(&self, constraints: &StreamConstraints) -> Result<DeviceStream, AcquireError> {
        self.requests.lock().push(constraints.clone());

        if let Some(gate) = &self.gate {
            gate.pass().await;
        }

        if let Some(error) = self.outcomes.lock().pop_front() {
            return Err(error);
        }

        let mut tracks: Vec<Box<dyn MediaTrack>> = vec![Box::new(VirtualTrack::new(&self.ledger))];
        if self.stubborn {
            tracks.push(Box::new(VirtualTrack::stubborn(&self.ledger)));
        }

        let (width, height) = self.resolution;
        let pattern: Arc<dyn FrameSource> = if self.blank {
            Arc::new(TestPattern::blank(width, height))
        } else {
            Arc::new(TestPattern::new(width, height))
        };

        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(DeviceStream::new(constraints.facing, tracks).with_frames(pattern))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SINK
// ═══════════════════════════════════════════════════════════════════════════════

/// How `VirtualSink::can_play` resolves
#[derive(Debug, Clone)]
pub enum ReadyBehavior {
    Immediate,
    After(Duration),
    Never,
    Error(String),
}

/// In-memory video surface implementing `VideoSink`
pub struct VirtualSink {
    unmounted_probes: AtomicU32,
    ready: Mutex<ReadyBehavior>,
    play_failure: Mutex<Option<String>>,
    reports_size: bool,
    source: Mutex<Option<Arc<dyn FrameSource>>>,
    playing: AtomicBool,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
}

impl VirtualSink {
    pub fn new() -> Self {
        Self {
            unmounted_probes: AtomicU32::new(0),
            ready: Mutex::new(ReadyBehavior::Immediate),
            play_failure: Mutex::new(None),
            reports_size: true,
            source: Mutex::new(None),
            playing: AtomicBool::new(false),
            attaches: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
        }
    }

    /// Report "not mounted" for the first `probes` mount checks
    pub fn mounted_after(self, probes: u32) -> Self {
        self.unmounted_probes.store(probes, Ordering::SeqCst);
        self
    }

    /// Never report an intrinsic frame size
    pub fn without_intrinsic_size(mut self) -> Self {
        self.reports_size = false;
        self
    }

    pub fn set_ready(&self, behavior: ReadyBehavior) {
        *self.ready.lock() = behavior;
    }

    /// Make `play()` fail (autoplay policy)
    pub fn fail_play(&self, reason: &str) {
        *self.play_failure.lock() = Some(reason.to_string());
    }

    pub fn clear_play_failure(&self) {
        *self.play_failure.lock() = None;
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn is_attached(&self) -> bool {
        self.source.lock().is_some()
    }

    pub fn attaches(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detaches(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }
}

impl Default for VirtualSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoSink for VirtualSink {
    fn is_mounted(&self) -> bool {
        self.unmounted_probes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }

    fn attach(&self, stream: &DeviceStream) {
        *self.source.lock() = stream.frame_source();
        self.playing.store(false, Ordering::SeqCst);
        self.attaches.fetch_add(1, Ordering::SeqCst);
    }

    async fn can_play(&self) -> Result<(), SinkError> {
        let behavior = self.ready.lock().clone();
        match behavior {
            ReadyBehavior::Immediate => {}
            ReadyBehavior::After(delay) => tokio::time::sleep(delay).await,
            ReadyBehavior::Never => std::future::pending::<()>().await,
            ReadyBehavior::Error(reason) => return Err(SinkError::Media(reason)),
        }

        if self.is_attached() {
            Ok(())
        } else {
            Err(SinkError::Media("no stream attached".into()))
        }
    }

    async fn play(&self) -> Result<(), SinkError> {
        if let Some(reason) = self.play_failure.lock().clone() {
            return Err(SinkError::Playback(reason));
        }
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn intrinsic_size(&self) -> Option<(u32, u32)> {
        if !self.reports_size || !self.is_playing() {
            return None;
        }
        self.source.lock().as_ref().map(|s| s.dimensions())
    }

    fn rasterize(&self, width: u32, height: u32) -> Option<RgbImage> {
        let source = self.source.lock().clone()?;
        let frame = source.current_frame()?;

        if frame.dimensions() == (width, height) {
            Some(frame)
        } else {
            Some(image::imageops::resize(&frame, width, height, FilterType::Triangle))
        }
    }

    fn detach(&self) {
        self.playing.store(false, Ordering::SeqCst);
        *self.source.lock() = None;
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}
