//! ALFA Photo Capture - Capture Session
//!
//! The session state machine: acquires the camera, binds it to the video
//! sink, captures stills for review and releases everything on teardown.
//!
//! ```text
//! Idle ──start──▶ Acquiring ──ready──▶ Live ◀──accept/reject──▶ Previewing
//!   ▲                 │                  │                          │
//!   └──── retry ── Error ◀── failure ────┘                          │
//!                                                                   │
//!        any state ──release──▶ Released (terminal) ◀───────────────┘
//! ```
//!
//! Every acquisition attempt carries a generation number. Anything that stops
//! the camera bumps it, so a late acquisition, bind or encode result that no
//! longer matches is discarded (and a late stream stopped) instead of reviving
//! the session.

use std::sync::Arc;
use parking_lot::Mutex;
use serde::Serialize;

use crate::binder::{Ready, VideoBinder};
use crate::capture::CaptureEngine;
use crate::config::CaptureConfig;
use crate::error::{CaptureError, SessionError, SessionResult};
use crate::media::{DeviceStream, FacingMode, StreamAcquirer, StreamConstraints, VideoSink};
use crate::photo::{CapturedShot, Photo, PhotoSummary, StillImage, JPEG_MIME};
use crate::preview::{PreviewHandle, PreviewRegistry};
use crate::teardown::TeardownSignal;

/// Session mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionMode {
    Idle,
    Acquiring,
    Live,
    Previewing,
    Error,
    Released,
}

/// Receives the committed photos when the user finishes
pub type CompletionCallback = Box<dyn FnOnce(Vec<Photo>) + Send>;

/// Session creation options
#[derive(Default)]
pub struct SessionOptions {
    /// Camera to open first; `None` uses the configured default
    pub facing: Option<FacingMode>,
    /// Stills carried over from an earlier visit
    pub initial_photos: Vec<StillImage>,
    /// Completion handoff, invoked at most once
    pub on_complete: Option<CompletionCallback>,
}

/// Lifetime counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub streams_acquired: usize,
    pub streams_stopped: usize,
    pub tracks_stopped: usize,
    pub track_stop_failures: usize,
    pub releases_performed: usize,
    pub capture_attempts: usize,
    pub captures_completed: usize,
    pub late_results_discarded: usize,
}

/// Read-only view for the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub mode: SessionMode,
    pub facing: FacingMode,
    /// Front camera feed is drawn mirrored
    pub mirrored: bool,
    pub photos: Vec<PhotoSummary>,
    pub pending_preview: Option<String>,
    pub last_error: Option<String>,
    pub debug_status: String,
    pub stream_active: bool,
    pub video_ready: bool,
    pub camera_active: bool,
    /// "Done" is offered only with at least one photo
    pub can_finish: bool,
    pub stats: SessionStats,
}

struct SessionState {
    mode: SessionMode,
    facing: FacingMode,
    /// Current acquisition attempt
    generation: u64,
    stream: Option<DeviceStream>,
    photos: Vec<Photo>,
    pending: Option<CapturedShot>,
    last_error: Option<SessionError>,
    next_sequence: u64,
    debug_status: String,
    video_ready: bool,
    stats: SessionStats,
    on_complete: Option<CompletionCallback>,
}

impl SessionState {
    fn status(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::debug!("{}", message);
        self.debug_status = message;
    }

    /// Whether a suspended `start()` of `generation` may still proceed
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.mode == SessionMode::Acquiring
    }

    fn stale_error(&self) -> SessionError {
        if self.mode == SessionMode::Released {
            SessionError::Released
        } else {
            SessionError::Superseded
        }
    }
}

/// Capture Session - the aggregate root
pub struct CaptureSession {
    /// Configuration
    config: CaptureConfig,
    /// Camera acquisition
    acquirer: Arc<dyn StreamAcquirer>,
    /// Video surface the camera is shown on
    sink: Arc<dyn VideoSink>,
    binder: VideoBinder,
    engine: CaptureEngine,
    /// Preview handles for pending and committed photos
    previews: PreviewRegistry,
    state: Mutex<SessionState>,
}

impl CaptureSession {
    // ═══════════════════════════════════════════════════════════════════════
    // INITIALIZATION
    // ═══════════════════════════════════════════════════════════════════════

    pub fn new(
        config: CaptureConfig,
        acquirer: Arc<dyn StreamAcquirer>,
        sink: Arc<dyn VideoSink>,
        options: SessionOptions,
    ) -> Self {
        let previews = PreviewRegistry::new();
        let facing = options.facing.unwrap_or(config.default_facing);

        let mut next_sequence = 1;
        let photos: Vec<Photo> = options
            .initial_photos
            .into_iter()
            .map(|image| {
                let preview = previews.create(Arc::clone(image.bytes()), JPEG_MIME);
                let photo = CapturedShot::new(image, preview).commit(next_sequence);
                next_sequence += 1;
                photo
            })
            .collect();

        Self {
            binder: VideoBinder::new(config.bind_timeout()),
            engine: CaptureEngine::from_config(&config),
            config,
            acquirer,
            sink,
            previews,
            state: Mutex::new(SessionState {
                mode: SessionMode::Idle,
                facing,
                generation: 0,
                stream: None,
                photos,
                pending: None,
                last_error: None,
                next_sequence,
                debug_status: "Initializing...".into(),
                video_ready: false,
                stats: SessionStats::default(),
                on_complete: options.on_complete,
            }),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub(crate) fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// Bytes behind a preview this session still holds
    pub fn resolve_preview(&self, handle: &PreviewHandle) -> Option<Arc<[u8]>> {
        self.previews.resolve(handle)
    }

    /// `data:` URL for a preview this session still holds
    pub fn preview_data_url(&self, handle: &PreviewHandle) -> Option<String> {
        self.previews.data_url(handle)
    }

    /// Preview handles not yet revoked
    pub fn outstanding_previews(&self) -> usize {
        self.previews.outstanding()
    }

    pub fn mode(&self) -> SessionMode {
        self.state.lock().mode
    }

    pub fn facing(&self) -> FacingMode {
        self.state.lock().facing
    }

    pub fn stats(&self) -> SessionStats {
        self.state.lock().stats
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.state.lock().last_error.clone()
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().mode == SessionMode::Released
    }

    /// Whether a device stream is currently held
    pub fn holds_stream(&self) -> bool {
        self.state.lock().stream.is_some()
    }

    pub fn photo_count(&self) -> usize {
        self.state.lock().photos.len()
    }

    pub fn pending_preview(&self) -> Option<PreviewHandle> {
        self.state.lock().pending.as_ref().map(|s| s.preview().clone())
    }

    /// Preview handles of committed photos, in capture order
    pub fn photo_previews(&self) -> Vec<PreviewHandle> {
        self.state.lock().photos.iter().map(|p| p.preview().clone()).collect()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();

        SessionSnapshot {
            mode: state.mode,
            facing: state.facing,
            mirrored: state.facing.is_mirrored(),
            photos: state.photos.iter().map(Photo::summary).collect(),
            pending_preview: state.pending.as_ref().map(|s| s.preview().url()),
            last_error: state.last_error.as_ref().map(|e| e.to_string()),
            debug_status: state.debug_status.clone(),
            stream_active: state.stream.is_some(),
            video_ready: state.video_ready,
            camera_active: matches!(state.mode, SessionMode::Live | SessionMode::Previewing),
            can_finish: !state.photos.is_empty() && state.mode != SessionMode::Released,
            stats: state.stats,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ACQUISITION
    // ═══════════════════════════════════════════════════════════════════════

    /// Initial start after the host mounts the sink.
    ///
    /// Probes the sink every `mount_retry_delay` up to `mount_attempts` times
    /// before starting. Only this bootstrap path waits; `start()` itself fails
    /// fast on an unmounted sink.
    pub async fn mount(&self) -> SessionResult<()> {
        let attempts = self.config.mount_attempts.max(1);

        for attempt in 1..=attempts {
            if self.is_released() {
                return Err(SessionError::Released);
            }
            if self.sink.is_mounted() {
                return self.start().await;
            }
            log::debug!("Video element not mounted ({}/{})", attempt, attempts);
            self.state.lock().status("Waiting for video element...");
            tokio::time::sleep(self.config.mount_retry_delay()).await;
        }

        self.start().await
    }

    /// Acquire the camera and bind it to the sink.
    ///
    /// `Idle | Error → Acquiring → Live`. On failure the camera is released
    /// and the session enters `Error`; calling `start()` again is the retry.
    /// Dropping the future before it finishes also lands in `Error`
    /// (`Cancelled`) with the camera released.
    pub async fn start(&self) -> SessionResult<()> {
        let (generation, constraints) = {
            let mut state = self.state.lock();
            match state.mode {
                SessionMode::Idle | SessionMode::Error => {}
                SessionMode::Released => return Err(SessionError::Released),
                mode => {
                    return Err(SessionError::InvalidState {
                        operation: "start",
                        mode,
                    })
                }
            }

            if !self.sink.is_mounted() {
                return Err(self.fail(&mut state, SessionError::SinkUnavailable));
            }

            state.generation += 1;
            state.mode = SessionMode::Acquiring;
            state.last_error = None;
            let facing = state.facing;
            state.status(format!("Getting user media with {} camera...", facing));
            (state.generation, StreamConstraints::new(facing, &self.config))
        };

        // Declared before every later lock guard so it drops after them.
        let _attempt = AttemptGuard {
            session: self,
            generation,
        };

        let acquired = self.acquirer.acquire(&constraints).await;

        {
            let mut state = self.state.lock();
            if acquired.is_ok() {
                state.stats.streams_acquired += 1;
            }

            if !state.is_current(generation) {
                return Err(self.discard_late(&mut state, acquired.ok()));
            }

            let mut stream = match acquired {
                Ok(stream) => stream,
                Err(e) => return Err(self.fail(&mut state, e.into())),
            };

            let attached = self.binder.attach(&mut stream, self.sink.as_ref());
            state.stream = Some(stream);
            if let Err(e) = attached {
                return Err(self.fail(&mut state, e.into()));
            }
            state.status("Camera access granted! Setting up video...");
        }

        let ready = self.binder.await_ready(self.sink.as_ref()).await;

        let mut state = self.state.lock();
        if !state.is_current(generation) {
            state.stats.late_results_discarded += 1;
            if state.mode == SessionMode::Released {
                self.sink.detach();
            }
            log::warn!("Discarding late bind result for attempt {}", generation);
            return Err(state.stale_error());
        }

        match ready {
            Ok(Ready) => {
                state.mode = SessionMode::Live;
                state.video_ready = true;
                state.status("Video playback started successfully!");
                log::info!("Camera live ({})", state.facing);
                Ok(())
            }
            Err(e) => Err(self.fail(&mut state, e.into())),
        }
    }

    /// Toggle the camera and restart acquisition.
    ///
    /// A photo under review is discarded as if rejected.
    pub async fn switch_facing(&self) -> SessionResult<()> {
        {
            let mut state = self.state.lock();
            Self::require(
                &state,
                "switch_facing",
                &[
                    SessionMode::Idle,
                    SessionMode::Acquiring,
                    SessionMode::Live,
                    SessionMode::Previewing,
                    SessionMode::Error,
                ],
            )?;

            if let Some(shot) = state.pending.take() {
                self.revoke_preview(shot.preview());
            }
            self.stop_camera(&mut state);
            state.facing = state.facing.toggled();
            state.mode = SessionMode::Idle;
            let facing = state.facing;
            state.status(format!("Switching camera to: {}", facing));
        }

        self.start().await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CAPTURE & REVIEW
    // ═══════════════════════════════════════════════════════════════════════

    /// Snapshot the live frame for review. `Live → Previewing`.
    ///
    /// A failed capture leaves the session `Live` with the stream untouched.
    pub async fn capture(&self) -> SessionResult<PreviewHandle> {
        let (generation, frame) = {
            let mut state = self.state.lock();
            Self::require(&state, "capture", &[SessionMode::Live])?;
            state.stats.capture_attempts += 1;

            match self.engine.grab(self.sink.as_ref()) {
                Ok(frame) => (state.generation, frame),
                Err(e) => {
                    state.status(format!("Capture error: {}", e));
                    return Err(e.into());
                }
            }
        };

        let engine = self.engine;
        let encoded = match tokio::task::spawn_blocking(move || engine.encode(&frame)).await {
            Ok(result) => result,
            Err(e) => Err(CaptureError::EncodeFailed(e.to_string())),
        };

        let mut state = self.state.lock();
        if state.generation != generation || state.mode != SessionMode::Live {
            state.stats.late_results_discarded += 1;
            log::warn!("Discarding capture finished after the camera moved on");
            return Err(state.stale_error());
        }

        let image = match encoded {
            Ok(image) => image,
            Err(e) => {
                state.status(format!("Capture error: {}", e));
                return Err(e.into());
            }
        };

        let (width, height) = image.dimensions();
        let preview = self.previews.create(Arc::clone(image.bytes()), JPEG_MIME);
        state.pending = Some(CapturedShot::new(image, preview.clone()));
        state.mode = SessionMode::Previewing;
        state.stats.captures_completed += 1;
        state.status(format!("Photo captured: {}x{}", width, height));

        Ok(preview)
    }

    /// Keep the photo under review. Returns its sequence id.
    pub fn accept(&self) -> SessionResult<u64> {
        let mut state = self.state.lock();
        Self::require(&state, "accept", &[SessionMode::Previewing])?;

        let shot = state.pending.take().ok_or(SessionError::InvalidState {
            operation: "accept",
            mode: state.mode,
        })?;

        let sequence_id = state.next_sequence;
        state.next_sequence += 1;
        state.photos.push(shot.commit(sequence_id));
        state.mode = SessionMode::Live;
        let total = state.photos.len();
        state.status(format!("Photo accepted! Total: {}", total));

        Ok(sequence_id)
    }

    /// Discard the photo under review
    pub fn reject(&self) -> SessionResult<()> {
        let mut state = self.state.lock();
        Self::require(&state, "reject", &[SessionMode::Previewing])?;

        if let Some(shot) = state.pending.take() {
            self.revoke_preview(shot.preview());
        }
        state.mode = SessionMode::Live;
        state.status("Photo rejected and removed");

        Ok(())
    }

    /// Remove a committed photo. Out-of-range indices are a no-op (`false`).
    pub fn remove_photo(&self, index: usize) -> SessionResult<bool> {
        let mut state = self.state.lock();
        Self::require(
            &state,
            "remove_photo",
            &[
                SessionMode::Idle,
                SessionMode::Acquiring,
                SessionMode::Live,
                SessionMode::Error,
            ],
        )?;

        if index >= state.photos.len() {
            log::debug!("remove_photo({}) ignored: {} photos", index, state.photos.len());
            return Ok(false);
        }

        let photo = state.photos.remove(index);
        self.revoke_preview(photo.preview());
        state.status(format!("Removed photo at index {}", index));

        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TEARDOWN
    // ═══════════════════════════════════════════════════════════════════════

    /// Release the camera and every preview handle. Terminal and idempotent;
    /// returns `true` only for the call that performed the release.
    pub fn release(&self, signal: TeardownSignal) -> bool {
        let mut state = self.state.lock();
        if state.mode == SessionMode::Released {
            log::debug!("Release via {} ignored: already released", signal);
            return false;
        }

        log::info!("Cleaning up camera ({})", signal);
        self.stop_camera(&mut state);

        if let Some(shot) = state.pending.take() {
            self.revoke_preview(shot.preview());
        }
        for photo in &state.photos {
            self.revoke_preview(photo.preview());
        }

        state.mode = SessionMode::Released;
        state.stats.releases_performed += 1;
        state.status("Camera cleanup completed");

        true
    }

    /// Release, then hand the committed photos to `on_complete` (once).
    /// Returns the number of photos delivered.
    pub fn done(&self) -> usize {
        self.release(TeardownSignal::UserExit);

        let (callback, photos) = {
            let mut state = self.state.lock();
            match state.on_complete.take() {
                Some(callback) => (callback, std::mem::take(&mut state.photos)),
                None => return 0,
            }
        };

        let delivered = photos.len();
        log::info!("Delivering {} photos", delivered);
        callback(photos);
        delivered
    }

    // ═══════════════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════════════

    fn require(state: &SessionState, operation: &'static str, allowed: &[SessionMode]) -> SessionResult<()> {
        if state.mode == SessionMode::Released {
            return Err(SessionError::Released);
        }
        if allowed.contains(&state.mode) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                mode: state.mode,
            })
        }
    }

    /// Stop the held stream and reset the sink without ending the session.
    /// Invalidates every in-flight attempt.
    fn stop_camera(&self, state: &mut SessionState) {
        state.generation += 1;
        if let Some(stream) = state.stream.take() {
            self.stop_stream(state, stream);
        }
        self.sink.detach();
        state.video_ready = false;
    }

    fn stop_stream(&self, state: &mut SessionState, stream: DeviceStream) {
        let id = stream.id();
        let report = stream.stop();
        state.stats.streams_stopped += 1;
        state.stats.tracks_stopped += report.stopped;
        state.stats.track_stop_failures += report.failed;
        log::info!(
            "Stopped stream {} ({} tracks stopped, {} failed)",
            id,
            report.stopped,
            report.failed
        );
    }

    /// Stop a stream that arrived for a superseded attempt
    fn discard_late(&self, state: &mut SessionState, stream: Option<DeviceStream>) -> SessionError {
        state.stats.late_results_discarded += 1;
        if let Some(stream) = stream {
            log::warn!("Camera stream {} arrived after teardown, stopping it", stream.id());
            self.stop_stream(state, stream);
        }
        state.stale_error()
    }

    /// Enter `Error` with the camera fully released
    fn fail(&self, state: &mut SessionState, error: SessionError) -> SessionError {
        self.stop_camera(state);
        state.mode = SessionMode::Error;
        state.last_error = Some(error.clone());
        state.status(format!("Camera error: {}", error));
        log::warn!("Camera session failed: {}", error);
        error
    }

    /// Single revocation path for every dropped photo or shot
    fn revoke_preview(&self, handle: &PreviewHandle) {
        if !self.previews.revoke(handle) {
            log::debug!("Preview {} was already revoked", handle);
        }
    }
}

/// Fails a `start()` attempt whose future was dropped mid-flight.
///
/// A finished attempt is never current again (it is `Live`, `Error`, or was
/// superseded), so the guard only acts on abandonment.
struct AttemptGuard<'a> {
    session: &'a CaptureSession,
    generation: u64,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.session.state.lock();
        if state.is_current(self.generation) {
            log::warn!("Camera start {} abandoned before it finished", self.generation);
            self.session.fail(&mut state, SessionError::Cancelled);
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release(TeardownSignal::Unmount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::error::{AcquireError, BindError};
    use crate::media::{ReadyBehavior, VirtualCamera, VirtualSink};

    struct Fixture {
        session: Arc<CaptureSession>,
        camera: Arc<VirtualCamera>,
        sink: Arc<VirtualSink>,
    }

    fn fixture() -> Fixture {
        fixture_with(
            VirtualCamera::new().with_resolution(160, 120),
            VirtualSink::new(),
            SessionOptions::default(),
        )
    }

    fn fixture_with(camera: VirtualCamera, sink: VirtualSink, options: SessionOptions) -> Fixture {
        let camera = Arc::new(camera);
        let sink = Arc::new(sink);
        let session = Arc::new(CaptureSession::new(
            CaptureConfig::default(),
            camera.clone(),
            sink.clone(),
            options,
        ));
        Fixture { session, camera, sink }
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::new_rgb8(width, height);
        let mut buffer = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Jpeg)
            .unwrap();
        buffer
    }

    async fn wait_for_mode(session: &CaptureSession, mode: SessionMode) {
        for _ in 0..100 {
            if session.mode() == mode {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("session never reached {:?}, stuck in {:?}", mode, session.mode());
    }

    #[tokio::test]
    async fn test_accepts_get_gapless_sequence_ids() {
        let f = fixture();
        f.session.start().await.unwrap();
        assert_eq!(f.session.mode(), SessionMode::Live);

        let mut ids = Vec::new();
        for _ in 0..3 {
            f.session.capture().await.unwrap();
            assert_eq!(f.session.mode(), SessionMode::Previewing);
            ids.push(f.session.accept().unwrap());
        }

        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(f.session.photo_count(), 3);
        let snapshot = f.session.snapshot();
        let seqs: Vec<u64> = snapshot.photos.iter().map(|p| p.sequence_id).collect();
        assert_eq!(seqs, ids);
        assert!(snapshot.can_finish);
    }

    #[tokio::test]
    async fn test_reject_revokes_preview() {
        let f = fixture();
        f.session.start().await.unwrap();

        let handle = f.session.capture().await.unwrap();
        assert!(f.session.previews().is_live(&handle));

        f.session.reject().unwrap();
        assert_eq!(f.session.photo_count(), 0);
        assert!(f.session.resolve_preview(&handle).is_none());
        assert!(f.session.preview_data_url(&handle).is_none());
        assert_eq!(f.session.mode(), SessionMode::Live);
        assert!(f.session.pending_preview().is_none());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let f = fixture();
        f.session.start().await.unwrap();

        assert!(f.session.release(TeardownSignal::UserExit));
        assert!(!f.session.release(TeardownSignal::PageUnload));

        assert_eq!(f.session.mode(), SessionMode::Released);
        assert_eq!(f.camera.ledger().stop_calls(), 1);
        assert_eq!(f.camera.ledger().live_tracks(), 0);
        assert_eq!(f.session.stats().releases_performed, 1);
        assert!(!f.sink.is_attached());
    }

    #[tokio::test]
    async fn test_release_revokes_every_handle() {
        let f = fixture();
        f.session.start().await.unwrap();

        f.session.capture().await.unwrap();
        f.session.accept().unwrap();
        let pending = f.session.capture().await.unwrap();
        assert_eq!(f.session.previews().outstanding(), 2);

        f.session.release(TeardownSignal::VisibilityHidden);

        assert!(!f.session.holds_stream());
        assert_eq!(f.session.previews().outstanding(), 0);
        assert!(!f.session.previews().is_live(&pending));
        for handle in f.session.photo_previews() {
            assert!(!f.session.previews().is_live(&handle));
        }
        let snapshot = f.session.snapshot();
        assert!(!snapshot.stream_active);
        assert!(snapshot.pending_preview.is_none());
        assert!(!snapshot.can_finish);
    }

    #[tokio::test]
    async fn test_operations_after_release_rejected() {
        let f = fixture();
        f.session.release(TeardownSignal::HistoryNavigation);

        assert_eq!(f.session.start().await, Err(SessionError::Released));
        assert_eq!(f.session.capture().await.unwrap_err(), SessionError::Released);
        assert_eq!(f.session.remove_photo(0), Err(SessionError::Released));
        assert_eq!(f.session.switch_facing().await, Err(SessionError::Released));
        assert_eq!(f.camera.acquisitions(), 0);
    }

    #[tokio::test]
    async fn test_switch_facing_discards_pending_preview() {
        let f = fixture();
        f.session.start().await.unwrap();
        let pending = f.session.capture().await.unwrap();

        f.session.switch_facing().await.unwrap();

        assert!(!f.session.previews().is_live(&pending));
        assert_eq!(f.session.photo_count(), 0);
        assert_eq!(f.session.mode(), SessionMode::Live);
        assert_eq!(f.session.facing(), FacingMode::Rear);

        let requests = f.camera.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].facing, FacingMode::Front);
        assert_eq!(requests[1].facing, FacingMode::Rear);
        assert_eq!(f.camera.ledger().live_tracks(), 1);
        assert_eq!(f.session.stats().streams_stopped, 1);
    }

    #[tokio::test]
    async fn test_capture_requires_live() {
        let f = fixture();
        let err = f.session.capture().await.unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidState {
                operation: "capture",
                mode: SessionMode::Idle
            }
        );
        assert!(matches!(f.session.accept(), Err(SessionError::InvalidState { .. })));
        assert!(matches!(f.session.reject(), Err(SessionError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_capture_failure_stays_live() {
        let f = fixture_with(
            VirtualCamera::new().with_blank_frames(),
            VirtualSink::new(),
            SessionOptions::default(),
        );
        f.session.start().await.unwrap();

        let err = f.session.capture().await.unwrap_err();
        assert_eq!(err, SessionError::Capture(CaptureError::NoFrame));
        assert_eq!(f.session.mode(), SessionMode::Live);
        assert!(f.session.holds_stream());
        assert_eq!(f.session.stats().capture_attempts, 1);
        assert!(f.session.last_error().is_none());
        assert!(f.session.snapshot().debug_status.contains("Capture error"));
    }

    #[tokio::test]
    async fn test_remove_photo_bounds() {
        let f = fixture();
        f.session.start().await.unwrap();
        f.session.capture().await.unwrap();
        f.session.accept().unwrap();

        assert_eq!(f.session.remove_photo(5), Ok(false));
        assert_eq!(f.session.photo_count(), 1);

        let handle = f.session.photo_previews().remove(0);
        assert_eq!(f.session.remove_photo(0), Ok(true));
        assert!(!f.session.previews().is_live(&handle));
    }

    #[tokio::test]
    async fn test_preview_readable_through_session() {
        let f = fixture();
        f.session.start().await.unwrap();
        let handle = f.session.capture().await.unwrap();

        let bytes = f.session.resolve_preview(&handle).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert!(f
            .session
            .preview_data_url(&handle)
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
        assert_eq!(f.session.outstanding_previews(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_start_during_bind_is_retriable() {
        let f = fixture();
        f.sink.set_ready(ReadyBehavior::After(Duration::from_secs(5)));

        let outcome = tokio::time::timeout(Duration::from_secs(1), f.session.start()).await;
        assert!(outcome.is_err());

        assert_eq!(f.session.mode(), SessionMode::Error);
        assert_eq!(f.session.last_error(), Some(SessionError::Cancelled));
        assert!(!f.session.holds_stream());
        assert_eq!(f.camera.ledger().live_tracks(), 0);
        assert!(!f.sink.is_attached());

        f.sink.set_ready(ReadyBehavior::Immediate);
        f.session.start().await.unwrap();
        assert_eq!(f.session.mode(), SessionMode::Live);
        assert_eq!(f.camera.ledger().live_tracks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_start_during_acquisition_is_retriable() {
        let (camera, gate) = VirtualCamera::gated();
        let f = fixture_with(camera, VirtualSink::new(), SessionOptions::default());

        let outcome = tokio::time::timeout(Duration::from_secs(1), f.session.start()).await;
        assert!(outcome.is_err());
        assert_eq!(f.session.mode(), SessionMode::Error);
        assert_eq!(f.camera.ledger().created(), 0);

        gate.open();
        f.session.mount().await.unwrap();
        assert_eq!(f.session.mode(), SessionMode::Live);
        assert_eq!(f.camera.ledger().live_tracks(), 1);
    }

    #[tokio::test]
    async fn test_finished_start_leaves_state_alone_on_drop() {
        let f = fixture();
        f.camera.fail_next(AcquireError::PermissionDenied);
        assert!(f.session.start().await.is_err());
        assert_eq!(
            f.session.last_error(),
            Some(SessionError::Acquire(AcquireError::PermissionDenied))
        );

        f.session.start().await.unwrap();
        assert_eq!(f.session.mode(), SessionMode::Live);
        assert!(f.session.last_error().is_none());
        assert!(f.session.holds_stream());
        f.session.capture().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_timeout_enters_error_without_leak() {
        let f = fixture();
        f.sink.set_ready(ReadyBehavior::Never);

        let err = f.session.start().await.unwrap_err();
        assert_eq!(err, SessionError::Bind(BindError::Timeout(10_000)));
        assert_eq!(f.session.mode(), SessionMode::Error);
        assert_eq!(f.camera.ledger().live_tracks(), 0);
        assert!(!f.session.holds_stream());

        f.sink.set_ready(ReadyBehavior::Immediate);
        f.session.start().await.unwrap();
        assert_eq!(f.session.mode(), SessionMode::Live);
    }

    #[tokio::test]
    async fn test_playback_failure_is_retriable() {
        let f = fixture();
        f.sink.fail_play("autoplay blocked");

        let err = f.session.start().await.unwrap_err();
        assert!(matches!(err, SessionError::Bind(BindError::PlaybackFailed(_))));
        assert!(err.is_retriable());
        assert_eq!(f.camera.ledger().live_tracks(), 0);

        f.sink.clear_play_failure();
        f.session.start().await.unwrap();
        assert!(f.sink.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_waits_for_sink() {
        let f = fixture_with(
            VirtualCamera::new(),
            VirtualSink::new().mounted_after(3),
            SessionOptions::default(),
        );

        f.session.mount().await.unwrap();
        assert_eq!(f.session.mode(), SessionMode::Live);
        assert_eq!(f.camera.acquisitions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_gives_up_on_missing_sink() {
        let f = fixture_with(
            VirtualCamera::new(),
            VirtualSink::new().mounted_after(u32::MAX),
            SessionOptions::default(),
        );

        assert_eq!(f.session.mount().await, Err(SessionError::SinkUnavailable));
        assert_eq!(f.session.mode(), SessionMode::Error);
        assert_eq!(f.camera.acquisitions(), 0);
    }

    #[tokio::test]
    async fn test_initial_photos_continue_sequence() {
        let options = SessionOptions {
            facing: Some(FacingMode::Rear),
            initial_photos: vec![
                StillImage::from_encoded(jpeg(16, 16), chrono::Utc::now()).unwrap(),
                StillImage::from_encoded(jpeg(16, 16), chrono::Utc::now()).unwrap(),
            ],
            on_complete: None,
        };
        let f = fixture_with(VirtualCamera::new(), VirtualSink::new(), options);

        assert_eq!(f.session.photo_count(), 2);
        assert_eq!(f.session.previews().outstanding(), 2);

        f.session.start().await.unwrap();
        assert_eq!(f.camera.requests()[0].facing, FacingMode::Rear);
        f.session.capture().await.unwrap();
        assert_eq!(f.session.accept(), Ok(3));
    }

    #[tokio::test]
    async fn test_stubborn_track_does_not_abort_release() {
        let f = fixture_with(
            VirtualCamera::new().with_stubborn_track(),
            VirtualSink::new(),
            SessionOptions::default(),
        );
        f.session.start().await.unwrap();
        f.session.capture().await.unwrap();

        assert!(f.session.release(TeardownSignal::PageUnload));
        assert_eq!(f.session.mode(), SessionMode::Released);
        assert_eq!(f.session.stats().track_stop_failures, 1);
        assert_eq!(f.session.stats().tracks_stopped, 1);
        assert_eq!(f.session.previews().outstanding(), 0);
        assert!(!f.sink.is_attached());
    }

    #[tokio::test]
    async fn test_dropping_session_releases_camera() {
        let f = fixture();
        f.session.start().await.unwrap();
        let ledger = f.camera.ledger().clone();
        assert_eq!(ledger.live_tracks(), 1);

        drop(f);
        assert_eq!(ledger.live_tracks(), 0);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SCENARIOS
    // ═══════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_scenario_capture_review_remove_done() {
        let delivered: Arc<Mutex<Option<Vec<Photo>>>> = Arc::new(Mutex::new(None));
        let sink_slot = delivered.clone();
        let options = SessionOptions {
            facing: Some(FacingMode::Front),
            on_complete: Some(Box::new(move |photos: Vec<Photo>| {
                *sink_slot.lock() = Some(photos);
            })),
            ..Default::default()
        };
        let f = fixture_with(VirtualCamera::new(), VirtualSink::new(), options);

        f.session.start().await.unwrap();
        f.session.capture().await.unwrap();
        f.session.accept().unwrap();
        f.session.capture().await.unwrap();
        f.session.reject().unwrap();
        assert_eq!(f.session.remove_photo(0), Ok(true));

        assert_eq!(f.session.done(), 0);
        assert_eq!(f.session.done(), 0);

        let stats = f.session.stats();
        assert_eq!(f.session.photo_count(), 0);
        assert_eq!(stats.streams_acquired, 1);
        assert_eq!(stats.releases_performed, 1);
        assert_eq!(stats.capture_attempts, 2);
        assert_eq!(f.camera.ledger().live_tracks(), 0);
        assert_eq!(delivered.lock().as_ref().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_scenario_done_delivers_photos_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let slot = calls.clone();
        let options = SessionOptions {
            on_complete: Some(Box::new(move |photos: Vec<Photo>| {
                slot.lock().push(photos.iter().map(Photo::file_name).collect::<Vec<_>>());
            })),
            ..Default::default()
        };
        let f = fixture_with(VirtualCamera::new(), VirtualSink::new(), options);

        f.session.start().await.unwrap();
        f.session.capture().await.unwrap();
        f.session.accept().unwrap();

        assert_eq!(f.session.done(), 1);
        assert_eq!(f.session.done(), 0);
        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0][0].starts_with("property-photo-"));
    }

    #[tokio::test]
    async fn test_scenario_permission_denied_then_retry() {
        let f = fixture();
        f.camera.fail_next(AcquireError::PermissionDenied);

        let err = f.session.start().await.unwrap_err();
        assert_eq!(err, SessionError::Acquire(AcquireError::PermissionDenied));
        assert_eq!(f.session.mode(), SessionMode::Error);
        assert_eq!(f.session.last_error(), Some(err.clone()));
        assert!(f.session.snapshot().last_error.is_some());

        f.session.start().await.unwrap();
        assert_eq!(f.session.mode(), SessionMode::Live);
        assert!(f.session.last_error().is_none());
        assert_eq!(f.camera.ledger().created(), 1);
        assert_eq!(f.camera.ledger().live_tracks(), 1);
    }

    #[tokio::test]
    async fn test_scenario_teardown_during_acquisition() {
        let (camera, gate) = VirtualCamera::gated();
        let f = fixture_with(camera, VirtualSink::new(), SessionOptions::default());

        let session = f.session.clone();
        let pending = tokio::spawn(async move { session.start().await });
        wait_for_mode(&f.session, SessionMode::Acquiring).await;

        assert!(f.session.release(TeardownSignal::VisibilityHidden));
        gate.open();

        assert_eq!(pending.await.unwrap(), Err(SessionError::Released));
        assert_eq!(f.session.mode(), SessionMode::Released);
        assert_eq!(f.camera.ledger().created(), 1);
        assert_eq!(f.camera.ledger().live_tracks(), 0);

        let stats = f.session.stats();
        assert_eq!(stats.streams_acquired, 1);
        assert_eq!(stats.streams_stopped, 1);
        assert_eq!(stats.late_results_discarded, 1);
        assert!(!f.session.holds_stream());
    }

    #[tokio::test]
    async fn test_switch_during_acquisition_supersedes_attempt() {
        let (camera, gate) = VirtualCamera::gated();
        let f = fixture_with(camera, VirtualSink::new(), SessionOptions::default());

        let session = f.session.clone();
        let first = tokio::spawn(async move { session.start().await });
        wait_for_mode(&f.session, SessionMode::Acquiring).await;

        let session = f.session.clone();
        let second = tokio::spawn(async move { session.switch_facing().await });
        for _ in 0..100 {
            if f.camera.requests().len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(f.camera.requests().len(), 2);
        gate.open();

        assert_eq!(first.await.unwrap(), Err(SessionError::Superseded));
        assert_eq!(second.await.unwrap(), Ok(()));
        assert_eq!(f.session.mode(), SessionMode::Live);
        assert_eq!(f.session.facing(), FacingMode::Rear);
        assert_eq!(f.camera.acquisitions(), 2);
        assert_eq!(f.camera.ledger().live_tracks(), 1);
        assert_eq!(f.session.stats().late_results_discarded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_during_bind_wait() {
        let f = fixture();
        f.sink.set_ready(ReadyBehavior::After(Duration::from_secs(2)));

        let session = f.session.clone();
        let pending = tokio::spawn(async move { session.start().await });
        for _ in 0..100 {
            if f.session.holds_stream() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(f.session.holds_stream());

        f.session.release(TeardownSignal::PageUnload);
        assert_eq!(f.camera.ledger().live_tracks(), 0);

        assert_eq!(pending.await.unwrap(), Err(SessionError::Released));
        assert_eq!(f.session.mode(), SessionMode::Released);
        assert!(!f.sink.is_playing());
    }
}
