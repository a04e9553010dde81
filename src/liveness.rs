//! ALFA Photo Capture - Liveness Sweep
//!
//! Last-resort safety net: every interval, check that the host is still on
//! the capture route. If it navigated away while the session still holds a
//! stream, release it.

use std::sync::{Arc, Weak};
use std::time::Duration;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::session::CaptureSession;
use crate::teardown::TeardownSignal;

/// Where the host currently is
pub trait RouteProbe: Send + Sync {
    fn current_path(&self) -> String;
}

/// In-process route the host updates on navigation
#[derive(Debug, Clone)]
pub struct SharedRoute {
    path: Arc<RwLock<String>>,
}

impl SharedRoute {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Arc::new(RwLock::new(path.into())),
        }
    }

    pub fn navigate(&self, path: impl Into<String>) {
        let path = path.into();
        log::debug!("Route changed: {}", path);
        *self.path.write() = path;
    }
}

impl RouteProbe for SharedRoute {
    fn current_path(&self) -> String {
        self.path.read().clone()
    }
}

/// One sweep. Returns `true` if it performed the release.
pub fn sweep(session: &CaptureSession, probe: &dyn RouteProbe, capture_route: &str) -> bool {
    let path = probe.current_path();
    if path.contains(capture_route) || !session.holds_stream() {
        return false;
    }

    log::warn!("Navigated to {} with camera still held, releasing", path);
    session.release(TeardownSignal::LivenessSweep)
}

/// Periodic sweep bound to one session.
///
/// Holds the session weakly; the task ends once the session is released or
/// dropped, and is aborted when the monitor is dropped.
pub struct LivenessMonitor {
    handle: JoinHandle<()>,
}

impl LivenessMonitor {
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(
        session: &Arc<CaptureSession>,
        probe: Arc<dyn RouteProbe>,
        capture_route: String,
        period: Duration,
    ) -> Self {
        let weak: Weak<CaptureSession> = Arc::downgrade(session);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(session) = weak.upgrade() else {
                    break;
                };
                if session.is_released() {
                    break;
                }
                if sweep(&session, probe.as_ref(), &capture_route) {
                    break;
                }
            }
            log::debug!("Liveness sweep stopped");
        });

        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
