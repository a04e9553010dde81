//! ALFA Photo Capture - Teardown Coordinator
//!
//! Funnels every exit signal the host can observe into the session's single
//! idempotent release. However many signals fire, and in whatever order, the
//! camera is stopped and the previews revoked exactly once.

use std::fmt;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::liveness::{LivenessMonitor, RouteProbe};
use crate::session::CaptureSession;

/// Exit signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeardownSignal {
    /// Back or done
    UserExit,
    /// Tab or page hidden
    VisibilityHidden,
    /// Page about to unload
    PageUnload,
    /// Back/forward navigation
    HistoryNavigation,
    /// Periodic sweep found the stream held off the capture route
    LivenessSweep,
    /// Host component torn down
    Unmount,
}

impl TeardownSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeardownSignal::UserExit => "user-exit",
            TeardownSignal::VisibilityHidden => "visibility-hidden",
            TeardownSignal::PageUnload => "page-unload",
            TeardownSignal::HistoryNavigation => "history-navigation",
            TeardownSignal::LivenessSweep => "liveness-sweep",
            TeardownSignal::Unmount => "unmount",
        }
    }
}

impl fmt::Display for TeardownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One received signal
#[derive(Debug, Clone, Serialize)]
pub struct SignalRecord {
    pub signal: TeardownSignal,
    /// Whether this signal performed the release
    pub released: bool,
    pub received_at: DateTime<Utc>,
}

/// Signal history. Closes once the session is released; later signals only
/// bump `suppressed`.
#[derive(Debug, Default)]
struct SignalLog {
    records: Vec<SignalRecord>,
    closed: bool,
    suppressed: usize,
}

/// Teardown Coordinator
///
/// Owns the listener side of a session. Dropping it fires `Unmount` and stops
/// the liveness sweep.
pub struct TeardownCoordinator {
    session: Arc<CaptureSession>,
    history: Mutex<SignalLog>,
    liveness: Mutex<Option<LivenessMonitor>>,
}

impl TeardownCoordinator {
    pub fn new(session: Arc<CaptureSession>) -> Self {
        Self {
            session,
            history: Mutex::new(SignalLog::default()),
            liveness: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Arc<CaptureSession> {
        &self.session
    }

    /// Route `signal` to the release. Returns `true` if it performed it.
    pub fn fire(&self, signal: TeardownSignal) -> bool {
        let released = self.session.release(signal);
        self.record(signal, released);
        released
    }

    pub fn on_visibility_change(&self, hidden: bool) -> bool {
        if !hidden {
            return false;
        }
        self.fire(TeardownSignal::VisibilityHidden)
    }

    pub fn on_before_unload(&self) -> bool {
        self.fire(TeardownSignal::PageUnload)
    }

    pub fn on_pop_state(&self) -> bool {
        self.fire(TeardownSignal::HistoryNavigation)
    }

    /// Back without delivering photos
    pub fn on_user_exit(&self) -> bool {
        self.fire(TeardownSignal::UserExit)
    }

    /// Done: release, then deliver the photos. Returns the number delivered.
    pub fn finish(&self) -> usize {
        let was_live = !self.session.is_released();
        let delivered = self.session.done();
        self.record(TeardownSignal::UserExit, was_live);
        delivered
    }

    /// Start the liveness sweep against `probe`, replacing any running one
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since the sweep is spawned
    /// onto the current one.
    pub fn watch_route(&self, probe: Arc<dyn RouteProbe>) {
        let config = self.session.config();
        let monitor = LivenessMonitor::spawn(
            &self.session,
            probe,
            config.capture_route.clone(),
            config.liveness_interval(),
        );
        log::debug!(
            "Liveness sweep every {:?} for route {}",
            config.liveness_interval(),
            config.capture_route
        );
        *self.liveness.lock() = Some(monitor);
    }

    pub fn is_watching(&self) -> bool {
        self.liveness
            .lock()
            .as_ref()
            .map(LivenessMonitor::is_running)
            .unwrap_or(false)
    }

    /// Signals received up to and including the first one after release
    pub fn history(&self) -> Vec<SignalRecord> {
        self.history.lock().records.clone()
    }

    /// Signals that arrived after the history closed
    pub fn suppressed_signals(&self) -> usize {
        self.history.lock().suppressed
    }

    fn record(&self, signal: TeardownSignal, released: bool) {
        if released {
            if let Some(monitor) = self.liveness.lock().take() {
                monitor.stop();
            }
        }

        let mut log = self.history.lock();
        if log.closed {
            log.suppressed += 1;
            return;
        }
        log.records.push(SignalRecord {
            signal,
            released,
            received_at: Utc::now(),
        });
        log.closed = released || self.session.is_released();
    }
}

impl Drop for TeardownCoordinator {
    fn drop(&mut self) {
        self.fire(TeardownSignal::Unmount);
        self.liveness.lock().take();
    }
}
