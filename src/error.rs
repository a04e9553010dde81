//! ALFA Photo Capture - Error Types

use thiserror::Error;

use crate::session::SessionMode;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

// ═══════════════════════════════════════════════════════════════
// DEVICE ERRORS
// ═══════════════════════════════════════════════════════════════

/// Camera acquisition failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No camera matches the requested facing mode")]
    NoDevice,

    #[error("Camera is already in use by another application")]
    DeviceBusy,

    #[error("Camera error: {0}")]
    Unknown(String),
}

impl AcquireError {
    /// Map a media-subsystem error name (`NotAllowedError`, ...) to a typed error.
    ///
    /// Host `StreamAcquirer`s translate the runtime's named errors through this.
    /// `VirtualCamera::fail_next_named` scripts failures the same way.
    pub fn from_media_error(name: &str, message: &str) -> Self {
        match name {
            "NotAllowedError" | "SecurityError" | "PermissionDeniedError" => {
                AcquireError::PermissionDenied
            }
            "NotFoundError" | "OverconstrainedError" | "DevicesNotFoundError" => {
                AcquireError::NoDevice
            }
            "NotReadableError" | "AbortError" | "TrackStartError" => AcquireError::DeviceBusy,
            _ => AcquireError::Unknown(message.to_string()),
        }
    }
}

/// A track refused to stop during teardown
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackError {
    #[error("Track {id} failed to stop: {reason}")]
    StopFailed { id: String, reason: String },
}

// ═══════════════════════════════════════════════════════════════
// VIDEO SINK ERRORS
// ═══════════════════════════════════════════════════════════════

/// Errors reported by a video sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Video error: {0}")]
    Media(String),

    #[error("Playback refused: {0}")]
    Playback(String),
}

/// Stream-to-sink binding failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("Video setup timeout after {0} ms")]
    Timeout(u64),

    #[error("Video playback failed: {0}")]
    PlaybackFailed(String),

    #[error("Video element reported an error: {0}")]
    MediaError(String),

    #[error("Stream is already bound to a sink")]
    AlreadyBound,
}

// ═══════════════════════════════════════════════════════════════
// CAPTURE ERRORS
// ═══════════════════════════════════════════════════════════════

/// Still capture failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("No decodable frame available")]
    NoFrame,

    #[error("Failed to encode still image: {0}")]
    EncodeFailed(String),
}

impl From<image::ImageError> for CaptureError {
    fn from(e: image::ImageError) -> Self {
        CaptureError::EncodeFailed(e.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════
// SESSION ERRORS
// ═══════════════════════════════════════════════════════════════

/// Session-level error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Cannot access camera: {0}")]
    Acquire(#[from] AcquireError),

    #[error("Cannot start video: {0}")]
    Bind(#[from] BindError),

    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Operation `{operation}` is not valid while {mode:?}")]
    InvalidState {
        operation: &'static str,
        mode: SessionMode,
    },

    #[error("Video element is not available yet")]
    SinkUnavailable,

    #[error("Camera start was abandoned before it finished")]
    Cancelled,

    #[error("Result arrived for a superseded acquisition attempt")]
    Superseded,

    #[error("Session has been released")]
    Released,
}

impl SessionError {
    /// Whether a manual retry (`start()` from `Error`) can succeed
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            SessionError::Acquire(_)
                | SessionError::Bind(_)
                | SessionError::SinkUnavailable
                | SessionError::Cancelled
        )
    }

    /// Whether the error only reports that a late result was dropped
    pub fn is_stale(&self) -> bool {
        matches!(self, SessionError::Superseded | SessionError::Released)
    }
}

// ═══════════════════════════════════════════════════════════════
// CONFIG ERRORS
// ═══════════════════════════════════════════════════════════════

/// Configuration loading failure
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
