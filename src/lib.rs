//! # ALFA Photo Capture
//!
//! Camera capture session for the property-photo flow: open the camera,
//! snap stills, review each one, hand the accepted set back to the caller.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   ALFA PHOTO CAPTURE                     │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │  STREAM     │  │  VIDEO      │  │  CAPTURE        │  │
//! │  │  ACQUIRER   │─▶│  BINDER     │  │  ENGINE (JPEG)  │  │
//! │  └─────────────┘  └──────┬──────┘  └────────┬────────┘  │
//! │                          │                   │           │
//! │  ┌───────────────────────┴───────────────────┴────────┐ │
//! │  │        CAPTURE SESSION (state machine + photos)     │ │
//! │  │   Idle → Acquiring → Live ⇄ Previewing → Released   │ │
//! │  └───────────────────────┬────────────────────────────┘ │
//! │                          │                               │
//! │  ┌─────────────┐  ┌──────┴──────┐  ┌─────────────────┐  │
//! │  │  PREVIEW    │  │  TEARDOWN   │  │  LIVENESS       │  │
//! │  │  REGISTRY   │  │  COORDINATOR│◀─│  SWEEP          │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Release Model
//!
//! - Every exit signal goes through one idempotent `release()`
//! - Late acquisition/bind/encode results are discarded by generation
//! - A stream that arrives after release is stopped immediately
//! - Every preview handle is revoked on release

pub mod error;
pub mod config;
pub mod media;
pub mod binder;
pub mod preview;
pub mod photo;
pub mod capture;
pub mod session;
pub mod teardown;
pub mod liveness;

pub use error::{
    AcquireError, BindError, CaptureError, ConfigError, SessionError, SessionResult, SinkError,
    TrackError,
};
pub use config::CaptureConfig;
pub use media::{DeviceStream, FacingMode, StreamAcquirer, StreamConstraints, VideoSink};
pub use binder::VideoBinder;
pub use preview::{PreviewHandle, PreviewRegistry};
pub use photo::{CapturedShot, Photo, PhotoSummary, StillImage};
pub use capture::CaptureEngine;
pub use session::{
    CaptureSession, CompletionCallback, SessionMode, SessionOptions, SessionSnapshot, SessionStats,
};
pub use teardown::{SignalRecord, TeardownCoordinator, TeardownSignal};
pub use liveness::{LivenessMonitor, RouteProbe, SharedRoute};

/// ALFA Photo Capture version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
