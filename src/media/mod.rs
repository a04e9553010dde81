//! ALFA Photo Capture - Media Seams
//!
//! Camera streams, video sinks and the virtual camera.

pub mod stream;
pub mod sink;
pub mod virtual_cam;

pub use stream::{
    DeviceStream, FacingMode, FrameSource, MediaTrack, StopReport, StreamAcquirer,
    StreamConstraints, TrackKind, TrackState,
};
pub use sink::VideoSink;
pub use virtual_cam::{
    AcquireGate, ReadyBehavior, TestPattern, TrackLedger, VirtualCamera, VirtualSink, VirtualTrack,
};
