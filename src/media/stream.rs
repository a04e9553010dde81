//! ALFA Photo Capture - Device Streams
//!
//! Camera stream handles and the acquisition seam. A `DeviceStream` owns the
//! hardware tracks; stopping it consumes the handle.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::CaptureConfig;
use crate::error::{AcquireError, TrackError};

/// Which camera to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    Front,
    Rear,
}

impl FacingMode {
    /// The other camera
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::Front => FacingMode::Rear,
            FacingMode::Rear => FacingMode::Front,
        }
    }

    /// Media-request `facingMode` value
    pub fn constraint(self) -> &'static str {
        match self {
            FacingMode::Front => "user",
            FacingMode::Rear => "environment",
        }
    }

    /// Front camera previews are displayed mirrored
    pub fn is_mirrored(self) -> bool {
        self == FacingMode::Front
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacingMode::Front => write!(f, "front"),
            FacingMode::Rear => write!(f, "rear"),
        }
    }
}

impl FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" | "user" => Ok(FacingMode::Front),
            "rear" | "back" | "environment" => Ok(FacingMode::Rear),
            other => Err(format!("unknown facing mode: {}", other)),
        }
    }
}

/// Video-only stream request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    /// Always false; the capture flow never opens a microphone
    pub audio: bool,
}

impl StreamConstraints {
    pub fn new(facing: FacingMode, config: &CaptureConfig) -> Self {
        Self {
            facing,
            ideal_width: config.ideal_width,
            ideal_height: config.ideal_height,
            audio: false,
        }
    }

    /// Render as a media-request constraint document
    pub fn to_json(&self) -> Value {
        json!({
            "video": {
                "facingMode": self.facing.constraint(),
                "width": { "ideal": self.ideal_width },
                "height": { "ideal": self.ideal_height },
            },
            "audio": self.audio,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackState {
    Live,
    Ended,
}

/// One constituent track of a device stream
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    fn state(&self) -> TrackState;
    /// Stop the track and release its hardware
    fn stop(&self) -> Result<(), TrackError>;
    fn set_enabled(&self, enabled: bool);
}

/// Decoded frames behind a stream, read by sinks that render it
pub trait FrameSource: Send + Sync {
    fn dimensions(&self) -> (u32, u32);
    fn current_frame(&self) -> Option<RgbImage>;
}

/// Outcome of stopping a stream
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    pub stopped: usize,
    pub failed: usize,
}

/// Live handle to camera hardware
pub struct DeviceStream {
    id: Uuid,
    facing: FacingMode,
    tracks: Vec<Box<dyn MediaTrack>>,
    frames: Option<Arc<dyn FrameSource>>,
    bound: bool,
}

impl DeviceStream {
    pub fn new(facing: FacingMode, tracks: Vec<Box<dyn MediaTrack>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            facing,
            tracks,
            frames: None,
            bound: false,
        }
    }

    /// Attach the frame source sinks will render
    pub fn with_frames(mut self, source: Arc<dyn FrameSource>) -> Self {
        self.frames = Some(source);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn tracks(&self) -> &[Box<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn frame_source(&self) -> Option<Arc<dyn FrameSource>> {
        self.frames.clone()
    }

    /// True while any track is still producing
    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|t| t.state() == TrackState::Live)
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Mark as bound; false if it already was
    pub(crate) fn mark_bound(&mut self) -> bool {
        !std::mem::replace(&mut self.bound, true)
    }

    /// Stop and disable every track, consuming the handle.
    ///
    /// A track that refuses to stop is logged and skipped so the remaining
    /// tracks are still stopped.
    pub fn stop(self) -> StopReport {
        let mut report = StopReport::default();

        for track in &self.tracks {
            log::debug!("Stopping track: {:?} - {:?}", track.kind(), track.state());
            match track.stop() {
                Ok(()) => report.stopped += 1,
                Err(e) => {
                    log::warn!("{}", e);
                    report.failed += 1;
                }
            }
            track.set_enabled(false);
        }

        report
    }
}

impl fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceStream")
            .field("id", &self.id)
            .field("facing", &self.facing)
            .field("tracks", &self.tracks.len())
            .field("bound", &self.bound)
            .finish()
    }
}

/// Requests camera streams from the media subsystem.
///
/// Each successful call hands over one live hardware resource; the caller owns
/// exactly one matching `DeviceStream::stop`.
#[async_trait]
pub trait StreamAcquirer: Send + Sync {
    async fn acquire(&self, constraints: &StreamConstraints) -> Result<DeviceStream, AcquireError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::virtual_cam::{TrackLedger, VirtualTrack};

    #[test]
    fn test_constraint_document() {
        let constraints = StreamConstraints::new(FacingMode::Rear, &CaptureConfig::default());
        let doc = constraints.to_json();

        assert_eq!(doc["video"]["facingMode"], "environment");
        assert_eq!(doc["video"]["width"]["ideal"], 1280);
        assert_eq!(doc["video"]["height"]["ideal"], 720);
        assert_eq!(doc["audio"], false);
    }

    #[test]
    fn test_facing_mode_parse_and_toggle() {
        assert_eq!("user".parse::<FacingMode>().unwrap(), FacingMode::Front);
        assert_eq!("back".parse::<FacingMode>().unwrap(), FacingMode::Rear);
        assert!("sideways".parse::<FacingMode>().is_err());
        assert_eq!(FacingMode::Front.toggled(), FacingMode::Rear);
        assert!(FacingMode::Front.is_mirrored());
        assert!(!FacingMode::Rear.is_mirrored());
    }

    #[test]
    fn test_stop_continues_past_stubborn_track() {
        let ledger = TrackLedger::new();
        let tracks: Vec<Box<dyn MediaTrack>> = vec![
            Box::new(VirtualTrack::stubborn(&ledger)),
            Box::new(VirtualTrack::new(&ledger)),
        ];
        let mut stream = DeviceStream::new(FacingMode::Front, tracks);
        assert!(stream.is_live());
        assert!(stream.mark_bound());
        assert!(!stream.mark_bound());

        let report = stream.stop();
        assert_eq!(report, StopReport { stopped: 1, failed: 1 });
        assert_eq!(ledger.stop_calls(), 2);
        assert_eq!(ledger.enabled_tracks(), 0);
    }
}
