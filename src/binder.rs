//! ALFA Photo Capture - Video Binder
//!
//! Attaches an acquired stream to a video sink and waits, bounded, for the
//! sink to become playable before starting playback. No retries here; retry
//! policy belongs to the session.

use std::time::Duration;

use crate::error::{BindError, SinkError};
use crate::media::{DeviceStream, VideoSink};

/// Proof that the sink is playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready;

/// Stream-to-sink binder
#[derive(Debug, Clone, Copy)]
pub struct VideoBinder {
    timeout: Duration,
}

impl VideoBinder {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Attach `stream` to `sink`. A stream instance binds once.
    pub fn attach(&self, stream: &mut DeviceStream, sink: &dyn VideoSink) -> Result<(), BindError> {
        if !stream.mark_bound() {
            return Err(BindError::AlreadyBound);
        }
        sink.attach(stream);
        log::debug!("Stream {} attached to video sink", stream.id());
        Ok(())
    }

    /// Wait for readiness, then start playback
    pub async fn await_ready(&self, sink: &dyn VideoSink) -> Result<Ready, BindError> {
        match tokio::time::timeout(self.timeout, sink.can_play()).await {
            Err(_) => return Err(BindError::Timeout(self.timeout.as_millis() as u64)),
            Ok(Err(SinkError::Media(reason))) | Ok(Err(SinkError::Playback(reason))) => {
                return Err(BindError::MediaError(reason));
            }
            Ok(Ok(())) => {}
        }

        log::debug!("Video can play - starting playback...");
        sink.play()
            .await
            .map_err(|e| BindError::PlaybackFailed(e.to_string()))?;

        log::debug!("Video playback started successfully");
        Ok(Ready)
    }

    /// Attach and wait in one step
    pub async fn bind(&self, stream: &mut DeviceStream, sink: &dyn VideoSink) -> Result<Ready, BindError> {
        self.attach(stream, sink)?;
        self.await_ready(sink).await
    }
}
