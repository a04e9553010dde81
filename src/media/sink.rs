//! ALFA Photo Capture - Video Sink
//!
//! The renderable surface a stream is shown on. Implemented by the host shell
//! (a video element) or by `VirtualSink`.

use async_trait::async_trait;
use image::RgbImage;

use crate::error::SinkError;
use crate::media::stream::DeviceStream;

#[async_trait]
pub trait VideoSink: Send + Sync {
    /// Whether the host has mounted the surface yet
    fn is_mounted(&self) -> bool {
        true
    }

    /// Point the surface at `stream`
    fn attach(&self, stream: &DeviceStream);

    /// Resolves once the surface can begin playback
    async fn can_play(&self) -> Result<(), SinkError>;

    /// Start playback
    async fn play(&self) -> Result<(), SinkError>;

    /// Intrinsic frame size, `None` while unknown
    fn intrinsic_size(&self) -> Option<(u32, u32)>;

    /// Draw the visible frame at `width` x `height`
    fn rasterize(&self, width: u32, height: u32) -> Option<RgbImage>;

    /// Pause, drop the stream reference and reset the surface
    fn detach(&self);
}
