//! ALFA Photo Capture - Capture Engine
//!
//! Snapshots the live frame of a video sink into a JPEG still plus a
//! revocable preview handle.

use std::io::Cursor;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::media::VideoSink;
use crate::photo::{CapturedShot, StillImage, JPEG_MIME};
use crate::preview::PreviewRegistry;

/// Rasterized frame, not yet encoded
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub pixels: RgbImage,
    pub captured_at: DateTime<Utc>,
}

/// Capture Engine
#[derive(Debug, Clone, Copy)]
pub struct CaptureEngine {
    /// JPEG quality (1-100)
    quality: u8,
    /// Still size when the sink cannot report one
    fallback: (u32, u32),
}

impl CaptureEngine {
    pub fn new(quality: u8, fallback: (u32, u32)) -> Self {
        Self { quality, fallback }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(
            config.jpeg_quality,
            (config.fallback_width, config.fallback_height),
        )
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Intrinsic sink size, or the fallback while it is unknown
    pub fn frame_size(&self, sink: &dyn VideoSink) -> (u32, u32) {
        match sink.intrinsic_size() {
            Some((width, height)) if width > 0 && height > 0 => (width, height),
            _ => self.fallback,
        }
    }

    /// Rasterize the visible frame
    pub fn grab(&self, sink: &dyn VideoSink) -> Result<RawFrame, CaptureError> {
        let (width, height) = self.frame_size(sink);
        log::debug!("Capturing photo: {}x{}", width, height);

        let pixels = sink
            .rasterize(width, height)
            .filter(|p| p.width() > 0 && p.height() > 0)
            .ok_or(CaptureError::NoFrame)?;

        Ok(RawFrame {
            pixels,
            captured_at: Utc::now(),
        })
    }

    /// Encode a frame as JPEG at the configured quality
    pub fn encode(&self, frame: &RawFrame) -> Result<StillImage, CaptureError> {
        let mut output = Vec::new();
        JpegEncoder::new_with_quality(&mut Cursor::new(&mut output), self.quality)
            .encode_image(&frame.pixels)?;

        if output.is_empty() {
            return Err(CaptureError::NoFrame);
        }

        let (width, height) = frame.pixels.dimensions();
        Ok(StillImage::new(output, width, height, frame.captured_at))
    }

    /// Grab, encode and register a preview in one step
    pub fn capture(
        &self,
        sink: &dyn VideoSink,
        previews: &PreviewRegistry,
    ) -> Result<CapturedShot, CaptureError> {
        let frame = self.grab(sink)?;
        let image = self.encode(&frame)?;
        let preview = previews.create(Arc::clone(image.bytes()), JPEG_MIME);
        Ok(CapturedShot::new(image, preview))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use image::GenericImageView;
    use crate::binder::VideoBinder;
    use crate::media::{FacingMode, StreamAcquirer, StreamConstraints, VirtualCamera, VirtualSink};

    async fn live_sink(camera: &VirtualCamera, sink: &VirtualSink) {
        let constraints = StreamConstraints::new(FacingMode::Rear, &CaptureConfig::default());
        let mut stream = camera.acquire(&constraints).await.unwrap();
        VideoBinder::new(Duration::from_secs(1))
            .bind(&mut stream, sink)
            .await
            .unwrap();
        // the sink keeps rendering the stream's frame source
        drop(stream);
    }

    #[tokio::test]
    async fn test_capture_produces_jpeg_and_preview() {
        let camera = VirtualCamera::new().with_resolution(320, 240);
        let sink = VirtualSink::new();
        live_sink(&camera, &sink).await;

        let previews = PreviewRegistry::new();
        let engine = CaptureEngine::from_config(&CaptureConfig::default());
        let shot = engine.capture(&sink, &previews).unwrap();

        assert_eq!(shot.image().dimensions(), (320, 240));
        assert_eq!(&shot.image().bytes()[..3], &[0xFF, 0xD8, 0xFF]);
        assert!(previews.is_live(shot.preview()));

        let decoded = image::load_from_memory(shot.image().bytes()).unwrap();
        assert_eq!(decoded.dimensions(), (320, 240));
    }

    #[tokio::test]
    async fn test_fallback_size_when_sink_silent() {
        let camera = VirtualCamera::new().with_resolution(64, 48);
        let sink = VirtualSink::new().without_intrinsic_size();
        live_sink(&camera, &sink).await;

        let engine = CaptureEngine::new(90, (160, 90));
        assert_eq!(engine.frame_size(&sink), (160, 90));

        let frame = engine.grab(&sink).unwrap();
        assert_eq!(frame.pixels.dimensions(), (160, 90));
    }

    #[tokio::test]
    async fn test_no_frame() {
        let previews = PreviewRegistry::new();
        let engine = CaptureEngine::from_config(&CaptureConfig::default());

        let detached = VirtualSink::new();
        assert_eq!(engine.capture(&detached, &previews).unwrap_err(), CaptureError::NoFrame);

        let camera = VirtualCamera::new().with_blank_frames();
        let sink = VirtualSink::new();
        live_sink(&camera, &sink).await;
        assert_eq!(engine.capture(&sink, &previews).unwrap_err(), CaptureError::NoFrame);
        assert_eq!(previews.outstanding(), 0);
    }

    #[test]
    fn test_quality_changes_output_size() {
        let pixels = RgbImage::from_fn(256, 256, |x, y| image::Rgb([(x ^ y) as u8, x as u8, y as u8]));
        let frame = RawFrame { pixels, captured_at: Utc::now() };

        let low = CaptureEngine::new(20, (1280, 720)).encode(&frame).unwrap();
        let high = CaptureEngine::new(95, (1280, 720)).encode(&frame).unwrap();
        assert!(low.len() < high.len());
    }
}
