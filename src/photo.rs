//! ALFA Photo Capture - Photos
//!
//! A `CapturedShot` is a still waiting for review; accepting it commits it as
//! a `Photo` with the next sequence id. Both own a preview handle that the
//! session revokes before dropping them.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::preview::PreviewHandle;

/// Export filename prefix
pub const PHOTO_FILE_PREFIX: &str = "property-photo";

/// MIME type of every capture
pub const JPEG_MIME: &str = "image/jpeg";

/// Encoded still image
#[derive(Debug, Clone)]
pub struct StillImage {
    bytes: Arc<[u8]>,
    width: u32,
    height: u32,
    captured_at: DateTime<Utc>,
}

impl StillImage {
    pub fn new(bytes: impl Into<Arc<[u8]>>, width: u32, height: u32, captured_at: DateTime<Utc>) -> Self {
        Self {
            bytes: bytes.into(),
            width,
            height,
            captured_at,
        }
    }

    /// Wrap already-encoded bytes, reading dimensions from the header
    pub fn from_encoded(bytes: Vec<u8>, captured_at: DateTime<Utc>) -> Result<Self, image::ImageError> {
        let (width, height) = image::ImageReader::new(std::io::Cursor::new(&bytes))
            .with_guessed_format()?
            .into_dimensions()?;
        Ok(Self::new(bytes, width, height, captured_at))
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Captured, not yet reviewed
#[derive(Debug)]
pub struct CapturedShot {
    image: StillImage,
    preview: PreviewHandle,
}

impl CapturedShot {
    pub(crate) fn new(image: StillImage, preview: PreviewHandle) -> Self {
        Self { image, preview }
    }

    pub fn image(&self) -> &StillImage {
        &self.image
    }

    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }

    pub(crate) fn commit(self, sequence_id: u64) -> Photo {
        Photo {
            sequence_id,
            image: self.image,
            preview: self.preview,
        }
    }
}

/// Accepted still
#[derive(Debug)]
pub struct Photo {
    sequence_id: u64,
    image: StillImage,
    preview: PreviewHandle,
}

impl Photo {
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn image(&self) -> &StillImage {
        &self.image
    }

    pub fn bytes(&self) -> &[u8] {
        &self.image.bytes
    }

    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.image.captured_at
    }

    /// `property-photo-<unix-ms>.jpg`
    pub fn file_name(&self) -> String {
        format!("{}-{}.jpg", PHOTO_FILE_PREFIX, self.image.captured_at.timestamp_millis())
    }

    pub fn mime_type(&self) -> &'static str {
        JPEG_MIME
    }

    pub fn summary(&self) -> PhotoSummary {
        PhotoSummary {
            sequence_id: self.sequence_id,
            file_name: self.file_name(),
            size: self.image.len(),
            width: self.image.width,
            height: self.image.height,
            captured_at: self.image.captured_at,
            preview_url: self.preview.url(),
        }
    }
}

/// Presentation view of a photo
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoSummary {
    pub sequence_id: u64,
    pub file_name: String,
    pub size: usize,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
    pub preview_url: String,
}
