//! ALFA Photo Capture - Configuration
//!
//! Tunables for acquisition, binding, capture and teardown. Loaded from JSON;
//! every field has a default so partial files are accepted.

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::media::FacingMode;

/// Capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera requested when a session does not choose one
    pub default_facing: FacingMode,
    /// Preferred stream width
    pub ideal_width: u32,
    /// Preferred stream height
    pub ideal_height: u32,
    /// Still width used when the sink cannot report its frame size
    pub fallback_width: u32,
    /// Still height used when the sink cannot report its frame size
    pub fallback_height: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Max wait for the sink to become playable
    pub bind_timeout_ms: u64,
    /// Period of the "still on the capture page" sweep
    pub liveness_interval_ms: u64,
    /// Route fragment the capture page lives under
    pub capture_route: String,
    /// Delay between sink-mount probes during initial mount
    pub mount_retry_delay_ms: u64,
    /// Sink-mount probes before giving up
    pub mount_attempts: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            default_facing: FacingMode::Front,
            ideal_width: 1280,
            ideal_height: 720,
            fallback_width: 1280,
            fallback_height: 720,
            jpeg_quality: 90,
            bind_timeout_ms: 10_000,
            liveness_interval_ms: 1_000,
            capture_route: "/media".into(),
            mount_retry_delay_ms: 100,
            mount_attempts: 20,
        }
    }
}

impl CaptureConfig {
    /// Load and validate configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&data)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CaptureConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "jpeg_quality must be 1-100, got {}",
                self.jpeg_quality
            )));
        }
        if self.ideal_width == 0 || self.ideal_height == 0 {
            return Err(ConfigError::Invalid("ideal resolution must be non-zero".into()));
        }
        if self.fallback_width == 0 || self.fallback_height == 0 {
            return Err(ConfigError::Invalid("fallback resolution must be non-zero".into()));
        }
        if self.bind_timeout_ms == 0 {
            return Err(ConfigError::Invalid("bind_timeout_ms must be non-zero".into()));
        }
        if self.liveness_interval_ms == 0 {
            return Err(ConfigError::Invalid("liveness_interval_ms must be non-zero".into()));
        }
        if self.capture_route.is_empty() {
            return Err(ConfigError::Invalid("capture_route must not be empty".into()));
        }
        Ok(())
    }

    pub fn bind_timeout(&self) -> Duration {
        Duration::from_millis(self.bind_timeout_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    pub fn mount_retry_delay(&self) -> Duration {
        Duration::from_millis(self.mount_retry_delay_ms)
    }
}
