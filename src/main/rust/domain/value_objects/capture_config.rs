use std::time::Duration;

use serde::Serialize;

use crate::domain::errors::{DomainError, Result};

pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;
pub const DEFAULT_FRAME_RATE: u32 = 30;
pub const DEFAULT_BITRATE: u32 = 500_000;
pub const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_millis(100);

/// Capture parameters handed through to the frame source untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureConfig {
    resolution: (u32, u32),
    frame_rate: u32,
    bitrate: u32,
    #[serde(with = "duration_millis")]
    chunk_interval: Duration,
}

impl CaptureConfig {
    pub fn new(width: u32, height: u32, frame_rate: u32, bitrate: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DomainError::InvalidCaptureConfig(format!(
                "resolution {}x{} must be non-zero",
                width, height
            )));
        }
        if frame_rate == 0 {
            return Err(DomainError::InvalidCaptureConfig(
                "frame rate must be non-zero".to_string(),
            ));
        }
        if bitrate == 0 {
            return Err(DomainError::InvalidCaptureConfig(
                "bitrate must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            resolution: (width, height),
            frame_rate,
            bitrate,
            chunk_interval: DEFAULT_CHUNK_INTERVAL,
        })
    }

    pub fn with_chunk_interval(mut self, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(DomainError::InvalidCaptureConfig(
                "chunk interval must be non-zero".to_string(),
            ));
        }
        self.chunk_interval = interval;
        Ok(self)
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn width(&self) -> u32 {
        self.resolution.0
    }

    pub fn height(&self) -> u32 {
        self.resolution.1
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    /// How often the recorder hands over an encoded chunk
    pub fn chunk_interval(&self) -> Duration {
        self.chunk_interval
    }

    /// Nominal encoded bytes per chunk at the configured bitrate
    pub fn nominal_chunk_bytes(&self) -> usize {
        let bytes = self.bitrate as f64 / 8.0 * self.chunk_interval.as_secs_f64();
        (bytes.ceil() as usize).max(1)
    }

    /// Number of chunks covering `window` at the nominal chunk interval
    pub fn chunks_for(&self, window: Duration) -> usize {
        let chunks = window.as_secs_f64() / self.chunk_interval.as_secs_f64();
        (chunks.ceil() as usize).max(1)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            resolution: (DEFAULT_WIDTH, DEFAULT_HEIGHT),
            frame_rate: DEFAULT_FRAME_RATE,
            bitrate: DEFAULT_BITRATE,
            chunk_interval: DEFAULT_CHUNK_INTERVAL,
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
