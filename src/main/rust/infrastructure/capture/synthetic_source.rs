use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::{Interval, MissedTickBehavior};

use crate::domain::errors::CaptureError;
use crate::domain::ports::{CaptureHandle, FrameSource};
use crate::domain::value_objects::CaptureConfig;

/// Largest resolution the generator pretends to support (8K UHD)
const MAX_WIDTH: u32 = 7680;
const MAX_HEIGHT: u32 = 4320;
const MAX_FRAME_RATE: u32 = 240;

/// Generator producing bitrate-sized payloads at the chunk interval
#[derive(Debug, Clone, Default)]
pub struct SyntheticSource {
    limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// End the stream after `chunks` payloads
    pub fn with_limit(mut self, chunks: u64) -> Self {
        self.limit = Some(chunks);
        self
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let (width, height) = config.resolution();
        if width > MAX_WIDTH || height > MAX_HEIGHT {
            return Err(CaptureError::Unsupported(format!(
                "resolution {}x{} exceeds {}x{}",
                width, height, MAX_WIDTH, MAX_HEIGHT
            )));
        }
        if config.frame_rate() > MAX_FRAME_RATE {
            return Err(CaptureError::Unsupported(format!(
                "frame rate {} exceeds {}",
                config.frame_rate(),
                MAX_FRAME_RATE
            )));
        }

        let mut ticker = tokio::time::interval(config.chunk_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(
            chunk_bytes = config.nominal_chunk_bytes(),
            interval = ?config.chunk_interval(),
            "Synthetic source opened"
        );

        Ok(Box::new(SyntheticHandle {
            ticker,
            chunk_bytes: config.nominal_chunk_bytes(),
            produced: 0,
            limit: self.limit,
            open: true,
        }))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

struct SyntheticHandle {
    ticker: Interval,
    chunk_bytes: usize,
    produced: u64,
    limit: Option<u64>,
    open: bool,
}

#[async_trait]
impl CaptureHandle for SyntheticHandle {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, CaptureError> {
        if !self.open || self.limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }

        self.ticker.tick().await;
        self.produced += 1;
        Ok(Some(Bytes::from(vec![(self.produced % 251) as u8; self.chunk_bytes])))
    }

    fn close(&mut self) {
        self.open = false;
    }
}
