use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::errors::CaptureError;
use crate::domain::value_objects::CaptureConfig;

/// Port for capture devices producing encoded media
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Acquire the device exclusively with the given parameters
    async fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureHandle>, CaptureError>;

    /// Human-readable device name for logs
    fn name(&self) -> &str;
}

/// An open capture device. Dropping the handle must release the device.
#[async_trait]
pub trait CaptureHandle: Send {
    /// Wait for the next encoded payload; `Ok(None)` once closed or exhausted.
    /// A device that fails mid-capture returns `Err`, which ends the session.
    /// Must be cancel-safe: the pump drops this future on shutdown.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, CaptureError>;

    /// Release the device. Calling it more than once is a no-op.
    fn close(&mut self);
}
