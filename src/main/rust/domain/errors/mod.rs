use serde::Serialize;
use thiserror::Error;

/// Configuration and value object validation errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid endpoint address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid port: port cannot be zero")]
    InvalidPort,

    #[error("Invalid backoff multiplier: must be > 1.0")]
    InvalidBackoffMultiplier,

    #[error("Invalid backoff delays: initial {initial_ms}ms, max {max_ms}ms")]
    InvalidBackoffDelay { initial_ms: u128, max_ms: u128 },

    #[error("Invalid capture config: {0}")]
    InvalidCaptureConfig(String),

    #[error("Buffer capacity must be at least 1")]
    InvalidBufferCapacity,
}

pub type Result<T> = std::result::Result<T, DomainError>;

/// Flat error classification carried by terminal status events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DeviceUnavailable,
    Unsupported,
    ConnectFailed,
    WriteFailed,
    BufferClosed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Unsupported capture parameters: {0}")]
    Unsupported(String),
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            Self::Unsupported(_) => ErrorKind::Unsupported,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connect to {address} failed: {reason}")]
    ConnectFailed { address: String, reason: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectFailed { .. } => ErrorKind::ConnectFailed,
            Self::WriteFailed(_) => ErrorKind::WriteFailed,
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("Chunk buffer closed")]
    Closed,
}

impl BufferError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::BufferClosed
    }
}

/// Errors raised while framing a chunk for the wire
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Payload of {len} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Errors raised while reassembling framed chunks from a byte stream
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Frame of {len} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Stream ended inside a frame ({0} bytes left over)")]
    Truncated(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the supervisor control surface
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("A streaming session is already active ({0})")]
    AlreadyActive(String),

    #[error(transparent)]
    InvalidAddress(#[from] DomainError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Start cancelled by stop")]
    Cancelled,
}
