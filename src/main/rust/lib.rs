pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-exports for convenience
pub use application::services::{
    BufferState, ChunkBuffer, PushOutcome, SessionSupervisor, StatusFeed, StatusReporter,
    TransportFactory, DEFAULT_FEED_CAPACITY,
};
pub use config::{Command, Config, ReceiveArgs, SourceKind, StreamArgs};
pub use domain::entities::{Chunk, SessionLifecycle, MAX_PAYLOAD_LEN, SessionSnapshot, StateTransition};
pub use domain::errors::{
    BufferError, CaptureError, DecodeError, DomainError, EncodeError, ErrorKind, Result,
    SupervisorError, TransportError,
};
pub use domain::ports::{CaptureHandle, FrameSource, MetricsReporter, TransportSession};
pub use domain::value_objects::{
    BackoffPolicy, CaptureConfig, Component, ConnectionState, Endpoint, LinkKind, StatusEvent,
    SupervisorSettings,
};
pub use infrastructure::capture::{FileReplaySource, SyntheticSource};
#[cfg(feature = "gstreamer")]
pub use infrastructure::gstreamer::GStreamerSource;
pub use infrastructure::gstreamer::PipelineBuilder;
pub use infrastructure::metrics::{serve_metrics, PrometheusReporter};
pub use infrastructure::network::{
    ChunkCodec, ChunkDecoder, ChunkReceiver, DecodedChunk, NetworkTransport, ReceiverStats,
};
