mod frame_source;
mod metrics_reporter;
mod transport_session;

pub use frame_source::{CaptureHandle, FrameSource};
pub use metrics_reporter::MetricsReporter;
pub use transport_session::TransportSession;
