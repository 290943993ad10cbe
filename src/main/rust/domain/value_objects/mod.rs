mod backoff_policy;
mod capture_config;
mod connection_state;
mod endpoint;
mod status_event;
mod supervisor_settings;

pub use backoff_policy::BackoffPolicy;
pub use capture_config::{
    CaptureConfig, DEFAULT_BITRATE, DEFAULT_CHUNK_INTERVAL, DEFAULT_FRAME_RATE, DEFAULT_HEIGHT,
    DEFAULT_WIDTH,
};
pub use connection_state::ConnectionState;
pub use endpoint::{Endpoint, LinkKind};
pub use status_event::{Component, StatusEvent};
pub use supervisor_settings::{
    SupervisorSettings, DEFAULT_BUFFER_CAPACITY, DEFAULT_CONNECT_RETRIES,
};
