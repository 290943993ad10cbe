mod chunk_buffer;
mod session_supervisor;
mod status_reporter;

pub use chunk_buffer::{BufferState, ChunkBuffer, PushOutcome};
pub use session_supervisor::{SessionSupervisor, TransportFactory};
pub use status_reporter::{StatusFeed, StatusReporter, DEFAULT_FEED_CAPACITY};
