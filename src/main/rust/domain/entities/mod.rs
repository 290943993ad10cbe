mod chunk;
mod session_lifecycle;

pub use chunk::{Chunk, MAX_PAYLOAD_LEN};
pub use session_lifecycle::{SessionLifecycle, SessionSnapshot, StateTransition};
