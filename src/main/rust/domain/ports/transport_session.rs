use async_trait::async_trait;

use crate::domain::entities::Chunk;
use crate::domain::errors::TransportError;
use crate::domain::value_objects::Endpoint;

/// Port for the outbound network link
///
/// Implementations never retry on their own; recovery is the supervisor's call.
#[async_trait]
pub trait TransportSession: Send {
    async fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError>;

    /// Write one framed chunk. After `WriteFailed` the link is presumed dead.
    async fn send_chunk(&mut self, chunk: &Chunk) -> Result<(), TransportError>;

    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}
