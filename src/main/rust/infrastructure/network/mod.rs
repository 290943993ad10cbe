mod chunk_codec;
mod chunk_receiver;
mod network_transport;

pub use chunk_codec::{ChunkCodec, ChunkDecoder, DecodedChunk, HEADER_LEN, MAX_FRAME_LEN};
pub use chunk_receiver::{ChunkReceiver, ReceiverStats};
pub use network_transport::{NetworkTransport, DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_TIMEOUT};
