use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::domain::entities::{Chunk, MAX_PAYLOAD_LEN};
use crate::domain::errors::{DecodeError, EncodeError};

/// `[u32 BE payload length][u32 BE sequence]`
pub const HEADER_LEN: usize = 8;

/// Largest payload a decoder accepts by default, same cap as the encoder
pub const MAX_FRAME_LEN: usize = MAX_PAYLOAD_LEN;

/// A chunk reassembled on the receiving side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedChunk {
    pub seq: u32,
    pub payload: Bytes,
}

pub struct ChunkCodec;

impl ChunkCodec {
    pub fn encode(chunk: &Chunk) -> Result<Bytes, EncodeError> {
        let mut frame = BytesMut::with_capacity(HEADER_LEN + chunk.len());
        Self::encode_into(chunk, &mut frame)?;
        Ok(frame.freeze())
    }

    /// Appends one frame to `dst`; nothing is written if the payload is too large
    pub fn encode_into(chunk: &Chunk, dst: &mut BytesMut) -> Result<(), EncodeError> {
        let too_large = EncodeError::PayloadTooLarge {
            len: chunk.len(),
            max: MAX_PAYLOAD_LEN,
        };
        if chunk.is_oversized() {
            return Err(too_large);
        }
        let len = u32::try_from(chunk.len()).map_err(|_| too_large)?;

        dst.reserve(HEADER_LEN + chunk.len());
        dst.put_u32(len);
        dst.put_u32(chunk.seq());
        dst.put_slice(chunk.payload());
        Ok(())
    }
}

/// Incremental decoder: feed arbitrary byte slices, take whole chunks out
///
/// Chunk boundaries come purely from the length prefix, so one network read
/// may yield several chunks or only part of one.
#[derive(Debug)]
pub struct ChunkDecoder {
    buf: BytesMut,
    max_frame_len: usize,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_len,
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Mutable access for readers that fill the buffer directly
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Bytes received but not yet returned as a chunk
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn decode(&mut self) -> Result<Option<DecodedChunk>, DecodeError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > self.max_frame_len {
            return Err(DecodeError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        if self.buf.len() < HEADER_LEN + len {
            self.buf.reserve(HEADER_LEN + len - self.buf.len());
            return Ok(None);
        }

        let mut frame = self.buf.split_to(HEADER_LEN + len);
        frame.advance(4);
        let seq = frame.get_u32();
        Ok(Some(DecodedChunk {
            seq,
            payload: frame.freeze(),
        }))
    }

    /// Fails if the stream ended halfway through a frame
    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::Truncated(self.buf.len()))
        }
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}
