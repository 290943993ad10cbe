use std::time::SystemTime;

use bytes::Bytes;

/// Largest payload a chunk may carry on the wire (16 MiB)
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// One encoded media unit as it travels from capture to the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    seq: u32,
    captured_at: SystemTime,
    payload: Bytes,
}

impl Chunk {
    pub fn new(seq: u32, payload: Bytes) -> Self {
        Self::with_timestamp(seq, SystemTime::now(), payload)
    }

    pub fn with_timestamp(seq: u32, captured_at: SystemTime, payload: Bytes) -> Self {
        Self {
            seq,
            captured_at,
            payload,
        }
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn is_oversized(&self) -> bool {
        self.payload.len() > MAX_PAYLOAD_LEN
    }
}
