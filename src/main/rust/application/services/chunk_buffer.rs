use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::Notify;

use super::StatusReporter;
use crate::domain::entities::Chunk;
use crate::domain::errors::BufferError;
use crate::domain::value_objects::{Component, StatusEvent};

/// Occupancy counters of a chunk buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferState {
    pub capacity: usize,
    pub occupancy: usize,
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The buffer was full and the oldest chunk was evicted
    DroppedOldest { seq: u32 },
}

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<Chunk>,
    dropped: u64,
    closed: bool,
}

/// Bounded FIFO between capture and transport with drop-oldest overflow
///
/// `push` never blocks the producer. `pop` suspends until a chunk arrives or
/// the buffer is closed; chunks still queued at close are handed out first.
#[derive(Debug)]
pub struct ChunkBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
    available: Notify,
    reporter: StatusReporter,
}

impl ChunkBuffer {
    pub fn new(capacity: usize, reporter: StatusReporter) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                ..Inner::default()
            }),
            available: Notify::new(),
            reporter,
        }
    }

    pub fn push(&self, chunk: Chunk) -> Result<PushOutcome, BufferError> {
        let seq = chunk.seq();
        let outcome = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(BufferError::Closed);
            }

            let outcome = if inner.queue.len() == self.capacity {
                let evicted = inner.queue.pop_front().map(|old| old.seq()).unwrap_or(seq);
                inner.dropped += 1;
                PushOutcome::DroppedOldest { seq: evicted }
            } else {
                PushOutcome::Queued
            };
            inner.queue.push_back(chunk);
            outcome
        };

        self.available.notify_one();

        if let PushOutcome::DroppedOldest { seq: evicted } = outcome {
            self.reporter.emit(StatusEvent::warning(
                Component::ChunkBuffer,
                format!(
                    "Buffer full ({} chunks), dropped oldest chunk #{}",
                    self.capacity, evicted
                ),
            ));
        }

        Ok(outcome)
    }

    pub async fn pop(&self) -> Result<Chunk, BufferError> {
        loop {
            // Register before checking so a concurrent close or push is not missed
            let notified = self.available.notified();
            {
                let mut inner = self.lock();
                if let Some(chunk) = inner.queue.pop_front() {
                    return Ok(chunk);
                }
                if inner.closed {
                    return Err(BufferError::Closed);
                }
            }
            notified.await;
        }
    }

    pub fn try_pop(&self) -> Option<Chunk> {
        self.lock().queue.pop_front()
    }

    /// Reject further pushes and wake every waiting `pop`
    pub fn close(&self) {
        {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
        }
        self.available.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn state(&self) -> BufferState {
        let inner = self.lock();
        BufferState {
            capacity: self.capacity,
            occupancy: inner.queue.len(),
            dropped: inner.dropped,
        }
    }

    /// Sequence numbers currently queued, oldest first
    pub fn queued_seqs(&self) -> Vec<u32> {
        self.lock().queue.iter().map(Chunk::seq).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
