use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use super::{ChunkDecoder, DecodedChunk};
use crate::domain::errors::DecodeError;

const READ_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug, Default)]
struct Counters {
    connections: AtomicU64,
    chunks: AtomicU64,
    bytes: AtomicU64,
    missing: AtomicU64,
    repeated: AtomicU64,
}

/// Totals across every connection the receiver has served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReceiverStats {
    pub connections: u64,
    pub chunks: u64,
    pub bytes: u64,
    /// Sequence numbers skipped (dropped upstream)
    pub missing: u64,
    /// Chunks at or below the last seen sequence (re-sent after a reconnect)
    pub repeated: u64,
}

/// Reference receiver: accepts framed chunk streams over TCP and accounts for them
///
/// It reassembles chunk boundaries and tracks sequence gaps; it does not
/// decode or store media.
pub struct ChunkReceiver {
    listener: TcpListener,
    counters: Arc<Counters>,
    forward: Option<mpsc::UnboundedSender<DecodedChunk>>,
}

impl ChunkReceiver {
    pub async fn bind(address: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self {
            listener,
            counters: Arc::new(Counters::default()),
            forward: None,
        })
    }

    /// Also hand every decoded chunk to the returned channel
    pub fn with_forwarding(mut self) -> (Self, mpsc::UnboundedReceiver<DecodedChunk>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.forward = Some(tx);
        (self, rx)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> ReceiverStats {
        self.counters.snapshot()
    }

    /// Handle for reading stats after `run` has taken ownership
    pub fn stats_handle(&self) -> impl Fn() -> ReceiverStats + Clone + Send + Sync + 'static {
        let counters = self.counters.clone();
        move || counters.snapshot()
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => accepted,
            };

            let (socket, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    continue;
                }
            };

            self.counters.connections.fetch_add(1, Ordering::Relaxed);
            tracing::info!(peer = %peer, "Sender connected");

            let counters = self.counters.clone();
            let forward = self.forward.clone();
            tokio::spawn(async move {
                match serve_connection(socket, &counters, forward.as_ref()).await {
                    Ok(chunks) => tracing::info!(peer = %peer, chunks, "Sender disconnected"),
                    Err(e) => tracing::warn!(peer = %peer, "Connection error: {}", e),
                }
            });
        }
        tracing::info!("Receiver stopped");
    }
}

impl Counters {
    fn snapshot(&self) -> ReceiverStats {
        ReceiverStats {
            connections: self.connections.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            missing: self.missing.load(Ordering::Relaxed),
            repeated: self.repeated.load(Ordering::Relaxed),
        }
    }
}

/// Read framed chunks until EOF; returns the number of chunks decoded
async fn serve_connection<R: AsyncRead + Unpin>(
    mut reader: R,
    counters: &Counters,
    forward: Option<&mpsc::UnboundedSender<DecodedChunk>>,
) -> Result<u64, DecodeError> {
    let mut decoder = ChunkDecoder::new();
    let mut last_seq: Option<u32> = None;
    let mut received = 0u64;

    loop {
        decoder.buffer_mut().reserve(READ_BUFFER_BYTES);
        let read = reader.read_buf(decoder.buffer_mut()).await?;
        if read == 0 {
            decoder.finish()?;
            return Ok(received);
        }

        while let Some(chunk) = decoder.decode()? {
            match last_seq {
                Some(last) if chunk.seq <= last => {
                    counters.repeated.fetch_add(1, Ordering::Relaxed);
                }
                Some(last) if chunk.seq > last + 1 => {
                    let skipped = u64::from(chunk.seq - last - 1);
                    counters.missing.fetch_add(skipped, Ordering::Relaxed);
                    tracing::debug!(from = last, to = chunk.seq, skipped, "Sequence gap");
                }
                _ => {}
            }
            last_seq = Some(last_seq.map_or(chunk.seq, |last| last.max(chunk.seq)));

            received += 1;
            counters.chunks.fetch_add(1, Ordering::Relaxed);
            counters
                .bytes
                .fetch_add(chunk.payload.len() as u64, Ordering::Relaxed);

            if let Some(forward) = forward {
                let _ = forward.send(chunk);
            }
        }
    }
}
