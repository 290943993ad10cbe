use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::SinkExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::ChunkCodec;
use crate::domain::entities::Chunk;
use crate::domain::errors::TransportError;
use crate::domain::ports::TransportSession;
use crate::domain::value_objects::{Endpoint, LinkKind};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

enum Link {
    Tcp(TcpStream),
    WebSocket(Box<WebSocketStream<MaybeTlsStream<TcpStream>>>),
}

/// TCP or WebSocket link writing length-prefixed chunks
pub struct NetworkTransport {
    link: Option<Link>,
    connect_timeout: Duration,
    write_timeout: Duration,
    frame: BytesMut,
}

impl NetworkTransport {
    pub fn new() -> Self {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_TIMEOUT)
    }

    pub fn with_timeouts(connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            link: None,
            connect_timeout,
            write_timeout,
            frame: BytesMut::new(),
        }
    }

    async fn open_link(&self, endpoint: &Endpoint) -> Result<Link, String> {
        match endpoint.kind() {
            LinkKind::Tcp => {
                let stream = tokio::time::timeout(
                    self.connect_timeout,
                    TcpStream::connect(endpoint.socket_addr()),
                )
                .await
                .map_err(|_| "connection timeout".to_string())?
                .map_err(|e| e.to_string())?;
                // Chunks are already batched; don't let Nagle hold them back
                stream.set_nodelay(true).map_err(|e| e.to_string())?;
                Ok(Link::Tcp(stream))
            }
            LinkKind::WebSocket => {
                let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(endpoint.url()))
                    .await
                    .map_err(|_| "WebSocket connection timeout".to_string())?
                    .map_err(|e| format!("WebSocket connection failed: {}", e))?;
                Ok(Link::WebSocket(Box::new(stream)))
            }
        }
    }
}

impl Default for NetworkTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportSession for NetworkTransport {
    async fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        self.disconnect().await;

        let link = self
            .open_link(endpoint)
            .await
            .map_err(|reason| TransportError::ConnectFailed {
                address: endpoint.to_string(),
                reason,
            })?;

        tracing::debug!(endpoint = %endpoint, "Transport connected");
        self.link = Some(link);
        Ok(())
    }

    async fn send_chunk(&mut self, chunk: &Chunk) -> Result<(), TransportError> {
        let Some(link) = self.link.as_mut() else {
            return Err(TransportError::WriteFailed("not connected".to_string()));
        };

        self.frame.clear();
        // Nothing has been written yet, so the link stays usable
        ChunkCodec::encode_into(chunk, &mut self.frame)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        let result = match link {
            Link::Tcp(stream) => {
                tokio::time::timeout(self.write_timeout, stream.write_all(&self.frame))
                    .await
                    .map_err(|_| "write timeout".to_string())
                    .and_then(|written| written.map_err(|e| e.to_string()))
            }
            Link::WebSocket(stream) => {
                let message = Message::Binary(self.frame.to_vec());
                tokio::time::timeout(self.write_timeout, stream.send(message))
                    .await
                    .map_err(|_| "write timeout".to_string())
                    .and_then(|sent| sent.map_err(|e| e.to_string()))
            }
        };

        result.map_err(|reason| {
            // A failed write leaves the link in an unknown state
            self.link = None;
            TransportError::WriteFailed(reason)
        })
    }

    async fn disconnect(&mut self) {
        match self.link.take() {
            Some(Link::Tcp(mut stream)) => {
                let _ = stream.shutdown().await;
            }
            Some(Link::WebSocket(mut stream)) => {
                let close = WebSocketStream::close(&mut *stream, None);
                let _ = tokio::time::timeout(self.write_timeout, close).await;
            }
            None => {}
        }
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}
