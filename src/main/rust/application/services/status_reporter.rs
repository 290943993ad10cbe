use futures::Stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::domain::value_objects::{Component, StatusEvent};

/// Events a subscriber may fall behind by before it starts losing the oldest
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Append-only sink fanning status events out to subscribers
///
/// Events are delivered to every live subscriber in emission order. A
/// subscriber only sees events emitted after it subscribed. Each subscriber
/// can lag by at most the feed capacity; past that it skips the oldest events
/// and is told how many it missed.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusReporter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: StatusEvent) {
        match &event {
            StatusEvent::Info { .. } => tracing::info!(component = %event.component(), "{}", event.message()),
            StatusEvent::Warning { .. } => tracing::warn!(component = %event.component(), "{}", event.message()),
            StatusEvent::Error { kind, .. } => {
                tracing::error!(component = %event.component(), kind = ?kind, "{}", event.message())
            }
            StatusEvent::StateChange { from, to, .. } => tracing::info!(
                component = %event.component(),
                from = %from,
                to = %to,
                "{}",
                event.message()
            ),
        }

        // No subscribers is not an error
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> StatusFeed {
        StatusFeed {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's view of the status events
#[derive(Debug)]
pub struct StatusFeed {
    rx: broadcast::Receiver<StatusEvent>,
}

impl StatusFeed {
    /// Wait for the next event; `None` once every reporter handle is gone
    ///
    /// A subscriber that fell behind gets a warning with the number of
    /// skipped events, then continues with the oldest event still retained.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(RecvError::Lagged(skipped)) => Some(lagged(skipped)),
            Err(RecvError::Closed) => None,
        }
    }

    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Lagged(skipped)) => Some(lagged(skipped)),
            Err(TryRecvError::Empty | TryRecvError::Closed) => None,
        }
    }

    /// Everything already queued for this subscriber
    pub fn drain(&mut self) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn into_stream(self) -> impl Stream<Item = StatusEvent> {
        futures::stream::unfold(self, |mut feed| async move {
            let event = feed.recv().await?;
            Some((event, feed))
        })
    }
}

fn lagged(skipped: u64) -> StatusEvent {
    StatusEvent::warning(
        Component::SessionSupervisor,
        format!("Status feed fell behind, {} event(s) skipped", skipped),
    )
}
