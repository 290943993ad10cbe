use std::fmt;

use serde::Serialize;

/// Streaming session lifecycle states (pure domain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session started yet
    #[default]
    Idle,
    /// Capture open, establishing the first connection
    Connecting,
    /// Draining the buffer into the transport
    Streaming,
    /// Connection lost mid-stream, capture still running
    Reconnecting { attempt: u32 },
    /// Stopped by the caller or the source ran dry
    Stopped,
    /// Unrecoverable failure
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Streaming => write!(f, "STREAMING"),
            Self::Reconnecting { attempt } => write!(f, "RECONNECTING (attempt {})", attempt),
            Self::Stopped => write!(f, "STOPPED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl ConnectionState {
    /// Convert state to numeric value for metrics
    pub fn as_metric(&self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::Connecting => 1.0,
            Self::Streaming => 2.0,
            Self::Reconnecting { .. } => 3.0,
            Self::Stopped => 4.0,
            Self::Failed => 5.0,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// A session in this state holds capture and network resources
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Streaming | Self::Reconnecting { .. }
        )
    }

    /// No transition leaves this state except a new `start`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    /// Check if state indicates a problem
    pub fn is_problematic(&self) -> bool {
        matches!(self, Self::Reconnecting { .. } | Self::Failed)
    }
}
