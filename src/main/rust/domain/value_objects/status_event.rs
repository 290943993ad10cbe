use std::fmt;

use serde::Serialize;

use super::ConnectionState;
use crate::domain::errors::ErrorKind;

/// Pipeline component that emitted a status event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    FrameSource,
    ChunkBuffer,
    TransportSession,
    SessionSupervisor,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FrameSource => "frame_source",
            Self::ChunkBuffer => "chunk_buffer",
            Self::TransportSession => "transport_session",
            Self::SessionSupervisor => "session_supervisor",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum StatusEvent {
    Info {
        component: Component,
        message: String,
    },
    Warning {
        component: Component,
        message: String,
    },
    Error {
        component: Component,
        kind: ErrorKind,
        message: String,
    },
    StateChange {
        component: Component,
        from: ConnectionState,
        to: ConnectionState,
        message: String,
    },
}

impl StatusEvent {
    pub fn info(component: Component, message: impl Into<String>) -> Self {
        Self::Info {
            component,
            message: message.into(),
        }
    }

    pub fn warning(component: Component, message: impl Into<String>) -> Self {
        Self::Warning {
            component,
            message: message.into(),
        }
    }

    pub fn error(component: Component, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            component,
            kind,
            message: message.into(),
        }
    }

    pub fn component(&self) -> Component {
        match self {
            Self::Info { component, .. }
            | Self::Warning { component, .. }
            | Self::Error { component, .. }
            | Self::StateChange { component, .. } => *component,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Info { message, .. }
            | Self::Warning { message, .. }
            | Self::Error { message, .. }
            | Self::StateChange { message, .. } => message,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info { component, message } => write!(f, "[{}] {}", component, message),
            Self::Warning { component, message } => {
                write!(f, "[{}] warning: {}", component, message)
            }
            Self::Error {
                component,
                kind,
                message,
            } => write!(f, "[{}] error ({:?}): {}", component, kind, message),
            Self::StateChange {
                component,
                from,
                to,
                message,
            } => write!(f, "[{}] {} -> {}: {}", component, from, to, message),
        }
    }
}
