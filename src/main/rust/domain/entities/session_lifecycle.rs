use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::domain::value_objects::ConnectionState;

/// Transitions kept per session; older entries are discarded
const MAX_HISTORY: usize = 64;

/// State transition record
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub timestamp: Instant,
    pub reason: Option<String>,
}

/// Point-in-time view of the current (or most recent) session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Option<Uuid>,
    pub address: Option<String>,
    pub state: ConnectionState,
    pub chunks_sent: u64,
    pub chunks_dropped: u64,
    pub buffered: usize,
    pub uptime_secs: Option<f64>,
}

/// Domain entity representing one session's lifecycle
#[derive(Debug, Default)]
pub struct SessionLifecycle {
    session_id: Option<Uuid>,
    address: Option<String>,
    current_state: ConnectionState,
    state_history: VecDeque<StateTransition>,
    started_at: Option<Instant>,
    stopping: bool,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn current_state(&self) -> &ConnectionState {
        &self.current_state
    }

    /// Time since the session first reached Streaming
    pub fn uptime(&self) -> Option<Duration> {
        self.started_at.map(|start| start.elapsed())
    }

    pub fn transition_count(&self) -> usize {
        self.state_history.len()
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.state_history.back()
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    /// Start a fresh session; history of the previous one is discarded
    pub fn begin(&mut self, address: String) -> (Uuid, StateTransition) {
        let id = Uuid::new_v4();

        self.session_id = Some(id);
        self.address = Some(address);
        self.state_history.clear();
        self.started_at = None;
        self.stopping = false;

        let transition = self.record_transition(ConnectionState::Connecting, None);
        (id, transition)
    }

    /// From here on only the Stopped transition is accepted
    pub fn mark_stopping(&mut self) {
        self.stopping = true;
    }

    pub fn transition_to_streaming(&mut self) -> Option<StateTransition> {
        let transition = self.try_transition(ConnectionState::Streaming, None)?;

        // Track start time when first becoming active
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        Some(transition)
    }

    pub fn transition_to_reconnecting(
        &mut self,
        attempt: u32,
        reason: Option<String>,
    ) -> Option<StateTransition> {
        self.try_transition(ConnectionState::Reconnecting { attempt }, reason)
    }

    pub fn transition_to_failed(&mut self, reason: Option<String>) -> Option<StateTransition> {
        self.try_transition(ConnectionState::Failed, reason)
    }

    pub fn transition_to_stopped(&mut self, reason: Option<String>) -> Option<StateTransition> {
        if self.current_state == ConnectionState::Stopped {
            return None;
        }
        Some(self.record_transition(ConnectionState::Stopped, reason))
    }

    /// Pure business rule: is the move to `next` legal from here?
    pub fn can_transition_to(&self, next: &ConnectionState) -> bool {
        if *next == ConnectionState::Stopped {
            return self.current_state != ConnectionState::Stopped;
        }
        if self.stopping || self.current_state.is_terminal() {
            return false;
        }
        match (self.current_state, next) {
            (ConnectionState::Idle, _) => false,
            (ConnectionState::Connecting, ConnectionState::Streaming | ConnectionState::Failed) => {
                true
            }
            (
                ConnectionState::Streaming,
                ConnectionState::Reconnecting { .. } | ConnectionState::Failed,
            ) => true,
            (
                ConnectionState::Reconnecting { .. },
                ConnectionState::Reconnecting { .. }
                | ConnectionState::Streaming
                | ConnectionState::Failed,
            ) => true,
            _ => false,
        }
    }

    /// Pure business rule: should we continue retrying?
    pub fn should_continue_retrying(&self, max_attempts: Option<u32>) -> bool {
        if self.stopping {
            return false;
        }
        if let ConnectionState::Reconnecting { attempt } = self.current_state {
            match max_attempts {
                Some(max) => attempt < max,
                None => true,
            }
        } else {
            false
        }
    }

    pub fn snapshot(&self, chunks_sent: u64, chunks_dropped: u64, buffered: usize) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            address: self.address.clone(),
            state: self.current_state,
            chunks_sent,
            chunks_dropped,
            buffered,
            uptime_secs: self.uptime().map(|uptime| uptime.as_secs_f64()),
        }
    }

    fn try_transition(
        &mut self,
        new_state: ConnectionState,
        reason: Option<String>,
    ) -> Option<StateTransition> {
        if !self.can_transition_to(&new_state) {
            tracing::debug!(
                from = %self.current_state,
                to = %new_state,
                "Ignoring transition"
            );
            return None;
        }
        Some(self.record_transition(new_state, reason))
    }

    fn record_transition(
        &mut self,
        new_state: ConnectionState,
        reason: Option<String>,
    ) -> StateTransition {
        let transition = StateTransition {
            from: self.current_state,
            to: new_state,
            timestamp: Instant::now(),
            reason,
        };

        if self.state_history.len() == MAX_HISTORY {
            self.state_history.pop_front();
        }
        self.state_history.push_back(transition.clone());
        self.current_state = new_state;
        transition
    }
}
