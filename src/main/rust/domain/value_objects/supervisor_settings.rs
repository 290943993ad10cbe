use crate::domain::errors::{DomainError, Result};

use super::BackoffPolicy;

/// Roughly two seconds of chunks at the nominal 100ms chunk interval
pub const DEFAULT_BUFFER_CAPACITY: usize = 20;
pub const DEFAULT_CONNECT_RETRIES: u32 = 3;

/// Recovery and buffering policy applied to every session
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorSettings {
    buffer_capacity: usize,
    connect_retries: u32,
    max_reconnect_attempts: Option<u32>,
    backoff: BackoffPolicy,
}

impl SupervisorSettings {
    pub fn new(buffer_capacity: usize, backoff: BackoffPolicy) -> Result<Self> {
        if buffer_capacity == 0 {
            return Err(DomainError::InvalidBufferCapacity);
        }

        Ok(Self {
            buffer_capacity,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            max_reconnect_attempts: None,
            backoff,
        })
    }

    /// Retries after the first failed connect before the session fails
    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }

    /// `None` keeps reconnecting until stopped
    pub fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    pub fn connect_retries(&self) -> u32 {
        self.connect_retries
    }

    pub fn max_reconnect_attempts(&self) -> Option<u32> {
        self.max_reconnect_attempts
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            max_reconnect_attempts: None,
            backoff: BackoffPolicy::default(),
        }
    }
}
