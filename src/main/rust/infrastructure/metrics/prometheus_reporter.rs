use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::ConnectionState;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Session state (0=Idle, 1=Connecting, 2=Streaming, 3=Reconnecting, 4=Stopped, 5=Failed)
    pub static ref SESSION_STATE: Gauge = Gauge::new(
        "camera_stream_session_state",
        "Current streaming session state"
    ).expect("metric can be created");

    // Total reconnection attempts
    pub static ref RECONNECT_ATTEMPTS: IntCounter = IntCounter::new(
        "reconnect_attempts_total",
        "Total number of reconnection attempts"
    ).expect("metric can be created");

    // Current backoff delay in seconds
    pub static ref BACKOFF_SECONDS: Gauge = Gauge::new(
        "reconnect_backoff_seconds",
        "Current reconnection backoff delay"
    ).expect("metric can be created");

    pub static ref UPTIME_SECONDS: Gauge = Gauge::new(
        "session_uptime_seconds",
        "Time since the session started"
    ).expect("metric can be created");

    pub static ref CHUNKS_SENT: IntCounter = IntCounter::new(
        "chunks_sent_total",
        "Total chunks written to the network"
    ).expect("metric can be created");

    pub static ref BYTES_SENT: IntCounter = IntCounter::new(
        "chunk_bytes_sent_total",
        "Total payload bytes written to the network"
    ).expect("metric can be created");

    // Overflow evictions, not errors
    pub static ref CHUNKS_DROPPED: IntCounter = IntCounter::new(
        "chunks_dropped_total",
        "Total chunks evicted from a full buffer"
    ).expect("metric can be created");

    pub static ref BUFFER_OCCUPANCY: IntGauge = IntGauge::new(
        "chunk_buffer_occupancy",
        "Chunks waiting in the buffer"
    ).expect("metric can be created");
}

pub struct PrometheusReporter;

impl PrometheusReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn init_metrics() -> Result<(), prometheus::Error> {
        REGISTRY.register(Box::new(SESSION_STATE.clone()))?;
        REGISTRY.register(Box::new(RECONNECT_ATTEMPTS.clone()))?;
        REGISTRY.register(Box::new(BACKOFF_SECONDS.clone()))?;
        REGISTRY.register(Box::new(UPTIME_SECONDS.clone()))?;
        REGISTRY.register(Box::new(CHUNKS_SENT.clone()))?;
        REGISTRY.register(Box::new(BYTES_SENT.clone()))?;
        REGISTRY.register(Box::new(CHUNKS_DROPPED.clone()))?;
        REGISTRY.register(Box::new(BUFFER_OCCUPANCY.clone()))?;
        Ok(())
    }

    pub fn gather_metrics() -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return b"# Error encoding metrics\n".to_vec();
        }
        buffer
    }
}

impl Default for PrometheusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsReporter for PrometheusReporter {
    fn report_state_change(&self, state: &ConnectionState) {
        SESSION_STATE.set(state.as_metric());
        if !state.is_active() {
            BUFFER_OCCUPANCY.set(0);
        }
    }

    fn report_reconnect_attempt(&self) {
        RECONNECT_ATTEMPTS.inc();
    }

    fn report_backoff(&self, delay_secs: f64) {
        BACKOFF_SECONDS.set(delay_secs);
    }

    fn report_chunk_sent(&self, bytes: usize) {
        CHUNKS_SENT.inc();
        BYTES_SENT.inc_by(bytes as u64);
    }

    fn report_chunk_dropped(&self) {
        CHUNKS_DROPPED.inc();
    }

    fn report_buffer_occupancy(&self, occupancy: usize) {
        BUFFER_OCCUPANCY.set(occupancy as i64);
    }

    fn report_uptime(&self, uptime_secs: f64) {
        UPTIME_SECONDS.set(uptime_secs);
    }
}
