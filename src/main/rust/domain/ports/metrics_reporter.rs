use crate::domain::value_objects::ConnectionState;

/// Port for metrics reporting
pub trait MetricsReporter: Send + Sync {
    fn report_state_change(&self, state: &ConnectionState);
    fn report_reconnect_attempt(&self);
    fn report_backoff(&self, delay_secs: f64);
    fn report_chunk_sent(&self, bytes: usize);
    fn report_chunk_dropped(&self);
    fn report_buffer_occupancy(&self, occupancy: usize);
    fn report_uptime(&self, uptime_secs: f64);
}
