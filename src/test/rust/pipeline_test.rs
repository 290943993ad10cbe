use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use pipeline_camera_stream::{
    BackoffPolicy, CaptureConfig, CaptureError, CaptureHandle, Chunk, ChunkReceiver,
    ConnectionState, Endpoint, ErrorKind, FrameSource, MetricsReporter, NetworkTransport,
    SessionSupervisor, StatusEvent, StatusFeed, SupervisorError, SupervisorSettings,
    SyntheticSource, TransportError, TransportSession,
};

// ---------------------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------------------

/// Capture device that counts acquisitions against releases
struct MockSource {
    held: Arc<AtomicI64>,
    opens: Arc<AtomicU32>,
    interval: Duration,
    limit: Option<u32>,
    fail_with: Option<CaptureError>,
    /// Chunks delivered before the device breaks mid-capture
    fail_after: Option<u32>,
    open_delay: Duration,
}

impl MockSource {
    fn new(interval: Duration) -> Self {
        Self {
            held: Arc::new(AtomicI64::new(0)),
            opens: Arc::new(AtomicU32::new(0)),
            interval,
            limit: None,
            fail_with: None,
            fail_after: None,
            open_delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl FrameSource for MockSource {
    async fn open(&self, _config: &CaptureConfig) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        if let Some(e) = &self.fail_with {
            return Err(e.clone());
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.open_delay).await;
        self.held.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockHandle {
            held: self.held.clone(),
            interval: self.interval,
            remaining: self.limit,
            until_failure: self.fail_after,
            open: true,
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockHandle {
    held: Arc<AtomicI64>,
    interval: Duration,
    remaining: Option<u32>,
    until_failure: Option<u32>,
    open: bool,
}

#[async_trait]
impl CaptureHandle for MockHandle {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, CaptureError> {
        if !self.open || self.remaining == Some(0) {
            return Ok(None);
        }
        tokio::time::sleep(self.interval).await;
        if let Some(left) = self.until_failure.as_mut() {
            if *left == 0 {
                return Err(CaptureError::DeviceUnavailable("device unplugged".to_string()));
            }
            *left -= 1;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Ok(Some(Bytes::from_static(b"frame")))
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.held.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Network behaviour shared by every transport the factory hands out
#[derive(Default)]
struct MockNet {
    connected: AtomicI64,
    connect_attempts: AtomicU32,
    failing_connects: AtomicU32,
    refuse_connects: AtomicBool,
    fail_writes: AtomicBool,
    sent: Mutex<Vec<u32>>,
}

impl MockNet {
    fn sent(&self) -> Vec<u32> {
        self.sent.lock().unwrap().clone()
    }
}

struct MockTransport {
    net: Arc<MockNet>,
    connected: bool,
}

impl MockTransport {
    fn drop_link(&mut self) {
        if self.connected {
            self.connected = false;
            self.net.connected.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl TransportSession for MockTransport {
    async fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        self.drop_link();
        self.net.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let scripted_failure = self
            .net
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure || self.net.refuse_connects.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed {
                address: endpoint.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        self.connected = true;
        self.net.connected.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_chunk(&mut self, chunk: &Chunk) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::WriteFailed("not connected".to_string()));
        }
        if self.net.fail_writes.load(Ordering::SeqCst) {
            self.drop_link();
            return Err(TransportError::WriteFailed("broken pipe".to_string()));
        }
        self.net.sent.lock().unwrap().push(chunk.seq());
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.drop_link();
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

struct NoopMetrics;

impl MetricsReporter for NoopMetrics {
    fn report_state_change(&self, _state: &ConnectionState) {}
    fn report_reconnect_attempt(&self) {}
    fn report_backoff(&self, _delay_secs: f64) {}
    fn report_chunk_sent(&self, _bytes: usize) {}
    fn report_chunk_dropped(&self) {}
    fn report_buffer_occupancy(&self, _occupancy: usize) {}
    fn report_uptime(&self, _uptime_secs: f64) {}
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ADDRESS: &str = "tcp://127.0.0.1:9";

fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(40), 2.0).unwrap()
}

fn supervisor_with(
    source: MockSource,
    net: Arc<MockNet>,
    settings: SupervisorSettings,
) -> SessionSupervisor {
    SessionSupervisor::new(
        Arc::new(source),
        Arc::new(move || {
            Box::new(MockTransport {
                net: net.clone(),
                connected: false,
            }) as Box<dyn TransportSession>
        }),
        settings,
        Arc::new(NoopMetrics),
    )
}

/// Wait for a state change matching `pred`, collecting every event seen on the way
async fn wait_for_state(
    feed: &mut StatusFeed,
    seen: &mut Vec<StatusEvent>,
    pred: impl Fn(&ConnectionState) -> bool,
) -> ConnectionState {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let event = feed.recv().await.expect("status feed closed");
            seen.push(event.clone());
            if let StatusEvent::StateChange { to, .. } = event {
                if pred(&to) {
                    return to;
                }
            }
        }
    })
    .await
    .expect("timed out waiting for state")
}

fn states(events: &[StatusEvent]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|event| match event {
            StatusEvent::StateChange { to, .. } => Some(*to),
            _ => None,
        })
        .collect()
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held")
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_stop_from_idle_is_idempotent() {
    let net = Arc::new(MockNet::default());
    let settings = SupervisorSettings::new(4, fast_backoff()).unwrap();
    let supervisor = supervisor_with(MockSource::new(Duration::from_millis(5)), net, settings);
    assert_eq!(supervisor.status().state, ConnectionState::Idle);

    supervisor.stop().await;
    supervisor.stop().await;
    assert_eq!(supervisor.status().state, ConnectionState::Stopped);
}

#[tokio::test]
async fn test_stop_while_connecting_releases_resources() {
    let source = MockSource::new(Duration::from_millis(5));
    let held = source.held.clone();
    let net = Arc::new(MockNet::default());
    net.refuse_connects.store(true, Ordering::SeqCst);
    let settings = SupervisorSettings::new(4, BackoffPolicy::default())
        .unwrap()
        .with_connect_retries(100);
    let supervisor = supervisor_with(source, net.clone(), settings);

    supervisor.start(ADDRESS, CaptureConfig::default()).await.unwrap();
    assert_eq!(supervisor.status().state, ConnectionState::Connecting);
    wait_until(|| net.connect_attempts.load(Ordering::SeqCst) >= 1).await;

    supervisor.stop().await;
    assert_eq!(supervisor.status().state, ConnectionState::Stopped);
    assert_eq!(held.load(Ordering::SeqCst), 0);
    assert_eq!(net.connected.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stop_while_streaming_releases_resources() {
    let source = MockSource::new(Duration::from_millis(5));
    let held = source.held.clone();
    let net = Arc::new(MockNet::default());
    let settings = SupervisorSettings::new(4, fast_backoff()).unwrap();
    let supervisor = supervisor_with(source, net.clone(), settings);
    let mut feed = supervisor.subscribe();
    let mut seen = Vec::new();

    supervisor.start(ADDRESS, CaptureConfig::default()).await.unwrap();
    wait_for_state(&mut feed, &mut seen, ConnectionState::is_streaming).await;
    wait_until(|| net.sent().len() >= 3).await;
    assert!(supervisor.is_streaming());
    assert_eq!(held.load(Ordering::SeqCst), 1);
    assert_eq!(net.connected.load(Ordering::SeqCst), 1);

    let stopper = supervisor.clone();
    tokio::spawn(async move { stopper.stop().await }).await.unwrap();

    assert_eq!(supervisor.status().state, ConnectionState::Stopped);
    assert!(!supervisor.is_streaming());
    assert_eq!(held.load(Ordering::SeqCst), 0);
    assert_eq!(net.connected.load(Ordering::SeqCst), 0);

    // Sequence numbers start at 1 and are never reordered
    let sent = net.sent();
    assert_eq!(sent[0], 1);
    assert!(sent.windows(2).all(|pair| pair[1] == pair[0] + 1));
}

#[tokio::test]
async fn test_stop_while_reconnecting_releases_resources() {
    let source = MockSource::new(Duration::from_millis(5));
    let held = source.held.clone();
    let net = Arc::new(MockNet::default());
    let settings = SupervisorSettings::new(4, fast_backoff()).unwrap();
    let supervisor = supervisor_with(source, net.clone(), settings);
    let mut feed = supervisor.subscribe();
    let mut seen = Vec::new();

    supervisor.start(ADDRESS, CaptureConfig::default()).await.unwrap();
    wait_for_state(&mut feed, &mut seen, ConnectionState::is_streaming).await;

    net.refuse_connects.store(true, Ordering::SeqCst);
    net.fail_writes.store(true, Ordering::SeqCst);
    wait_for_state(&mut feed, &mut seen, |state| {
        matches!(state, ConnectionState::Reconnecting { attempt } if *attempt >= 2)
    })
    .await;

    supervisor.stop().await;
    assert_eq!(supervisor.status().state, ConnectionState::Stopped);
    assert_eq!(held.load(Ordering::SeqCst), 0);
    assert_eq!(net.connected.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connect_gives_up_then_stop_from_failed() {
    let source = MockSource::new(Duration::from_millis(5));
    let held = source.held.clone();
    let net = Arc::new(MockNet::default());
    net.refuse_connects.store(true, Ordering::SeqCst);
    let settings = SupervisorSettings::new(4, fast_backoff())
        .unwrap()
        .with_connect_retries(2);
    let supervisor = supervisor_with(source, net.clone(), settings);
    let mut feed = supervisor.subscribe();
    let mut seen = Vec::new();

    supervisor.start(ADDRESS, CaptureConfig::default()).await.unwrap();
    wait_for_state(&mut feed, &mut seen, |state| *state == ConnectionState::Failed).await;

    // First attempt plus two retries
    assert_eq!(net.connect_attempts.load(Ordering::SeqCst), 3);
    // Capture is released before Failed is announced
    assert_eq!(held.load(Ordering::SeqCst), 0);

    let error = tokio::time::timeout(Duration::from_secs(1), feed.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        error,
        StatusEvent::Error {
            kind: ErrorKind::ConnectFailed,
            ..
        }
    ));

    supervisor.stop().await;
    assert_eq!(supervisor.status().state, ConnectionState::Stopped);
    assert_eq!(net.connected.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_succeeds_on_third_attempt_after_backoff() {
    let net = Arc::new(MockNet::default());
    net.failing_connects.store(2, Ordering::SeqCst);
    // Room for everything captured during the backoff
    let settings = SupervisorSettings::new(32, BackoffPolicy::default()).unwrap();
    let supervisor = supervisor_with(MockSource::new(Duration::from_millis(100)), net.clone(), settings);
    let mut feed = supervisor.subscribe();
    let mut seen = Vec::new();

    let started_at = tokio::time::Instant::now();
    supervisor.start(ADDRESS, CaptureConfig::default()).await.unwrap();
    wait_for_state(&mut feed, &mut seen, ConnectionState::is_streaming).await;

    // 500ms after the first failure, 1s after the second
    assert!(started_at.elapsed() >= Duration::from_millis(1500));
    assert_eq!(net.connect_attempts.load(Ordering::SeqCst), 3);

    assert_eq!(
        states(&seen),
        vec![ConnectionState::Connecting, ConnectionState::Streaming]
    );
    let warnings = seen
        .iter()
        .filter(|event| matches!(event, StatusEvent::Warning { .. }))
        .count();
    assert_eq!(warnings, 2);

    supervisor.stop().await;
}

#[tokio::test]
async fn test_write_failure_reconnects_with_capture_running() {
    let source = MockSource::new(Duration::from_millis(2));
    let held = source.held.clone();
    let net = Arc::new(MockNet::default());
    let settings = SupervisorSettings::new(4, fast_backoff()).unwrap();
    let supervisor = supervisor_with(source, net.clone(), settings);
    let mut feed = supervisor.subscribe();
    let mut seen = Vec::new();

    supervisor.start(ADDRESS, CaptureConfig::default()).await.unwrap();
    wait_for_state(&mut feed, &mut seen, ConnectionState::is_streaming).await;
    wait_until(|| !net.sent().is_empty()).await;

    net.refuse_connects.store(true, Ordering::SeqCst);
    net.fail_writes.store(true, Ordering::SeqCst);
    wait_for_state(&mut feed, &mut seen, |state| {
        matches!(state, ConnectionState::Reconnecting { .. })
    })
    .await;

    // Capture keeps filling the buffer and overflow drops the oldest
    assert_eq!(held.load(Ordering::SeqCst), 1);
    wait_until(|| supervisor.status().chunks_dropped > 0).await;
    assert_eq!(supervisor.status().buffered, 4);
    assert!(!seen.iter().any(StatusEvent::is_error));

    net.fail_writes.store(false, Ordering::SeqCst);
    net.refuse_connects.store(false, Ordering::SeqCst);
    wait_for_state(&mut feed, &mut seen, ConnectionState::is_streaming).await;
    wait_until(|| supervisor.status().buffered < 4).await;

    supervisor.stop().await;

    // Gaps from dropped chunks are fine; repeats and reordering are not
    let sent = net.sent();
    assert!(sent.windows(2).all(|pair| pair[1] > pair[0]));
    assert!(seen.iter().any(|event| matches!(
        event,
        StatusEvent::Warning { message, .. } if message.contains("dropped oldest")
    )));
    assert_eq!(held.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reconnect_gives_up_after_max_attempts() {
    let source = MockSource::new(Duration::from_millis(5));
    let held = source.held.clone();
    let net = Arc::new(MockNet::default());
    let settings = SupervisorSettings::new(4, fast_backoff())
        .unwrap()
        .with_max_reconnect_attempts(Some(2));
    let supervisor = supervisor_with(source, net.clone(), settings);
    let mut feed = supervisor.subscribe();
    let mut seen = Vec::new();

    supervisor.start(ADDRESS, CaptureConfig::default()).await.unwrap();
    wait_for_state(&mut feed, &mut seen, ConnectionState::is_streaming).await;
    let connects_before = net.connect_attempts.load(Ordering::SeqCst);

    net.refuse_connects.store(true, Ordering::SeqCst);
    net.fail_writes.store(true, Ordering::SeqCst);
    wait_for_state(&mut feed, &mut seen, |state| *state == ConnectionState::Failed).await;

    assert_eq!(net.connect_attempts.load(Ordering::SeqCst) - connects_before, 2);
    assert_eq!(
        states(&seen),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Streaming,
            ConnectionState::Reconnecting { attempt: 1 },
            ConnectionState::Reconnecting { attempt: 2 },
            ConnectionState::Failed,
        ]
    );
    assert_eq!(held.load(Ordering::SeqCst), 0);
    assert_eq!(net.connected.load(Ordering::SeqCst), 0);

    let error = tokio::time::timeout(Duration::from_secs(1), feed.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        error,
        StatusEvent::Error {
            kind: ErrorKind::ConnectFailed,
            ..
        }
    ));

    supervisor.stop().await;
    assert_eq!(supervisor.status().state, ConnectionState::Stopped);
}

#[tokio::test]
async fn test_capture_failure_mid_stream_fails_session() {
    let mut source = MockSource::new(Duration::from_millis(5));
    source.fail_after = Some(3);
    let held = source.held.clone();
    let net = Arc::new(MockNet::default());
    let settings = SupervisorSettings::new(8, fast_backoff()).unwrap();
    let supervisor = supervisor_with(source, net.clone(), settings);
    let mut feed = supervisor.subscribe();
    let mut seen = Vec::new();

    supervisor.start(ADDRESS, CaptureConfig::default()).await.unwrap();
    let terminal = wait_for_state(&mut feed, &mut seen, |state| state.is_terminal()).await;
    assert_eq!(terminal, ConnectionState::Failed);
    assert_eq!(supervisor.status().state, ConnectionState::Failed);

    let error = tokio::time::timeout(Duration::from_secs(1), feed.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        error,
        StatusEvent::Error {
            kind: ErrorKind::DeviceUnavailable,
            ..
        }
    ));

    // Not mistaken for a clean end of capture, and never retried
    assert!(!seen.iter().any(|event| event.message() == "Capture source ended"));
    assert_eq!(net.connect_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(held.load(Ordering::SeqCst), 0);
    assert_eq!(net.connected.load(Ordering::SeqCst), 0);
    assert!(net.sent().len() <= 3);
}

#[tokio::test]
async fn test_stop_cancels_start_blocked_on_slow_device() {
    let mut source = MockSource::new(Duration::from_millis(5));
    source.open_delay = Duration::from_secs(30);
    let held = source.held.clone();
    let opens = source.opens.clone();
    let net = Arc::new(MockNet::default());
    let settings = SupervisorSettings::new(4, fast_backoff()).unwrap();
    let supervisor = supervisor_with(source, net.clone(), settings);

    let starter = supervisor.clone();
    let start = tokio::spawn(async move {
        starter.start(ADDRESS, CaptureConfig::default()).await
    });
    wait_until(|| opens.load(Ordering::SeqCst) == 1).await;
    assert_eq!(supervisor.status().state, ConnectionState::Connecting);

    tokio::time::timeout(Duration::from_secs(1), supervisor.stop())
        .await
        .expect("stop waited for the device to open");

    let result = start.await.unwrap();
    assert!(matches!(result, Err(SupervisorError::Cancelled)));
    assert_eq!(supervisor.status().state, ConnectionState::Stopped);
    assert_eq!(held.load(Ordering::SeqCst), 0);
    assert_eq!(net.connect_attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_capture_error_fails_immediately() {
    let mut source = MockSource::new(Duration::from_millis(5));
    source.fail_with = Some(CaptureError::DeviceUnavailable("/dev/video0 busy".to_string()));
    let net = Arc::new(MockNet::default());
    let settings = SupervisorSettings::new(4, fast_backoff()).unwrap();
    let supervisor = supervisor_with(source, net.clone(), settings);
    let mut feed = supervisor.subscribe();

    let result = supervisor.start(ADDRESS, CaptureConfig::default()).await;
    assert!(matches!(
        result,
        Err(SupervisorError::Capture(CaptureError::DeviceUnavailable(_)))
    ));
    assert_eq!(supervisor.status().state, ConnectionState::Failed);
    assert_eq!(net.connect_attempts.load(Ordering::SeqCst), 0);

    let events = feed.drain();
    assert!(events.iter().any(|event| matches!(
        event,
        StatusEvent::Error {
            kind: ErrorKind::DeviceUnavailable,
            ..
        }
    )));
    assert!(matches!(
        events.last(),
        Some(StatusEvent::Error { .. })
    ));
}

#[tokio::test]
async fn test_source_end_drains_and_stops() {
    let mut source = MockSource::new(Duration::from_millis(2));
    source.limit = Some(3);
    let held = source.held.clone();
    let net = Arc::new(MockNet::default());
    let settings = SupervisorSettings::new(8, fast_backoff()).unwrap();
    let supervisor = supervisor_with(source, net.clone(), settings);
    let mut feed = supervisor.subscribe();
    let mut seen = Vec::new();

    supervisor.start(ADDRESS, CaptureConfig::default()).await.unwrap();
    wait_for_state(&mut feed, &mut seen, |state| *state == ConnectionState::Stopped).await;

    assert_eq!(net.sent(), vec![1, 2, 3]);
    assert_eq!(supervisor.status().chunks_sent, 3);
    assert_eq!(held.load(Ordering::SeqCst), 0);
    assert_eq!(net.connected.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_second_start_is_rejected_until_stopped() {
    let source = MockSource::new(Duration::from_millis(5));
    let opens = source.opens.clone();
    let net = Arc::new(MockNet::default());
    let settings = SupervisorSettings::new(4, fast_backoff()).unwrap();
    let supervisor = supervisor_with(source, net, settings);

    let first = supervisor.start(ADDRESS, CaptureConfig::default()).await.unwrap();
    let second = supervisor.start(ADDRESS, CaptureConfig::default()).await;
    assert!(matches!(second, Err(SupervisorError::AlreadyActive(_))));
    assert_eq!(opens.load(Ordering::SeqCst), 1);

    supervisor.stop().await;
    let third = supervisor.start(ADDRESS, CaptureConfig::default()).await.unwrap();
    assert_ne!(first, third);
    assert_eq!(supervisor.status().session_id, Some(third));
    supervisor.stop().await;
}

#[tokio::test]
async fn test_invalid_address_is_rejected_before_capture() {
    let source = MockSource::new(Duration::from_millis(5));
    let opens = source.opens.clone();
    let net = Arc::new(MockNet::default());
    let settings = SupervisorSettings::new(4, fast_backoff()).unwrap();
    let supervisor = supervisor_with(source, net, settings);

    let result = supervisor
        .start("srt://127.0.0.1:9000", CaptureConfig::default())
        .await;
    assert!(matches!(result, Err(SupervisorError::InvalidAddress(_))));
    assert_eq!(opens.load(Ordering::SeqCst), 0);
    assert_eq!(supervisor.status().state, ConnectionState::Idle);
}

// ---------------------------------------------------------------------------
// End to end over loopback TCP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_streams_to_reference_receiver() {
    let (receiver, mut chunks) = ChunkReceiver::bind("127.0.0.1:0")
        .await
        .unwrap()
        .with_forwarding();
    let address = format!("tcp://{}", receiver.local_addr().unwrap());
    let stats = receiver.stats_handle();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(receiver.run(async {
        stop_rx.await.ok();
    }));

    let config = CaptureConfig::default()
        .with_chunk_interval(Duration::from_millis(5))
        .unwrap();
    let settings = SupervisorSettings::new(8, fast_backoff()).unwrap();
    let supervisor = SessionSupervisor::new(
        Arc::new(SyntheticSource::new().with_limit(5)),
        Arc::new(|| Box::new(NetworkTransport::new()) as Box<dyn TransportSession>),
        settings,
        Arc::new(NoopMetrics),
    );
    let mut feed = supervisor.subscribe();
    let mut seen = Vec::new();

    supervisor.start(&address, config).await.unwrap();
    wait_for_state(&mut feed, &mut seen, |state| state.is_terminal()).await;
    assert_eq!(supervisor.status().state, ConnectionState::Stopped);

    for expected in 1..=5u32 {
        let chunk = tokio::time::timeout(Duration::from_secs(5), chunks.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chunk.seq, expected);
        assert_eq!(chunk.payload.len(), config.nominal_chunk_bytes());
    }

    let totals = stats();
    assert_eq!(totals.connections, 1);
    assert_eq!(totals.missing, 0);
    assert_eq!(totals.repeated, 0);

    stop_tx.send(()).unwrap();
    server.await.unwrap();
}
