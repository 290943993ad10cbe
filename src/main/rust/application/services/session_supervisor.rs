use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{ChunkBuffer, PushOutcome, StatusFeed, StatusReporter};
use crate::domain::entities::{
    Chunk, SessionLifecycle, SessionSnapshot, StateTransition, MAX_PAYLOAD_LEN,
};
use crate::domain::errors::{
    BufferError, CaptureError, ErrorKind, SupervisorError, TransportError,
};
use crate::domain::ports::{CaptureHandle, FrameSource, MetricsReporter, TransportSession};
use crate::domain::value_objects::{
    CaptureConfig, Component, Endpoint, StatusEvent, SupervisorSettings,
};

/// Builds a fresh transport for every session
pub type TransportFactory = Arc<dyn Fn() -> Box<dyn TransportSession> + Send + Sync>;

/// Application service owning the streaming session state machine
///
/// Cloning yields another handle onto the same supervisor, so `stop` can be
/// called from any task.
#[derive(Clone)]
pub struct SessionSupervisor {
    shared: Arc<Shared>,
    control: Arc<tokio::sync::Mutex<Option<ActiveSession>>>,
}

struct Shared {
    source: Arc<dyn FrameSource>,
    transports: TransportFactory,
    settings: SupervisorSettings,
    reporter: StatusReporter,
    metrics: Arc<dyn MetricsReporter>,
    state: Mutex<SessionState>,
}

/// Single source of truth read by `status()`; every transition goes through this lock
#[derive(Default)]
struct SessionState {
    lifecycle: SessionLifecycle,
    buffer: Option<Arc<ChunkBuffer>>,
    sent: Arc<AtomicU64>,
    /// Set while `start` waits on the capture device
    abort_open: Option<oneshot::Sender<()>>,
}

struct ActiveSession {
    stop_tx: watch::Sender<bool>,
    buffer: Arc<ChunkBuffer>,
    task: JoinHandle<()>,
}

struct SessionContext {
    endpoint: Endpoint,
    buffer: Arc<ChunkBuffer>,
    sent: Arc<AtomicU64>,
    stop_rx: watch::Receiver<bool>,
}

enum ConnectOutcome {
    Connected,
    Stopped,
    GaveUp(TransportError),
}

enum DrainOutcome {
    Stopped,
    SourceEnded,
    WriteFailed(TransportError),
}

enum SessionEnd {
    Stopped,
    SourceEnded,
    Failed(ErrorKind, String),
}

impl SessionSupervisor {
    pub fn new(
        source: Arc<dyn FrameSource>,
        transports: TransportFactory,
        settings: SupervisorSettings,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                transports,
                settings,
                reporter: StatusReporter::new(),
                metrics,
                state: Mutex::new(SessionState::default()),
            }),
            control: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub fn reporter(&self) -> StatusReporter {
        self.shared.reporter.clone()
    }

    pub fn subscribe(&self) -> StatusFeed {
        self.shared.reporter.subscribe()
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.shared.settings
    }

    /// Snapshot of the current (or most recent) session
    pub fn status(&self) -> SessionSnapshot {
        self.shared.snapshot()
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.lock_state().lifecycle.current_state().is_streaming()
    }

    /// Open the capture device and start streaming to `address`
    ///
    /// Returns once the capture device is open; connecting happens in the
    /// background and is observable through `status()` and `subscribe()`.
    pub async fn start(
        &self,
        address: &str,
        config: CaptureConfig,
    ) -> Result<Uuid, SupervisorError> {
        let endpoint = Endpoint::parse(address)?;
        let mut control = self.control.lock().await;

        if let Some(active) = control.as_ref() {
            if !active.task.is_finished() {
                let current = self.shared.lock_state().lifecycle.session_id();
                return Err(SupervisorError::AlreadyActive(
                    current.map(|id| id.to_string()).unwrap_or_default(),
                ));
            }
        }
        if let Some(finished) = control.take() {
            let _ = finished.task.await;
        }

        let buffer = Arc::new(ChunkBuffer::new(
            self.shared.settings.buffer_capacity(),
            self.shared.reporter.clone(),
        ));
        let sent = Arc::new(AtomicU64::new(0));

        let (abort_tx, abort_rx) = oneshot::channel();
        let session_id = {
            let mut state = self.shared.lock_state();
            let (id, transition) = state.lifecycle.begin(endpoint.to_string());
            state.buffer = Some(buffer.clone());
            state.sent = sent.clone();
            state.abort_open = Some(abort_tx);
            self.shared.publish(&transition);
            id
        };

        tracing::info!(
            session_id = %session_id,
            endpoint = %endpoint,
            source = self.shared.source.name(),
            resolution = ?config.resolution(),
            frame_rate = config.frame_rate(),
            bitrate = config.bitrate(),
            "Starting streaming session"
        );

        // A concurrent stop must not wait out a slow device
        let opened = tokio::select! {
            biased;
            _ = abort_rx => None,
            opened = self.shared.source.open(&config) => Some(opened),
        };
        self.shared.lock_state().abort_open = None;

        let handle = match opened {
            None => {
                tracing::info!(session_id = %session_id, "Start cancelled while opening capture");
                buffer.close();
                return Err(SupervisorError::Cancelled);
            }
            Some(Ok(handle)) => handle,
            Some(Err(e)) => {
                buffer.close();
                self.shared.fail(e.kind(), format!("Capture open failed: {}", e));
                return Err(e.into());
            }
        };
        self.shared.reporter.emit(StatusEvent::info(
            Component::FrameSource,
            format!("Opened {}", self.shared.source.name()),
        ));

        let (stop_tx, stop_rx) = watch::channel(false);
        let context = SessionContext {
            endpoint,
            buffer: buffer.clone(),
            sent,
            stop_rx,
        };
        let task = tokio::spawn(run_session(self.shared.clone(), context, handle));

        *control = Some(ActiveSession {
            stop_tx,
            buffer,
            task,
        });

        Ok(session_id)
    }

    /// Stop the current session; safe to call at any time, any number of times
    ///
    /// When this returns the capture device is released and the link is closed.
    /// A `start` still waiting on the device is cancelled rather than awaited.
    pub async fn stop(&self) {
        if let Some(abort) = self.shared.lock_state().abort_open.take() {
            let _ = abort.send(());
        }
        let mut control = self.control.lock().await;
        self.shared.lock_state().lifecycle.mark_stopping();

        if let Some(active) = control.take() {
            let _ = active.stop_tx.send(true);
            active.buffer.close();
            if let Err(e) = active.task.await {
                tracing::error!("Session task ended abnormally: {}", e);
            }
        }

        let mut state = self.shared.lock_state();
        if let Some(transition) = state
            .lifecycle
            .transition_to_stopped(Some("Stopped by caller".to_string()))
        {
            self.shared.publish(&transition);
        }
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock_state();
        let (dropped, buffered) = state
            .buffer
            .as_ref()
            .map(|buffer| {
                let buffer_state = buffer.state();
                (buffer_state.dropped, buffer_state.occupancy)
            })
            .unwrap_or((0, 0));
        state
            .lifecycle
            .snapshot(state.sent.load(Ordering::Relaxed), dropped, buffered)
    }

    /// Apply a lifecycle transition and announce it if it was accepted
    fn transition<F>(&self, apply: F) -> bool
    where
        F: FnOnce(&mut SessionLifecycle) -> Option<StateTransition>,
    {
        let mut state = self.lock_state();
        match apply(&mut state.lifecycle) {
            Some(transition) => {
                self.publish(&transition);
                true
            }
            None => false,
        }
    }

    /// Caller holds the state lock, which keeps events in transition order
    fn publish(&self, transition: &StateTransition) {
        self.metrics.report_state_change(&transition.to);
        self.reporter.emit(StatusEvent::StateChange {
            component: Component::SessionSupervisor,
            from: transition.from,
            to: transition.to,
            message: transition
                .reason
                .clone()
                .unwrap_or_else(|| format!("Session is {}", transition.to)),
        });
    }

    fn fail(&self, kind: ErrorKind, message: String) {
        let mut state = self.lock_state();
        if let Some(transition) = state.lifecycle.transition_to_failed(Some(message.clone())) {
            self.publish(&transition);
            self.reporter.emit(StatusEvent::error(
                Component::SessionSupervisor,
                kind,
                message,
            ));
        }
    }

    fn report_uptime(&self) {
        if let Some(uptime) = self.lock_state().lifecycle.uptime() {
            self.metrics.report_uptime(uptime.as_secs_f64());
        }
    }
}

async fn run_session(shared: Arc<Shared>, mut context: SessionContext, handle: Box<dyn CaptureHandle>) {
    let (pump_stop_tx, pump_stop_rx) = watch::channel(false);
    let (failure_tx, mut failure_rx) = oneshot::channel();
    let pump = tokio::spawn(capture_pump(
        shared.clone(),
        handle,
        context.buffer.clone(),
        pump_stop_rx,
        failure_tx,
    ));

    let mut transport = (shared.transports)();
    // The pump reports a device failure before closing the buffer, so it wins
    // over the drain noticing the closed buffer
    let end = tokio::select! {
        biased;
        Ok(e) = &mut failure_rx => {
            SessionEnd::Failed(e.kind(), format!("Capture failed: {}", e))
        }
        end = drive_session(&shared, &mut context, transport.as_mut()) => end,
    };

    // Release capture before the terminal transition is published
    let _ = pump_stop_tx.send(true);
    context.buffer.close();
    if let Err(e) = pump.await {
        tracing::error!("Capture pump ended abnormally: {}", e);
    }
    transport.disconnect().await;

    match end {
        SessionEnd::Stopped => {}
        SessionEnd::SourceEnded => {
            shared.transition(|lifecycle| {
                lifecycle.transition_to_stopped(Some("Capture source ended".to_string()))
            });
        }
        SessionEnd::Failed(kind, message) => shared.fail(kind, message),
    }
}

async fn drive_session(
    shared: &Shared,
    context: &mut SessionContext,
    transport: &mut dyn TransportSession,
) -> SessionEnd {
    match connect_with_retries(shared, context, transport).await {
        ConnectOutcome::Connected => {}
        ConnectOutcome::Stopped => return SessionEnd::Stopped,
        ConnectOutcome::GaveUp(e) => {
            return SessionEnd::Failed(e.kind(), format!("Giving up connecting: {}", e))
        }
    }
    if !shared.transition(|lifecycle| lifecycle.transition_to_streaming()) {
        return SessionEnd::Stopped;
    }

    // A chunk whose write failed is re-sent first on the next connection
    let mut pending: Option<Chunk> = None;

    loop {
        match drain(shared, context, transport, &mut pending).await {
            DrainOutcome::Stopped => return SessionEnd::Stopped,
            DrainOutcome::SourceEnded => return SessionEnd::SourceEnded,
            DrainOutcome::WriteFailed(e) => {
                shared.reporter.emit(StatusEvent::warning(
                    Component::TransportSession,
                    format!("Connection lost: {}", e),
                ));
                transport.disconnect().await;

                match reconnect(shared, context, transport, e).await {
                    ConnectOutcome::Connected => {
                        if !shared.transition(|lifecycle| lifecycle.transition_to_streaming()) {
                            return SessionEnd::Stopped;
                        }
                    }
                    ConnectOutcome::Stopped => return SessionEnd::Stopped,
                    ConnectOutcome::GaveUp(e) => {
                        return SessionEnd::Failed(
                            e.kind(),
                            format!("Giving up reconnecting: {}", e),
                        )
                    }
                }
            }
        }
    }
}

async fn connect_with_retries(
    shared: &Shared,
    context: &mut SessionContext,
    transport: &mut dyn TransportSession,
) -> ConnectOutcome {
    let retries = shared.settings.connect_retries();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let result = tokio::select! {
            biased;
            _ = wait_for_stop(&mut context.stop_rx) => return ConnectOutcome::Stopped,
            result = transport.connect(&context.endpoint) => result,
        };

        match result {
            Ok(()) => {
                shared.reporter.emit(StatusEvent::info(
                    Component::TransportSession,
                    format!("Connected to {} (attempt {})", context.endpoint, attempt),
                ));
                return ConnectOutcome::Connected;
            }
            Err(e) => {
                if attempt > retries {
                    return ConnectOutcome::GaveUp(e);
                }

                let delay = shared.settings.backoff().delay_for_attempt(attempt);
                shared.metrics.report_backoff(delay.as_secs_f64());
                shared.reporter.emit(StatusEvent::warning(
                    Component::TransportSession,
                    format!(
                        "Connect attempt {} of {} failed: {}; retrying in {:?}",
                        attempt,
                        retries + 1,
                        e,
                        delay
                    ),
                ));

                tokio::select! {
                    biased;
                    _ = wait_for_stop(&mut context.stop_rx) => return ConnectOutcome::Stopped,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn reconnect(
    shared: &Shared,
    context: &mut SessionContext,
    transport: &mut dyn TransportSession,
    cause: TransportError,
) -> ConnectOutcome {
    let max_attempts = shared.settings.max_reconnect_attempts();
    let mut reason = cause.to_string();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let entered = shared.transition(|lifecycle| {
            lifecycle.transition_to_reconnecting(attempt, Some(reason.clone()))
        });
        if !entered {
            return ConnectOutcome::Stopped;
        }
        shared.metrics.report_reconnect_attempt();

        let delay = shared.settings.backoff().delay_for_attempt(attempt);
        shared.metrics.report_backoff(delay.as_secs_f64());
        tracing::info!("Reconnecting in {:?} (attempt {})...", delay, attempt);

        tokio::select! {
            biased;
            _ = wait_for_stop(&mut context.stop_rx) => return ConnectOutcome::Stopped,
            _ = tokio::time::sleep(delay) => {}
        }

        let result = tokio::select! {
            biased;
            _ = wait_for_stop(&mut context.stop_rx) => return ConnectOutcome::Stopped,
            result = transport.connect(&context.endpoint) => result,
        };

        match result {
            Ok(()) => {
                shared.reporter.emit(StatusEvent::info(
                    Component::TransportSession,
                    format!(
                        "Reconnected to {} after {} attempt(s), {} chunk(s) backlogged",
                        context.endpoint,
                        attempt,
                        context.buffer.len()
                    ),
                ));
                return ConnectOutcome::Connected;
            }
            Err(e) => {
                let keep_trying = shared
                    .lock_state()
                    .lifecycle
                    .should_continue_retrying(max_attempts);
                if !keep_trying {
                    return ConnectOutcome::GaveUp(e);
                }
                reason = e.to_string();
            }
        }
    }
}

async fn drain(
    shared: &Shared,
    context: &mut SessionContext,
    transport: &mut dyn TransportSession,
    pending: &mut Option<Chunk>,
) -> DrainOutcome {
    loop {
        let chunk = match pending.take() {
            Some(chunk) => chunk,
            None => {
                let popped = tokio::select! {
                    biased;
                    _ = wait_for_stop(&mut context.stop_rx) => return DrainOutcome::Stopped,
                    popped = context.buffer.pop() => popped,
                };
                match popped {
                    Ok(chunk) => chunk,
                    Err(BufferError::Closed) => return DrainOutcome::SourceEnded,
                }
            }
        };

        let result = tokio::select! {
            biased;
            _ = wait_for_stop(&mut context.stop_rx) => return DrainOutcome::Stopped,
            result = transport.send_chunk(&chunk) => result,
        };

        match result {
            Ok(()) => {
                context.sent.fetch_add(1, Ordering::Relaxed);
                shared.metrics.report_chunk_sent(chunk.len());
                shared.metrics.report_buffer_occupancy(context.buffer.len());
                shared.report_uptime();
                tracing::trace!(seq = chunk.seq(), bytes = chunk.len(), "Chunk sent");
            }
            Err(e) => {
                tracing::warn!(seq = chunk.seq(), "Write failed: {}", e);
                *pending = Some(chunk);
                return DrainOutcome::WriteFailed(e);
            }
        }
    }
}

/// Numbers payloads and feeds them into the buffer until told to stop
async fn capture_pump(
    shared: Arc<Shared>,
    mut handle: Box<dyn CaptureHandle>,
    buffer: Arc<ChunkBuffer>,
    mut stop_rx: watch::Receiver<bool>,
    failure_tx: oneshot::Sender<CaptureError>,
) {
    let mut seq: u32 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = wait_for_stop(&mut stop_rx) => break,
            next = handle.next_chunk() => next,
        };

        let payload = match next {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                shared.reporter.emit(StatusEvent::info(
                    Component::FrameSource,
                    "Capture source ended",
                ));
                break;
            }
            Err(e) => {
                tracing::error!(source = shared.source.name(), "Capture failed: {}", e);
                let _ = failure_tx.send(e);
                break;
            }
        };
        if payload.is_empty() {
            continue;
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            shared.reporter.emit(StatusEvent::warning(
                Component::FrameSource,
                format!(
                    "Skipped {} byte payload, larger than the {} byte frame limit",
                    payload.len(),
                    MAX_PAYLOAD_LEN
                ),
            ));
            continue;
        }

        seq = seq.wrapping_add(1);
        match buffer.push(Chunk::new(seq, payload)) {
            Ok(PushOutcome::Queued) => {}
            Ok(PushOutcome::DroppedOldest { .. }) => shared.metrics.report_chunk_dropped(),
            Err(BufferError::Closed) => break,
        }
        shared.metrics.report_buffer_occupancy(buffer.len());
    }

    handle.close();
    buffer.close();
    shared.reporter.emit(StatusEvent::info(
        Component::FrameSource,
        format!("Released {} after {} chunk(s)", shared.source.name(), seq),
    ));
}

/// Resolves once stop is requested or the controlling handle is gone
async fn wait_for_stop(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}
