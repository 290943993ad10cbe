use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use tokio::sync::mpsc;

use super::{PipelineBuilder, APPSINK_NAME};
use crate::domain::errors::CaptureError;
use crate::domain::ports::{CaptureHandle, FrameSource};
use crate::domain::value_objects::CaptureConfig;

/// Timeout for sample pulls (100ms allows responsive shutdown)
const PULL_TIMEOUT_MS: u64 = 100;

/// How long to wait for the device to reach PLAYING
const START_TIMEOUT_SECS: u64 = 5;

/// Encoded chunks waiting for the async side
const CHANNEL_DEPTH: usize = 4;

/// V4L2 camera encoded to H264/MPEG-TS through a GStreamer pipeline
#[derive(Debug, Clone)]
pub struct GStreamerSource {
    device: String,
    name: String,
}

impl GStreamerSource {
    pub fn new(device: impl Into<String>) -> Self {
        let device = device.into();
        let name = format!("camera:{}", device);
        Self { device, name }
    }
}

#[async_trait]
impl FrameSource for GStreamerSource {
    async fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let device = self.device.clone();
        let config = *config;

        // Parsing and prerolling block on the GStreamer side
        let handle = tokio::task::spawn_blocking(move || start_capture(&device, &config))
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))??;
        Ok(Box::new(handle))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn start_capture(device: &str, config: &CaptureConfig) -> Result<GStreamerHandle, CaptureError> {
    gstreamer::init().map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

    let pipeline_str = PipelineBuilder::build_pipeline_string(device, config);
    tracing::info!("Creating pipeline: {}", pipeline_str);

    let pipeline = gstreamer::parse::launch(&pipeline_str)
        .map_err(|e| CaptureError::Unsupported(format!("Failed to parse pipeline: {}", e)))?
        .downcast::<gstreamer::Pipeline>()
        .map_err(|_| CaptureError::Unsupported("Failed to downcast to Pipeline".to_string()))?;

    let appsink = pipeline
        .by_name(APPSINK_NAME)
        .and_then(|element| element.dynamic_cast::<AppSink>().ok())
        .ok_or_else(|| CaptureError::Unsupported("Pipeline has no appsink".to_string()))?;
    let bus = pipeline
        .bus()
        .ok_or_else(|| CaptureError::DeviceUnavailable("Failed to get bus".to_string()))?;

    let started = pipeline.set_state(gstreamer::State::Playing).is_ok()
        && pipeline
            .state(gstreamer::ClockTime::from_seconds(START_TIMEOUT_SECS))
            .0
            .is_ok();
    if !started {
        let reason = bus
            .pop_filtered(&[gstreamer::MessageType::Error])
            .and_then(|msg| match msg.view() {
                gstreamer::MessageView::Error(err) => Some(err.error().to_string()),
                _ => None,
            })
            .unwrap_or_else(|| "pipeline did not start".to_string());
        let _ = pipeline.set_state(gstreamer::State::Null);
        return Err(CaptureError::DeviceUnavailable(format!("{}: {}", device, reason)));
    }

    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let running = Arc::new(AtomicBool::new(true));
    let interval = config.chunk_interval();
    let worker_running = running.clone();

    std::thread::Builder::new()
        .name("gst-capture".to_string())
        .spawn(move || pull_loop(appsink, bus, interval, tx, worker_running))
        .map_err(|e| {
            let _ = pipeline.set_state(gstreamer::State::Null);
            CaptureError::DeviceUnavailable(e.to_string())
        })?;

    Ok(GStreamerHandle {
        pipeline: Some(pipeline),
        rx,
        running,
    })
}

/// Pull encoded samples and hand them over in chunk-interval batches
fn pull_loop(
    appsink: AppSink,
    bus: gstreamer::Bus,
    interval: Duration,
    tx: mpsc::Sender<Result<Bytes, CaptureError>>,
    running: Arc<AtomicBool>,
) {
    let timeout = gstreamer::ClockTime::from_mseconds(PULL_TIMEOUT_MS);
    let mut pending = BytesMut::new();
    let mut window_start = Instant::now();

    while running.load(Ordering::SeqCst) {
        if let Some(msg) =
            bus.pop_filtered(&[gstreamer::MessageType::Error, gstreamer::MessageType::Eos])
        {
            match msg.view() {
                gstreamer::MessageView::Error(err) => {
                    tracing::error!(
                        "Error from {:?}: {} ({:?})",
                        err.src().map(|s| s.path_string()),
                        err.error(),
                        err.debug()
                    );
                    let _ = tx.blocking_send(Err(CaptureError::DeviceUnavailable(
                        err.error().to_string(),
                    )));
                    return;
                }
                _ => tracing::info!("End of stream"),
            }
            break;
        }

        match appsink.try_pull_sample(timeout) {
            Some(sample) => {
                if let Some(map) = sample.buffer().and_then(|buffer| buffer.map_readable().ok()) {
                    pending.extend_from_slice(map.as_slice());
                }
            }
            None if appsink.is_eos() => break,
            None => {}
        }

        if window_start.elapsed() >= interval && !pending.is_empty() {
            if tx.blocking_send(Ok(pending.split().freeze())).is_err() {
                break;
            }
            window_start = Instant::now();
        }
    }

    if !pending.is_empty() {
        let _ = tx.blocking_send(Ok(pending.freeze()));
    }
    tracing::debug!("Capture thread exiting");
}

struct GStreamerHandle {
    pipeline: Option<gstreamer::Pipeline>,
    rx: mpsc::Receiver<Result<Bytes, CaptureError>>,
    running: Arc<AtomicBool>,
}

#[async_trait]
impl CaptureHandle for GStreamerHandle {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, CaptureError> {
        self.rx.recv().await.transpose()
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.rx.close();
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gstreamer::State::Null);
            tracing::info!("Camera pipeline stopped");
        }
    }
}

impl Drop for GStreamerHandle {
    fn drop(&mut self) {
        self.close();
    }
}
