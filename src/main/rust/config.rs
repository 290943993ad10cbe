use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::errors::Result;
use crate::domain::ports::FrameSource;
use crate::domain::value_objects::{
    BackoffPolicy, CaptureConfig, Endpoint, SupervisorSettings,
};
use crate::infrastructure::capture::{FileReplaySource, SyntheticSource};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pipeline-camera-stream",
    version = "0.1.0",
    author = "Hawkeye Video Pipeline",
    about = "Camera capture streaming over TCP/WebSocket with buffering and automatic reconnection"
)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Capture and stream chunks to a receiver
    Stream(StreamArgs),
    /// Run the reference receiver
    Receive(ReceiveArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Generated payloads sized from the bitrate
    Synthetic,
    /// Replay a pre-encoded file
    File,
    /// V4L2 camera through GStreamer (requires the `gstreamer` feature)
    Camera,
}

#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    /// Receiver address (tcp://host:port, ws://host:port/path, or host:port)
    #[arg(long, env = "STREAM_ADDRESS", default_value = "tcp://127.0.0.1:8080")]
    pub address: String,

    /// Where chunks come from
    #[arg(long, env = "STREAM_SOURCE", value_enum, default_value = "synthetic")]
    pub source: SourceKind,

    /// File to replay with --source file
    #[arg(long, env = "STREAM_FILE")]
    pub file: Option<PathBuf>,

    /// Restart the file at end of stream
    #[arg(long = "loop")]
    pub loop_file: bool,

    /// Stop the synthetic source after this many chunks
    #[arg(long)]
    pub limit: Option<u64>,

    /// Capture device for --source camera
    #[arg(long, env = "CAMERA_DEVICE", default_value = "/dev/video0")]
    pub device: String,

    #[arg(long, default_value = "640")]
    pub width: u32,

    #[arg(long, default_value = "480")]
    pub height: u32,

    #[arg(long, default_value = "30")]
    pub frame_rate: u32,

    /// Target bitrate in bits per second
    #[arg(long, default_value = "500000")]
    pub bitrate: u32,

    /// Capture interval per chunk in milliseconds
    #[arg(long, default_value = "100")]
    pub chunk_interval_ms: u64,

    /// Chunks held while the link is down before the oldest are dropped
    #[arg(long, default_value = "20")]
    pub buffer_capacity: usize,

    /// Connect retries after the first failure before giving up
    #[arg(long, default_value = "3")]
    pub connect_retries: u32,

    /// Reconnect attempts after a mid-stream failure (unlimited if unset)
    #[arg(long)]
    pub max_reconnect_attempts: Option<u32>,

    /// Initial reconnection delay in milliseconds
    #[arg(long, default_value = "500")]
    pub reconnect_initial_delay_ms: u64,

    /// Maximum reconnection delay in milliseconds
    #[arg(long, default_value = "8000")]
    pub reconnect_max_delay_ms: u64,

    /// Reconnection backoff multiplier
    #[arg(long, default_value = "2.0")]
    pub reconnect_multiplier: f64,

    /// Metrics server port
    #[arg(long, env = "METRICS_PORT", default_value = "9003")]
    pub metrics_port: u16,
}

#[derive(Args, Debug, Clone)]
pub struct ReceiveArgs {
    /// Address to accept senders on
    #[arg(long, env = "RECEIVER_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Seconds between stats log lines (0 disables)
    #[arg(long, default_value = "5")]
    pub stats_interval_secs: u64,
}

/// Minimum allowed port (ports below 1024 are privileged)
const MIN_USER_PORT: u16 = 1024;

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        match &self.command {
            Command::Stream(args) => args.validate(),
            Command::Receive(args) => args.validate(),
        }
    }
}

impl StreamArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.to_endpoint()
            .map_err(|e| anyhow::anyhow!("Invalid address {}: {}", self.address, e))?;

        validate_port(self.metrics_port, "metrics")?;

        match self.source {
            SourceKind::File if self.file.is_none() => {
                anyhow::bail!("--source file requires --file");
            }
            SourceKind::Camera if !cfg!(feature = "gstreamer") => {
                anyhow::bail!("--source camera requires building with the gstreamer feature");
            }
            _ => {}
        }

        self.to_capture_config()
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        self.to_supervisor_settings()
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        Ok(())
    }

    pub fn to_endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.address)
    }

    pub fn to_capture_config(&self) -> Result<CaptureConfig> {
        CaptureConfig::new(self.width, self.height, self.frame_rate, self.bitrate)?
            .with_chunk_interval(Duration::from_millis(self.chunk_interval_ms))
    }

    pub fn to_backoff_policy(&self) -> Result<BackoffPolicy> {
        BackoffPolicy::new(
            Duration::from_millis(self.reconnect_initial_delay_ms),
            Duration::from_millis(self.reconnect_max_delay_ms),
            self.reconnect_multiplier,
        )
    }

    pub fn to_supervisor_settings(&self) -> Result<SupervisorSettings> {
        Ok(
            SupervisorSettings::new(self.buffer_capacity, self.to_backoff_policy()?)?
                .with_connect_retries(self.connect_retries)
                .with_max_reconnect_attempts(self.max_reconnect_attempts),
        )
    }

    /// Build the configured frame source
    pub fn to_frame_source(&self) -> anyhow::Result<Arc<dyn FrameSource>> {
        match self.source {
            SourceKind::Synthetic => {
                let source = match self.limit {
                    Some(limit) => SyntheticSource::new().with_limit(limit),
                    None => SyntheticSource::new(),
                };
                Ok(Arc::new(source))
            }
            SourceKind::File => {
                let path = self
                    .file
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("--source file requires --file"))?;
                Ok(Arc::new(FileReplaySource::new(path).looping(self.loop_file)))
            }
            #[cfg(feature = "gstreamer")]
            SourceKind::Camera => Ok(Arc::new(
                crate::infrastructure::gstreamer::GStreamerSource::new(self.device.clone()),
            )),
            #[cfg(not(feature = "gstreamer"))]
            SourceKind::Camera => {
                anyhow::bail!("--source camera requires building with the gstreamer feature")
            }
        }
    }
}

impl ReceiveArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.listen.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("Listen address must be ip:port, got {}", self.listen);
        }
        Ok(())
    }
}

fn validate_port(port: u16, name: &str) -> anyhow::Result<()> {
    if port == 0 {
        anyhow::bail!("Invalid {} port: port cannot be 0", name);
    }
    if port < MIN_USER_PORT {
        anyhow::bail!(
            "Invalid {} port: {} is a privileged port (< {}). Use a port >= {}",
            name,
            port,
            MIN_USER_PORT,
            MIN_USER_PORT
        );
    }
    Ok(())
}
