use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use pipeline_camera_stream::{
    serve_metrics, ChunkReceiver, Command, Config, ConnectionState, NetworkTransport,
    PrometheusReporter, ReceiveArgs, SessionSupervisor, StatusEvent, StreamArgs,
    TransportFactory, TransportSession,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration
    let config = Config::parse();
    config.validate()?;

    // Initialize logging
    let filter = if config.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match config.command {
        Command::Stream(args) => run_stream(args).await,
        Command::Receive(args) => run_receive(args).await,
    }
}

async fn run_stream(args: StreamArgs) -> Result<()> {
    #[cfg(feature = "gstreamer")]
    gstreamer::init()?;

    PrometheusReporter::init_metrics()?;

    // Convert CLI config to domain configs
    let capture_config = args
        .to_capture_config()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let settings = args
        .to_supervisor_settings()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let source = args.to_frame_source()?;

    info!("Starting camera stream");
    info!("  Source: {}", source.name());
    info!("  Destination: {}", args.address);
    info!(
        "  Capture: {}x{} @ {} fps, {} bit/s, {:?} chunks",
        capture_config.width(),
        capture_config.height(),
        capture_config.frame_rate(),
        capture_config.bitrate(),
        capture_config.chunk_interval()
    );
    info!("  Buffer: {} chunks", settings.buffer_capacity());
    info!("  Metrics port: {}", args.metrics_port);

    // Create infrastructure implementations (dependency injection)
    let transports: TransportFactory =
        Arc::new(|| Box::new(NetworkTransport::new()) as Box<dyn TransportSession>);
    let metrics_reporter = Arc::new(PrometheusReporter::new());

    let supervisor = SessionSupervisor::new(source, transports, settings, metrics_reporter);
    let mut feed = supervisor.subscribe();

    // Start metrics server
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (_, metrics_server) = serve_metrics(args.metrics_port, supervisor.clone(), async {
        shutdown_rx.await.ok();
    })
    .context("Failed to start metrics server")?;

    let started = supervisor.start(&args.address, capture_config).await;
    match &started {
        Ok(session_id) => info!(session_id = %session_id, "Session started"),
        Err(e) => error!("Failed to start session: {}", e),
    }

    if started.is_ok() {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                signal = &mut ctrl_c => {
                    signal.context("Failed to listen for ctrl+c")?;
                    info!("Received shutdown signal");
                    supervisor.stop().await;
                    break;
                }
                event = feed.recv() => match event {
                    Some(event) => {
                        print_event(&event);
                        if matches!(&event, StatusEvent::StateChange { to, .. } if to.is_terminal()) {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    }

    for event in feed.drain() {
        print_event(&event);
    }

    // Signal shutdown to metrics server
    let _ = shutdown_tx.send(());
    metrics_server.await?;

    let status = supervisor.status();
    info!(
        state = %status.state,
        chunks_sent = status.chunks_sent,
        chunks_dropped = status.chunks_dropped,
        "Streaming shutdown complete"
    );

    started?;
    if status.state == ConnectionState::Failed {
        anyhow::bail!("Streaming session failed");
    }
    Ok(())
}

async fn run_receive(args: ReceiveArgs) -> Result<()> {
    let receiver = ChunkReceiver::bind(&args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    info!("Receiver listening on {}", receiver.local_addr()?);

    let stats = receiver.stats_handle();
    let server = tokio::spawn(receiver.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl+c: {}", e);
            return;
        }
        info!("Received shutdown signal");
    }));

    let reporter = (args.stats_interval_secs > 0).then(|| {
        let stats = stats.clone();
        let period = Duration::from_secs(args.stats_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let current = stats();
                info!(
                    connections = current.connections,
                    chunks = current.chunks,
                    bytes = current.bytes,
                    missing = current.missing,
                    repeated = current.repeated,
                    "Receiver stats"
                );
            }
        })
    });

    server.await?;
    if let Some(reporter) = reporter {
        reporter.abort();
    }

    info!(stats = ?stats(), "Receiver shutdown complete");
    Ok(())
}

/// Status events go to stdout as JSON lines
fn print_event(event: &StatusEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!("Failed to encode status event: {}", e),
    }
}
