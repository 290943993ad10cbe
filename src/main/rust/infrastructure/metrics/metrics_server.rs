use std::future::Future;
use std::net::SocketAddr;

use tokio::task::JoinHandle;
use warp::http::StatusCode;
use warp::Filter;

use super::PrometheusReporter;
use crate::application::services::SessionSupervisor;

/// Health check response structure
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

impl HealthResponse {
    fn new(status: &'static str) -> Self {
        Self {
            status,
            service: "pipeline-camera-stream",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// HTTP routes for metrics, probes and the live session snapshot
pub fn routes(
    supervisor: SessionSupervisor,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    // CORS configuration for browser access
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let metrics_route = warp::path("metrics").map(|| {
        let body = PrometheusReporter::gather_metrics();
        warp::reply::with_header(body, "content-type", "text/plain; version=0.0.4; charset=utf-8")
    });

    let health_route =
        warp::path("health").map(|| warp::reply::json(&HealthResponse::new("healthy")));

    // Liveness probe endpoint (minimal check - is the process running?)
    let liveness_route =
        warp::path("livez").map(|| warp::reply::with_status("OK", StatusCode::OK));

    // Readiness probe endpoint (not ready once the session has failed)
    let readiness_supervisor = supervisor.clone();
    let readiness_route = warp::path("readyz").map(move || {
        if readiness_supervisor.status().state.is_problematic() {
            warp::reply::with_status(
                warp::reply::json(&HealthResponse::new("degraded")),
                StatusCode::SERVICE_UNAVAILABLE,
            )
        } else {
            warp::reply::with_status(
                warp::reply::json(&HealthResponse::new("ready")),
                StatusCode::OK,
            )
        }
    });

    let status_route =
        warp::path("status").map(move || warp::reply::json(&supervisor.status()));

    metrics_route
        .or(health_route)
        .or(liveness_route)
        .or(readiness_route)
        .or(status_route)
        .with(cors)
}

/// Bind the metrics server and run it on a background task until `shutdown` resolves
pub fn serve_metrics(
    port: u16,
    supervisor: SessionSupervisor,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, JoinHandle<()>), warp::Error> {
    let (addr, server) = warp::serve(routes(supervisor))
        .try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), shutdown)?;

    tracing::info!("Metrics server listening on http://{}", addr);
    Ok((addr, tokio::spawn(server)))
}
