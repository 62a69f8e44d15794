//! HTTP server for the Prometheus metrics endpoint.
//!
//! The listener is bound in `main`, so a bad metrics address fails startup
//! instead of dying silently in a background task; serving then runs on its
//! own tokio task. The WebSocket listener never shares this port.

use axum::{Router, routing::get};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Bind the metrics listener.
pub async fn bind_metrics(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus HTTP server listening");
    Ok(listener)
}

/// Serve the `/metrics` endpoint until the process exits.
///
/// This is a long-running task that should be spawned in the background.
pub async fn serve_metrics(listener: TcpListener) {
    let app = Router::new().route("/metrics", get(metrics_handler));
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "HTTP server error");
    }
}
