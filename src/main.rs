//! campusd - realtime presence and broadcast fabric for the Campus
//! classroom platform.

use campusd::config::Config;
use campusd::directory::StaticDirectory;
use campusd::hub::Hub;
use campusd::network::Gateway;
use campusd::{http, metrics};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(server = %config.server.name, "Starting campusd");

    let directory = Arc::new(StaticDirectory::from_config(&config.directory));
    info!(
        servers = config.directory.servers.len(),
        "Loaded static directory"
    );

    let hub = Arc::new(Hub::new(directory, config.limits.clone()));

    // Metrics endpoint (port 0 disables, used by tests)
    let metrics_port = config.server.metrics_port.unwrap_or(9420);
    if metrics_port != 0 {
        metrics::init();
        let listener = http::bind_metrics(SocketAddr::from(([0, 0, 0, 0], metrics_port))).await?;
        tokio::spawn(http::serve_metrics(listener));
        info!(port = metrics_port, "Prometheus metrics enabled");
    } else {
        info!("Prometheus metrics disabled");
    }

    let gateway = Gateway::bind(&config.listen, hub).await?;
    gateway.run().await
}
