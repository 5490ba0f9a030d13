//! Hub daemon
//!
//! Usage: `hubd [CONFIG]`. The config path falls back to `$HUB_CONFIG`, then
//! `config.yaml`.

use anyhow::{Context, Result};
use hub_config::{resolve_config_path, HubConfig};
use hub_server::Hub;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let path = resolve_config_path(std::env::args().nth(1));
    let config = HubConfig::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    // RUST_LOG takes precedence over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(config = %path.display(), device_id = %config.device_id, "Starting hub");

    let hub = Hub::from_config(config)?;
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    hub.run(shutdown).await?;
    info!("Hub stopped");
    Ok(())
}
