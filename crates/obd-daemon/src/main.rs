//! OBD-II Telemetry - Main Entry Point

use anyhow::Context;
use obd_daemon::{init_logging, run, AppConfig};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.log_level)?;

    info!("=== OBD Telemetry v{} ===", env!("CARGO_PKG_VERSION"));
    run(config).await.context("Telemetry daemon failed")?;

    info!("Stopped");
    Ok(())
}
