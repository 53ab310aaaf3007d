//! Detection Pipeline - Main Entry Point

use api::{init_logging, run_server, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_file = std::env::args().nth(1);
    let config = AppConfig::load(config_file.as_deref())?;
    init_logging(&config.server.log_level)?;

    info!("=== Vision Pipeline v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Backend model: {}",
        config.detector.model_path.as_deref().unwrap_or("none (null backend)")
    );

    run_server(config).await?;

    Ok(())
}
