//! Relay Channels - Main entry point.

use anyhow::Result;
use relay_channels::start;
use relay_common::config::Config;
use relay_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load and validate configuration; missing tokens stop startup here
    let config = Config::load_and_validate()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Relay Channels v{}", env!("CARGO_PKG_VERSION"));

    start(&config).await
}
