//! Relay - main entry point.

use anyhow::{Context, Result};
use relay_channels::run;
use relay_common::config::Config;
use relay_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (.env, config file, environment)
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Relay v{}", env!("CARGO_PKG_VERSION"));

    config.validate().context("invalid configuration")?;

    tracing::info!(
        channel = ?config.channel,
        assistant = %config.assistant.binary,
        session_file = %config.session_file().display(),
        "Configuration loaded"
    );

    tokio::select! {
        result = run(&config) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            Ok(())
        }
    }
}
