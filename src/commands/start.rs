use anyhow::Result;
use colored::Colorize;
use hookbin::{config, init_tracing, server};
use std::path::Path;
use tracing::info;

/// Execute the start command
pub async fn execute(config_path: &Path) -> Result<()> {
    println!("{}", "Starting hookbin...".green());

    let cfg = config::load_config(config_path)?;
    init_tracing(&cfg.server);
    info!(path = %config_path.display(), "Configuration loaded");

    // Blocks until shutdown
    server::start_server(cfg).await?;

    Ok(())
}
