use anyhow::Result;
use colored::Colorize;
use hookbin::config;
use std::path::Path;
use tracing::info;

/// Execute the config show command
pub fn show(config_path: &Path) -> Result<()> {
    let cfg = config::load_config(config_path)?;

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&cfg)?;
    println!("{}", toml_string);

    info!("Configuration displayed successfully");
    Ok(())
}

/// Execute the config validate command
pub fn validate(config_path: &Path) -> Result<()> {
    let cfg = config::load_config(config_path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Listen: {}:{}", cfg.server.host, cfg.server.port);
    println!("  Database: {}", cfg.database.url);
    println!(
        "  Auth: {}",
        if cfg.auth.enabled { "enabled" } else { "disabled (anonymous sessions)" }
    );
    println!("  Poll interval: {}ms", cfg.capture.poll_interval_ms);

    info!("Configuration validation successful");
    Ok(())
}
