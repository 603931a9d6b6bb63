//! Newland FM430 Scanner Driver CLI
//!
//! A command-line interface for configuring and reading FM430 barcode scanners.

use anyhow::Result;
use clap::Parser;
use fm430_driver::DriverConfig;
use tracing::debug;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers
mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config; a missing file yields defaults
    let config_path = cli.config.clone().unwrap_or_else(DriverConfig::default_path);
    let config = DriverConfig::load(&config_path)?;

    // Initialize logging
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    debug!("Loaded config from {:?}", config_path);

    // Create printer config if monitoring is enabled
    let printer_config =
        commands::create_printer_config(cli.monitor, cli.hex, cli.filter.as_deref())?;

    match cli.command {
        // === Query Commands ===
        Commands::List { json } => {
            commands::query::list(&config, json).await?;
        }
        Commands::Options => {
            commands::query::options()?;
        }
        Commands::Get { option } => {
            commands::query::get(&config, printer_config, &option).await?;
        }
        Commands::Config { save } => {
            commands::query::config(&config, &config_path, save)?;
        }

        // === Set Commands ===
        Commands::Set {
            option,
            value,
            permanent,
        } => {
            commands::set::set(&config, printer_config, &option, value.as_deref(), permanent)
                .await?;
        }
        Commands::Raw {
            code,
            payload,
            permanent,
        } => {
            commands::set::raw(&config, printer_config, &code, payload.as_deref(), permanent)
                .await?;
        }

        // === Scan Commands ===
        Commands::Trigger { stop, minimal } => {
            commands::scan::trigger(&config, printer_config, stop, minimal).await?;
        }
        Commands::Listen { once, count } => {
            commands::scan::listen(&config, printer_config, once, count).await?;
        }
    }

    Ok(())
}
