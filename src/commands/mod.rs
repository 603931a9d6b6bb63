//! Command handlers for the CLI application.
//!
//! This module organizes command handlers by category:
//! - `query`: Read-only commands (list, options, get, config)
//! - `set`: Setting commands (set, raw)
//! - `scan`: Scanning commands (trigger, listen)

pub mod query;
pub mod scan;
pub mod set;

use anyhow::Context;
use crossterm::style::Stylize;
use fm430_driver::DriverConfig;
use fm430_scanner::{Response, ResponseStatus, ScannerDevice, StorageType};
use fm430_transport::{HidDiscovery, PacketFilter, PrinterConfig};
use tracing::info;

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Build the monitoring printer config from the global flags
pub fn create_printer_config(
    monitor: bool,
    hex: bool,
    filter: Option<&str>,
) -> anyhow::Result<Option<PrinterConfig>> {
    if !monitor {
        return Ok(None);
    }

    let filter = match filter {
        Some(f) => f.parse().map_err(anyhow::Error::msg)?,
        None => PacketFilter::All,
    };

    Ok(Some(
        PrinterConfig::default().with_hex(hex).with_filter(filter),
    ))
}

/// Open the configured scanner, wrapped with the printer when monitoring
pub async fn open_scanner(
    config: &DriverConfig,
    printer_config: Option<PrinterConfig>,
) -> anyhow::Result<ScannerDevice> {
    let discovery = match printer_config {
        Some(printer) => HidDiscovery::new().with_printer_config(printer),
        None => HidDiscovery::new(),
    };

    let device = ScannerDevice::open(discovery, config.scanner_config())
        .await
        .context("Failed to open scanner")?;

    let info = device.device_info();
    info!(
        "Using {} ({:04X}:{:04X})",
        info.product_name.as_deref().unwrap_or("Unknown"),
        info.vid,
        info.pid
    );
    Ok(device)
}

/// Storage scope for a write: `--permanent` wins over the config file
pub fn storage_for(config: &DriverConfig, permanent: bool) -> StorageType {
    if permanent {
        StorageType::Permanent
    } else {
        config.storage
    }
}

/// Print every entry of a response, one per line
pub fn print_response(response: &Response) {
    match response.entries() {
        Ok(entries) => {
            for entry in entries {
                let status = match entry.status {
                    ResponseStatus::Ack => entry.status.to_string().green(),
                    _ => entry.status.to_string().red(),
                };
                println!(
                    "  {}  {:<12} {}",
                    entry.entry.to_string().bold(),
                    String::from_utf8_lossy(&entry.data),
                    status
                );
            }
        }
        Err(e) => {
            println!(
                "  {} {}",
                "unparsed:".yellow(),
                String::from_utf8_lossy(response.payload())
            );
            println!("  ({e})");
        }
    }
}
