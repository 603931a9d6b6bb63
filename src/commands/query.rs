//! Query (read-only) command handlers.

use std::path::Path;

use crossterm::style::Stylize;
use fm430_driver::DriverConfig;
use fm430_scanner::{find_option, ScannerError, OPTIONS};
use fm430_transport::{DeviceDiscovery, HidDiscovery, PrinterConfig};

use super::{open_scanner, CommandResult};

/// List connected scanners
pub async fn list(config: &DriverConfig, json: bool) -> CommandResult {
    let mut discovery = HidDiscovery::new();
    if let Some(pid) = config.product_id {
        discovery.add_device(config.vendor_id, pid);
    }
    let devices = discovery.list_devices().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No scanners found");
        let wedges = HidDiscovery::list_keyboard_wedges()?;
        if !wedges.is_empty() {
            println!(
                "{} scanner(s) in keyboard-wedge mode; switch to HID-POS to use this driver",
                wedges.len()
            );
        }
        return Ok(());
    }

    println!("Found {} scanner(s):", devices.len());
    for dev in &devices {
        println!(
            "  {} {:04X}:{:04X}  {}",
            dev.info.product_name.as_deref().unwrap_or("Unknown").bold(),
            dev.info.vid,
            dev.info.pid,
            dev.info.device_path
        );
        if let Some(serial) = &dev.info.serial {
            println!("      serial: {serial}");
        }
    }
    Ok(())
}

/// Print the option table
pub fn options() -> CommandResult {
    println!(
        "{}",
        format!("{:<22} {:<7} {:<28} {}", "NAME", "CODE", "VALUES", "DESCRIPTION").bold()
    );
    for spec in OPTIONS {
        println!(
            "{:<22} {:<7} {:<28} {}",
            spec.name,
            spec.entry.to_string(),
            spec.kind.to_string(),
            spec.summary
        );
    }
    Ok(())
}

/// Read back one setting
pub async fn get(
    config: &DriverConfig,
    printer_config: Option<PrinterConfig>,
    option: &str,
) -> CommandResult {
    let spec = find_option(option).ok_or_else(|| ScannerError::UnknownOption(option.into()))?;
    let device = open_scanner(config, printer_config).await?;

    let response = device.query_option(spec).await?;
    let entries = response.entries()?;
    match entries.first() {
        Some(entry) => println!("{}: {}", spec.name, spec.describe_value(&entry.data)),
        None => println!("{}: (no data)", spec.name),
    }
    Ok(())
}

/// Show the effective configuration, optionally writing it out
pub fn config(config: &DriverConfig, path: &Path, save: bool) -> CommandResult {
    println!("# {}", path.display());
    print!("{}", config.to_toml()?);
    if save {
        config.save(path)?;
        eprintln!("Saved to {}", path.display());
    }
    Ok(())
}
