//! Set (write) command handlers.

use fm430_driver::DriverConfig;
use fm430_scanner::{find_option, Command, PayloadEntry, ScannerError, TagPathEntry};
use fm430_transport::PrinterConfig;

use super::{open_scanner, print_response, storage_for, CommandResult};

/// Write one setting from the option table
pub async fn set(
    config: &DriverConfig,
    printer_config: Option<PrinterConfig>,
    option: &str,
    value: Option<&str>,
    permanent: bool,
) -> CommandResult {
    let spec = find_option(option).ok_or_else(|| ScannerError::UnknownOption(option.into()))?;
    let storage = storage_for(config, permanent);
    // Validate before touching the device
    spec.encode(value)?;

    let device = open_scanner(config, printer_config).await?;
    device.set_option(spec, value, storage).await?;

    match value {
        Some(v) => println!("{} set to {} ({})", spec.name, v, storage),
        None => println!("{} sent", spec.name),
    }
    Ok(())
}

/// Send an arbitrary tag/subtag with an optional ASCII payload
pub async fn raw(
    config: &DriverConfig,
    printer_config: Option<PrinterConfig>,
    code: &str,
    payload: Option<&str>,
    permanent: bool,
) -> CommandResult {
    let entry: TagPathEntry = code.to_ascii_uppercase().parse()?;
    let storage = storage_for(config, permanent);
    let command = Command::write(
        storage,
        entry,
        PayloadEntry::Bytes(payload.unwrap_or_default().as_bytes().to_vec()),
    );

    let device = open_scanner(config, printer_config).await?;
    println!("Sending {}", command.frame());
    let response = device.send_command(&command).await?;

    println!("Response ({}):", response.storage());
    print_response(&response);
    Ok(())
}
