//! Scanning command handlers.

use fm430_driver::{DriverConfig, TriggerMode};
use fm430_scanner::{ScannerError, SubscriptionMode};
use fm430_transport::PrinterConfig;
use tracing::{debug, warn};

use super::{open_scanner, CommandResult};

/// Start or stop a software-triggered scan
pub async fn trigger(
    config: &DriverConfig,
    printer_config: Option<PrinterConfig>,
    stop: bool,
    minimal: bool,
) -> CommandResult {
    let device = open_scanner(config, printer_config).await?;
    let start = !stop;

    if minimal || config.trigger_mode == TriggerMode::Minimal {
        device.send_trigger_frame(start).await?;
    } else {
        device.trigger(start).await?;
    }

    println!("Scanning {}", if start { "started" } else { "stopped" });
    Ok(())
}

/// Print barcodes as they are scanned
pub async fn listen(
    config: &DriverConfig,
    printer_config: Option<PrinterConfig>,
    once: bool,
    count: Option<usize>,
) -> CommandResult {
    let device = open_scanner(config, printer_config).await?;
    let mode = if once {
        SubscriptionMode::OneShot
    } else {
        SubscriptionMode::Continuous
    };
    let limit = if once { Some(1) } else { count };
    let mut scans = device.register_result_receiver(mode);
    eprintln!("Waiting for barcodes (Ctrl+C to stop)...");

    let mut seen = 0usize;
    loop {
        tokio::select! {
            item = scans.recv() => match item {
                Some(Ok(scan)) => {
                    println!("{}", scan.text());
                    seen += 1;
                    if limit.is_some_and(|n| seen >= n) {
                        break;
                    }
                }
                Some(Err(ScannerError::EmptyResponse)) => warn!("Scan carried no data"),
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
        }
    }

    device.unregister_result_receiver();
    Ok(())
}
