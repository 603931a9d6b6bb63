//! PrinterTransport middleware for monitoring transport traffic
//!
//! Wraps any Transport implementation and prints every outbound frame and
//! inbound report to stderr.
//!
//! # Example
//!
//! ```ignore
//! use fm430_transport::{HidDiscovery, PrinterConfig, PrinterTransport};
//!
//! let transport = discovery.open_device(&device).await?;
//! let monitored = PrinterTransport::wrap(transport, PrinterConfig::default());
//! ```

use std::str::FromStr;
use std::sync::Arc;

use crossterm::style::Stylize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::{Transport, TransportDeviceInfo, TransportError, TransportEvent};

/// Broadcast capacity of the re-published inbound channel
const FORWARD_CHANNEL_CAPACITY: usize = 256;

/// Packet filter for selective display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketFilter {
    #[default]
    All,
    /// Only frames written to the device
    Outbound,
    /// Only reports read from the device
    Inbound,
}

impl FromStr for PacketFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "" => Ok(Self::All),
            "out" | "outbound" | "commands" | "cmd" => Ok(Self::Outbound),
            "in" | "inbound" | "reports" | "rpt" => Ok(Self::Inbound),
            _ => Err(format!("Unknown filter: {}", s)),
        }
    }
}

/// Configuration for the PrinterTransport
#[derive(Debug, Clone, Default)]
pub struct PrinterConfig {
    /// Show raw hex dump alongside the escaped text
    pub show_hex: bool,
    /// Filter for selective display
    pub filter: PacketFilter,
}

impl PrinterConfig {
    /// Create config with hex output setting
    pub fn with_hex(mut self, show: bool) -> Self {
        self.show_hex = show;
        self
    }

    /// Create config with filter
    pub fn with_filter(mut self, filter: PacketFilter) -> Self {
        self.filter = filter;
        self
    }

    fn shows_outbound(&self) -> bool {
        matches!(self.filter, PacketFilter::All | PacketFilter::Outbound)
    }

    fn shows_inbound(&self) -> bool {
        matches!(self.filter, PacketFilter::All | PacketFilter::Inbound)
    }
}

/// Render a frame as text, spelling out control bytes (`<STX>`, `<ETX>`, ...)
pub fn render_frame(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &b in data {
        match b {
            0x00 => out.push_str("<NUL>"),
            0x01 => out.push_str("<SOH>"),
            0x02 => out.push_str("<STX>"),
            0x03 => out.push_str("<ETX>"),
            0x04 => out.push_str("<EOT>"),
            0x05 => out.push_str("<ENQ>"),
            0x06 => out.push_str("<ACK>"),
            0x0A => out.push_str("<LF>"),
            0x0D => out.push_str("<CR>"),
            0x15 => out.push_str("<NAK>"),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("<{:02X}>", b)),
        }
    }
    out
}

/// Drop trailing zero padding for display
fn trim_padding(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &data[..end]
}

/// Transport middleware that prints all frames and reports
pub struct PrinterTransport {
    inner: Arc<dyn Transport>,
    config: PrinterConfig,
    forward_tx: Option<broadcast::Sender<TransportEvent>>,
}

impl PrinterTransport {
    /// Wrap a transport with printing middleware
    pub fn wrap(transport: Arc<dyn Transport>, config: PrinterConfig) -> Arc<dyn Transport> {
        let forward_tx = transport.subscribe().map(|mut inner_rx| {
            let (tx, _) = broadcast::channel(FORWARD_CHANNEL_CAPACITY);
            let tx_clone = tx.clone();
            let print_config = config.clone();
            std::thread::Builder::new()
                .name("printer-forward".into())
                .spawn(move || loop {
                    match inner_rx.blocking_recv() {
                        Ok(event) => {
                            print_event(&print_config, &event);
                            let _ = tx_clone.send(event);
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!("Printer forwarder lagged by {} reports", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                })
                .expect("Failed to spawn printer forwarding thread");
            tx
        });

        Arc::new(Self {
            inner: transport,
            config,
            forward_tx,
        })
    }

    /// Print a frame being written
    fn print_outbound(&self, frame: &[u8]) {
        if !self.config.shows_outbound() {
            return;
        }
        eprintln!("{} {}  {}", ">>>".cyan(), "CMD".cyan().bold(), render_frame(frame));
        if self.config.show_hex {
            eprintln!("    {}  {:02x?}", "HEX".dim(), frame);
        }
    }
}

/// Print one inbound event
fn print_event(config: &PrinterConfig, event: &TransportEvent) {
    if !config.shows_inbound() {
        return;
    }
    match event {
        TransportEvent::Report(report) => {
            let data = trim_padding(&report.data);
            eprintln!(
                "{} {}  [{:.3}s] {}",
                "<<<".green(),
                "RPT".green().bold(),
                report.timestamp,
                render_frame(data)
            );
            if config.show_hex {
                eprintln!("    {}  {:02x?}", "HEX".dim(), data);
            }
        }
        TransportEvent::Error(e) => {
            eprintln!("{} {}  {}", "<<<".red(), "ERR".red().bold(), e);
        }
    }
}

impl Transport for PrinterTransport {
    fn write_frame(&self, frame: &[u8]) -> Result<(), TransportError> {
        self.print_outbound(frame);
        self.inner.write_frame(frame)
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<TransportEvent>> {
        self.forward_tx.as_ref().map(|tx| tx.subscribe())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        self.inner.device_info()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn close(&self) -> Result<(), TransportError> {
        self.inner.close()
    }
}
