//! Transport layer for Newland FM430 barcode scanners
//!
//! This crate owns everything below the scanner's command protocol:
//!
//! - opening the HID-POS interface (discovery by VID/PID)
//! - writing one logical frame per output report
//! - a reader thread that turns input reports into [`TransportEvent`]s
//! - a monitoring middleware that prints all traffic
//!
//! Frame contents are opaque here; the protocol engine lives in
//! `fm430-scanner`.

pub mod device_registry;
pub mod error;
pub mod printer;
pub mod protocol;
pub mod reader;
pub mod types;

mod discovery;
mod hid_pos;

pub use device_registry::{is_hid_pos_pid, is_keyboard_wedge_pid, HID_POS_PIDS, VENDOR_ID};
pub use discovery::{DeviceDiscovery, HidDiscovery};
pub use error::TransportError;
pub use hid_pos::HidPosTransport;
pub use printer::{PacketFilter, PrinterConfig, PrinterTransport};
pub use types::{
    DiscoveredDevice, InboundReport, ReportFormat, TransportDeviceInfo, TransportEvent,
};

use std::sync::Arc;
use tokio::sync::broadcast;

/// The transport boundary consumed by the scanner protocol engine
///
/// Implementations move opaque frames: one `write_frame` call is one output
/// report, and every input report shows up once on the `subscribe` channel.
pub trait Transport: Send + Sync {
    /// Write one logical frame as a single output report
    fn write_frame(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Subscribe to inbound reports and read errors
    ///
    /// Returns None if the transport has no input endpoint.
    fn subscribe(&self) -> Option<broadcast::Receiver<TransportEvent>>;

    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;

    /// Check if transport is still connected
    fn is_connected(&self) -> bool;

    /// Close the transport gracefully
    fn close(&self) -> Result<(), TransportError>;
}

/// Type alias for a shared transport
pub type BoxedTransport = Arc<dyn Transport>;
