//! Common types for transport layer

use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::protocol::REPORT_SIZE;

/// Device identification information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportDeviceInfo {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// Device path (hidraw node or platform identifier)
    pub device_path: String,
    /// Serial number if available
    pub serial: Option<String>,
    /// Product name if available
    pub product_name: Option<String>,
    /// Manufacturer string if available
    pub manufacturer: Option<String>,
}

/// Discovered device that can be opened
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    /// Device information
    pub info: TransportDeviceInfo,
}

/// How logical frames map onto raw HID reports.
///
/// The scanner exchanges one logical frame per HID report. Depending on the
/// interface mode the report may carry a report ID and/or a length byte in
/// front of the frame bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportFormat {
    /// Size of a report payload, excluding the report ID byte
    pub report_size: usize,
    /// Report ID prepended to every output report (0 = unnumbered)
    pub output_report_id: u8,
    /// Report ID to strip from input reports, if the device numbers them
    pub input_report_id: Option<u8>,
    /// Whether a length byte precedes the frame in both directions
    pub length_prefixed: bool,
}

impl Default for ReportFormat {
    fn default() -> Self {
        Self {
            report_size: REPORT_SIZE,
            output_report_id: 0,
            input_report_id: None,
            length_prefixed: false,
        }
    }
}

impl ReportFormat {
    /// Largest frame that fits a single output report
    pub fn max_frame_len(&self) -> usize {
        if self.length_prefixed {
            self.report_size.saturating_sub(1).min(u8::MAX as usize)
        } else {
            self.report_size
        }
    }
}

/// A raw input report, already stripped of report framing
#[derive(Debug, Clone, PartialEq)]
pub struct InboundReport {
    /// Seconds since the transport was opened
    pub timestamp: f64,
    /// Logical frame bytes
    pub data: Vec<u8>,
}

impl InboundReport {
    pub fn new(timestamp: f64, data: Vec<u8>) -> Self {
        Self { timestamp, data }
    }
}

/// Everything the transport pushes towards its subscriber
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// One HID input report (one logical frame)
    Report(InboundReport),
    /// Read failure on the input endpoint
    Error(TransportError),
}
