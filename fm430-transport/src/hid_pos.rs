//! HID-POS transport implementation
//!
//! The scanner's HID-POS interface carries vendor commands on output reports
//! and both command responses and decoded barcodes on input reports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use hidapi::HidDevice;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::TransportError;
use crate::protocol::{self, timing};
use crate::reader::{ReaderConfig, ReportSubsystem};
use crate::types::{ReportFormat, TransportDeviceInfo, TransportEvent};
use crate::Transport;

/// HID transport for a scanner in HID-POS mode
pub struct HidPosTransport {
    /// Handle used for output reports
    device: Mutex<HidDevice>,
    /// Device information
    info: TransportDeviceInfo,
    /// Report framing
    format: ReportFormat,
    /// Reader thread feeding inbound reports
    reports: ReportSubsystem,
    /// Set once `close` has been called
    closed: AtomicBool,
}

impl HidPosTransport {
    /// Create a transport from two handles on the same interface
    ///
    /// # Arguments
    /// * `output_device` - handle used for writes
    /// * `input_device` - handle moved to the reader thread
    /// * `info` - Device information
    /// * `format` - Report framing for both directions
    pub fn new(
        output_device: HidDevice,
        input_device: HidDevice,
        info: TransportDeviceInfo,
        format: ReportFormat,
    ) -> Self {
        let reports = ReportSubsystem::spawn(input_device, ReaderConfig::hid_pos(format));
        Self {
            device: Mutex::new(output_device),
            info,
            format,
            reports,
            closed: AtomicBool::new(false),
        }
    }

    /// Report framing in use
    pub fn format(&self) -> &ReportFormat {
        &self.format
    }
}

impl Transport for HidPosTransport {
    fn write_frame(&self, frame: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }

        let buf = protocol::build_output_report(frame, &self.format)?;
        debug!("Writing frame ({} bytes): {:02X?}", frame.len(), frame);

        let device = self.device.lock();
        let mut attempt = 0;
        loop {
            match device.write(&buf) {
                Ok(_) => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    debug!("Write attempt {} failed: {}", attempt, e);
                    if attempt >= timing::WRITE_RETRIES {
                        return Err(e.into());
                    }
                    std::thread::sleep(Duration::from_millis(timing::WRITE_RETRY_DELAY_MS));
                }
            }
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<TransportEvent>> {
        Some(self.reports.subscribe())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    fn is_connected(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) || !self.reports.is_running() {
            return false;
        }
        let device = self.device.lock();
        device.get_product_string().is_ok()
    }

    fn close(&self) -> Result<(), TransportError> {
        // HidDevice handles drop with the transport
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for HidPosTransport {
    fn drop(&mut self) {
        debug!("HidPosTransport dropped, signaling report reader shutdown");
    }
}
