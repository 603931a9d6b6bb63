//! Device discovery for FM430 scanners

use std::sync::Arc;

use async_trait::async_trait;
use hidapi::HidApi;
use tracing::{debug, info};

use crate::device_registry;
use crate::error::TransportError;
use crate::hid_pos::HidPosTransport;
use crate::printer::{PrinterConfig, PrinterTransport};
use crate::types::{DiscoveredDevice, ReportFormat, TransportDeviceInfo};
use crate::Transport;

/// HID usage page for bar code scanners (HID POS usage tables)
const USAGE_PAGE_BARCODE_SCANNER: u16 = 0x8C;

/// Device discovery abstraction
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    /// List currently available devices
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError>;

    /// Open a specific device
    async fn open_device(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}

/// HID device discovery for scanners in HID-POS mode
pub struct HidDiscovery {
    /// Known VID/PID pairs to look for
    known_devices: Vec<(u16, u16)>,
    /// Report framing applied to opened transports
    format: ReportFormat,
    /// Optional printer config for monitoring mode - wraps transports automatically
    printer_config: Option<PrinterConfig>,
}

impl Default for HidDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl HidDiscovery {
    /// Create a new HID discovery instance for the known HID-POS PIDs
    pub fn new() -> Self {
        Self {
            known_devices: device_registry::HID_POS_PIDS
                .iter()
                .map(|&pid| (device_registry::VENDOR_ID, pid))
                .collect(),
            format: ReportFormat::default(),
            printer_config: None,
        }
    }

    /// Use a specific report framing for opened devices
    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    /// Wrap every opened transport with the monitoring printer
    pub fn with_printer_config(mut self, config: PrinterConfig) -> Self {
        self.printer_config = Some(config);
        self
    }

    /// Add a VID/PID pair to discover
    pub fn add_device(&mut self, vid: u16, pid: u16) {
        if !self.known_devices.contains(&(vid, pid)) {
            self.known_devices.push((vid, pid));
        }
    }

    /// Check if a device matches our known devices
    fn is_known_device(&self, vid: u16, pid: u16) -> bool {
        self.known_devices.contains(&(vid, pid))
    }

    /// Open the first device matching `vid` and, if given, `pid`
    pub async fn open_first(
        &self,
        vid: u16,
        pid: Option<u16>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let devices = self.list_devices().await?;
        let device = devices
            .iter()
            .find(|d| d.info.vid == vid && pid.map_or(true, |p| d.info.pid == p))
            .ok_or_else(|| match pid {
                Some(p) => TransportError::DeviceNotFound(format!("{vid:04X}:{p:04X}")),
                None => TransportError::DeviceNotFound(format!("{vid:04X}:*")),
            })?;
        self.open_device(device).await
    }
}

impl HidDiscovery {
    /// Scanners attached in keyboard-wedge mode.
    ///
    /// They enumerate as plain keyboards, so `list_devices` never reports
    /// them; this lets callers explain why nothing was found.
    pub fn list_keyboard_wedges() -> Result<Vec<TransportDeviceInfo>, TransportError> {
        let api = HidApi::new().map_err(|e| TransportError::HidError(e.to_string()))?;
        let mut found: Vec<TransportDeviceInfo> = Vec::new();
        for device_info in api.device_list() {
            if device_info.vendor_id() != device_registry::VENDOR_ID
                || !device_registry::is_keyboard_wedge_pid(device_info.product_id())
            {
                continue;
            }
            let path = device_info.path().to_string_lossy().to_string();
            if found.iter().any(|d| d.device_path == path) {
                continue;
            }
            found.push(TransportDeviceInfo {
                vid: device_info.vendor_id(),
                pid: device_info.product_id(),
                device_path: path,
                serial: device_info.serial_number().map(|s| s.to_string()),
                product_name: device_info.product_string().map(|s| s.to_string()),
                manufacturer: device_info.manufacturer_string().map(|s| s.to_string()),
            });
        }
        Ok(found)
    }
}

#[async_trait]
impl DeviceDiscovery for HidDiscovery {
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let api = HidApi::new().map_err(|e| TransportError::HidError(e.to_string()))?;
        let mut devices: Vec<DiscoveredDevice> = Vec::new();

        for device_info in api.device_list() {
            let vid = device_info.vendor_id();
            let pid = device_info.product_id();

            if !self.is_known_device(vid, pid) {
                continue;
            }

            // Composite devices expose several collections; skip anything that
            // declares a usage page other than the bar code scanner page.
            let usage_page = device_info.usage_page();
            if usage_page != 0 && usage_page != USAGE_PAGE_BARCODE_SCANNER {
                continue;
            }

            let path = device_info.path().to_string_lossy().to_string();
            if devices.iter().any(|d| d.info.device_path == path) {
                continue;
            }

            debug!(
                "Found scanner: VID={:04X} PID={:04X} usage_page={:04X} path={}",
                vid, pid, usage_page, path
            );

            devices.push(DiscoveredDevice {
                info: TransportDeviceInfo {
                    vid,
                    pid,
                    device_path: path,
                    serial: device_info.serial_number().map(|s| s.to_string()),
                    product_name: device_info.product_string().map(|s| s.to_string()),
                    manufacturer: device_info.manufacturer_string().map(|s| s.to_string()),
                },
            });
        }

        Ok(devices)
    }

    async fn open_device(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let api = HidApi::new().map_err(|e| TransportError::HidError(e.to_string()))?;
        let path = std::ffi::CString::new(device.info.device_path.clone())
            .map_err(|e| TransportError::Internal(e.to_string()))?;

        // One handle for writes, one owned by the reader thread
        let output = api.open_path(&path)?;
        let input = api.open_path(&path)?;

        info!(
            "Opened scanner {:04X}:{:04X} at {}",
            device.info.vid, device.info.pid, device.info.device_path
        );

        let transport: Arc<dyn Transport> = Arc::new(HidPosTransport::new(
            output,
            input,
            device.info.clone(),
            self.format,
        ));

        Ok(match &self.printer_config {
            Some(config) => PrinterTransport::wrap(transport, config.clone()),
            None => transport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_devices_default() {
        let discovery = HidDiscovery::new();
        assert!(discovery.is_known_device(device_registry::VENDOR_ID, 0x8003));
        assert!(!discovery.is_known_device(device_registry::VENDOR_ID, 0x0C06));
    }

    #[test]
    fn test_add_device_deduplicates() {
        let mut discovery = HidDiscovery::new();
        let before = discovery.known_devices.len();
        discovery.add_device(0x1234, 0x5678);
        discovery.add_device(0x1234, 0x5678);
        assert_eq!(discovery.known_devices.len(), before + 1);
        assert!(discovery.is_known_device(0x1234, 0x5678));
    }

    #[test]
    #[ignore] // requires a hidapi backend (udev/hidraw)
    fn test_list_devices() {
        let discovery = HidDiscovery::new();
        let result = futures::executor::block_on(discovery.list_devices());
        assert!(result.is_ok());
    }
}
