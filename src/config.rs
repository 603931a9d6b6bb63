//! Driver configuration file
//!
//! Stored as TOML at `~/.config/fm430/driver.toml`. Every field is optional;
//! missing fields and a missing file fall back to defaults.
//!
//! ```toml
//! vendor_id = 0x1EAB
//! product_id = 0x8003
//! storage = "volatile"
//! response_timeout_ms = 3000
//! trigger_mode = "command"
//! log_level = "info"
//!
//! [report]
//! report_size = 64
//! output_report_id = 0
//! length_prefixed = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use fm430_scanner::{ScannerConfig, StorageType, DEFAULT_RESPONSE_TIMEOUT};
use fm430_transport::{ReportFormat, VENDOR_ID};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How `fm430 trigger` starts and stops scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// `SCNTRG` through the command queue, acknowledged by the scanner
    #[default]
    Command,
    /// Three-byte trigger frame, unacknowledged
    Minimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub vendor_id: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
    #[serde(
        serialize_with = "serialize_storage",
        deserialize_with = "deserialize_storage"
    )]
    pub storage: StorageType,
    pub response_timeout_ms: u64,
    pub trigger_mode: TriggerMode,
    pub log_level: String,
    pub report: ReportFormat,
}

// StorageType lives in the scanner crate without serde; go through its text form
fn serialize_storage<S: Serializer>(storage: &StorageType, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(storage)
}

fn deserialize_storage<'de, D: Deserializer<'de>>(d: D) -> Result<StorageType, D::Error> {
    let text = String::deserialize(d)?;
    text.parse().map_err(serde::de::Error::custom)
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            vendor_id: VENDOR_ID,
            product_id: None,
            storage: StorageType::Volatile,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64,
            trigger_mode: TriggerMode::default(),
            log_level: "info".to_string(),
            report: ReportFormat::default(),
        }
    }
}

impl DriverConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fm430")
            .join("driver.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: DriverConfig = toml::from_str(content)?;
        if config.response_timeout_ms == 0 {
            anyhow::bail!("response_timeout_ms must be greater than zero");
        }
        Ok(config)
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Settings for opening the scanner
    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            storage: self.storage,
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            report_format: self.report,
        }
    }
}
