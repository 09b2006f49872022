//! Driver configuration
//!
//! Stored as TOML. Every field has a default, so a partial file (or none at
//! all) is valid.

use std::path::PathBuf;
use std::time::Duration;

use rmi4_transport::{ReadPolicy, ReportSizes};
use serde::{Deserialize, Serialize};

/// Synaptics USB vendor ID; every product under it is handled
pub const SYNAPTICS_VENDOR_ID: u16 = 0x06cb;

/// Non-Synaptics devices known to speak RMI4 over HID
const KNOWN_DEVICES: &[DeviceId] = &[
    // Razer Blade 14
    DeviceId {
        vid: 0x1532,
        pid: 0x011d,
    },
];

/// USB vendor/product pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    pub vid: u16,
    pub pid: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Input report size including the report ID byte
    #[serde(default = "default_input_report_size")]
    pub input_report_size: usize,
    /// Output report size including the report ID byte
    #[serde(default = "default_output_report_size")]
    pub output_report_size: usize,
    /// How long to wait for each register read answer
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Read request attempts before giving up
    #[serde(default = "default_read_retries")]
    pub read_retries: usize,
    /// Name of the virtual touchpad
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Devices handled in addition to the built-in table
    #[serde(default)]
    pub extra_devices: Vec<DeviceId>,
}

fn default_input_report_size() -> usize {
    30
}

fn default_output_report_size() -> usize {
    21
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_read_retries() -> usize {
    5
}

fn default_device_name() -> String {
    "RMI4 Touchpad".to_string()
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            input_report_size: default_input_report_size(),
            output_report_size: default_output_report_size(),
            read_timeout_ms: default_read_timeout_ms(),
            read_retries: default_read_retries(),
            device_name: default_device_name(),
            extra_devices: Vec::new(),
        }
    }
}

impl DriverConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rmi-driver")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: DriverConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn read_policy(&self) -> ReadPolicy {
        ReadPolicy {
            timeout: Duration::from_millis(self.read_timeout_ms),
            retries: self.read_retries.max(1),
        }
    }

    pub fn report_sizes(&self) -> ReportSizes {
        ReportSizes::new(self.input_report_size, self.output_report_size)
    }

    /// Whether a USB device should be driven as an RMI4 touchpad
    pub fn is_supported(&self, vid: u16, pid: u16) -> bool {
        let id = DeviceId { vid, pid };
        vid == SYNAPTICS_VENDOR_ID || KNOWN_DEVICES.contains(&id) || self.extra_devices.contains(&id)
    }
}
