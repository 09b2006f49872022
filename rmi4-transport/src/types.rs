//! Common types for transport layer

use std::time::Duration;

use crate::protocol::{report_size, timing};

/// Device identification information
#[derive(Debug, Clone, Default)]
pub struct TransportDeviceInfo {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// Device path or identifier (transport-specific)
    pub device_path: String,
    /// Serial number if available
    pub serial: Option<String>,
    /// Product name if available
    pub product_name: Option<String>,
}

/// Report sizes advertised by the device, including the report ID byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSizes {
    /// Size of the attention / read-data input reports
    pub input: usize,
    /// Size of the write / read-address output reports
    pub output: usize,
}

impl ReportSizes {
    pub fn new(input: usize, output: usize) -> Self {
        Self {
            input: input.max(report_size::MIN_INPUT),
            output: output.max(report_size::MIN_OUTPUT),
        }
    }
}

impl Default for ReportSizes {
    fn default() -> Self {
        Self::new(report_size::DEFAULT_INPUT, report_size::DEFAULT_OUTPUT)
    }
}

/// Retry budget for register reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPolicy {
    /// How long to wait for each read-data report
    pub timeout: Duration,
    /// Number of read request attempts
    pub retries: usize,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(timing::READ_TIMEOUT_MS),
            retries: timing::READ_RETRIES,
        }
    }
}
