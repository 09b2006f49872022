//! hidraw device discovery
//!
//! hidapi lists one entry per top-level collection, and RMI4 touchpads
//! expose several (mouse, vendor, ...) on the same node, so entries are
//! deduplicated by path.

use std::collections::HashSet;
use std::ffi::CString;

use hidapi::{HidApi, HidDevice};
use rmi4_transport::{HidRawTransport, TransportDeviceInfo, TransportError};
use tracing::{debug, info};

use crate::config::DriverConfig;

/// List supported devices currently attached
pub fn list_devices(config: &DriverConfig) -> Result<Vec<TransportDeviceInfo>, TransportError> {
    let api = HidApi::new().map_err(|e| TransportError::HidError(e.to_string()))?;
    let mut seen = HashSet::new();
    let mut devices = Vec::new();

    for device_info in api.device_list() {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();
        if !config.is_supported(vid, pid) {
            continue;
        }

        let path = device_info.path().to_string_lossy().to_string();
        if !seen.insert(path.clone()) {
            continue;
        }

        let serial = device_info.serial_number().map(|s| s.to_string());
        let product_name = device_info.product_string().map(|s| s.to_string());
        debug!("Found device: VID={:04X} PID={:04X} path={}", vid, pid, path);

        devices.push(TransportDeviceInfo {
            vid,
            pid,
            device_path: path,
            serial,
            product_name,
        });
    }

    info!("Found {} devices", devices.len());
    Ok(devices)
}

/// Pick the device at `path`, or the first one found
pub fn select_device(
    config: &DriverConfig,
    path: Option<&str>,
) -> Result<TransportDeviceInfo, TransportError> {
    let devices = list_devices(config)?;
    match path {
        Some(path) => devices.into_iter().find(|d| d.device_path == path),
        None => devices.into_iter().next(),
    }
    .ok_or_else(|| {
        TransportError::DeviceNotFound(path.unwrap_or("no supported touchpad").to_string())
    })
}

/// Open a device for register access
///
/// Returns the transport used for output and feature reports, plus a second
/// handle on the same node for the report reader thread.
pub fn open_device(
    info: &TransportDeviceInfo,
) -> Result<(HidRawTransport, HidDevice), TransportError> {
    let api = HidApi::new().map_err(|e| TransportError::HidError(e.to_string()))?;
    let path = CString::new(info.device_path.as_str())
        .map_err(|e| TransportError::Internal(format!("invalid device path: {e}")))?;

    let output = api.open_path(&path).map_err(TransportError::from)?;
    let input = api.open_path(&path).map_err(TransportError::from)?;

    info!(
        "Opened {} ({:04x}:{:04x}) at {}",
        info.product_name.as_deref().unwrap_or("Unknown"),
        info.vid,
        info.pid,
        info.device_path
    );
    Ok((HidRawTransport::new(output, info.clone()), input))
}
