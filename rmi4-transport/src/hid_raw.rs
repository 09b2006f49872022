//! hidraw transport backed by hidapi
//!
//! The device node is opened twice: one handle sends output and feature
//! reports, the other is owned by a dedicated reader thread that hands every
//! inbound report to a callback (normally the device's `on_report`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use hidapi::HidDevice;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::protocol::report_id;
use crate::types::TransportDeviceInfo;
use crate::HidTransport;

/// HID transport writing reports through a hidraw handle
pub struct HidRawTransport {
    /// Handle for output and feature reports
    device: Mutex<HidDevice>,
    /// Device information
    info: TransportDeviceInfo,
}

impl HidRawTransport {
    pub fn new(device: HidDevice, info: TransportDeviceInfo) -> Self {
        Self {
            device: Mutex::new(device),
            info,
        }
    }

    /// Check if the device still answers
    pub fn is_connected(&self) -> bool {
        self.device.lock().get_product_string().is_ok()
    }
}

impl HidTransport for HidRawTransport {
    fn output_report(&self, report: &[u8]) -> Result<usize, TransportError> {
        trace!(
            "Output report {}: {:02X?}",
            report_id::name(report.first().copied().unwrap_or(0)),
            report
        );
        let written = self.device.lock().write(report)?;
        Ok(written)
    }

    fn set_feature_report(&self, report: &[u8]) -> Result<(), TransportError> {
        trace!("Feature report: {:02X?}", report);
        self.device.lock().send_feature_report(report)?;
        Ok(())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}

/// Configuration for the report reader loop
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Read timeout in milliseconds (for checking shutdown flag when idle)
    pub read_timeout_ms: i32,
    /// Sleep duration on error before retrying
    pub error_sleep_ms: u64,
    /// Largest report accepted
    pub buffer_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 10,
            error_sleep_ms: 100,
            buffer_size: 64,
        }
    }
}

/// Background thread reading input reports
///
/// Dropping the reader signals the thread and waits for it to exit.
pub struct ReportReader {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReportReader {
    /// Spawn the reader thread feeding each report to `handler`
    pub fn spawn<F>(
        input_device: HidDevice,
        config: ReaderConfig,
        handler: F,
    ) -> Result<Self, TransportError>
    where
        F: Fn(&[u8]) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name("rmi-report-reader".into())
            .spawn(move || run_report_reader_loop(input_device, shutdown_clone, handler, config))
            .map_err(|e| TransportError::Internal(format!("spawn report reader: {e}")))?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Stop the reader thread
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Report reader thread panicked");
            }
        }
    }
}

impl Drop for ReportReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read loop for the delivery path
///
/// Reads input reports until the shutdown flag is set. Errors are logged and
/// the loop keeps trying, since the device might recover.
pub fn run_report_reader_loop<F>(
    input_device: HidDevice,
    shutdown: Arc<AtomicBool>,
    handler: F,
    config: ReaderConfig,
) where
    F: Fn(&[u8]),
{
    debug!("Report reader thread started");
    let mut buf = vec![0u8; config.buffer_size];

    while !shutdown.load(Ordering::Relaxed) {
        match input_device.read_timeout(&mut buf, config.read_timeout_ms) {
            Ok(len) if len > 0 => {
                trace!("Input report ({} bytes): {:02X?}", len, &buf[..len]);
                handler(&buf[..len]);
            }
            Ok(_) => {
                // Timeout, no data - loop continues to check shutdown
            }
            Err(e) => {
                warn!("Report reader error: {}", e);
                std::thread::sleep(Duration::from_millis(config.error_sleep_ms));
            }
        }
    }

    debug!("Report reader thread exiting");
}
