//! Transport layer for RMI4 devices tunneled over HID
//!
//! Synaptics-style touch controllers expose a paged 16-bit register space
//! (RMI4) behind a handful of vendor HID reports. This crate provides:
//!
//! - the fixed report layouts ([`report`]),
//! - a blocking paged register transport built from asynchronous reports
//!   ([`PagedTransport`]),
//! - a hidraw backend with its input-report reader thread ([`HidRawTransport`],
//!   [`ReportReader`]).
//!
//! ```text
//! [HidRawTransport]  ← implements HidTransport (raw report I/O)
//!         |
//! [PagedTransport]   ← page select, read requests, retries
//!         |           ← implements RegisterAccess
//! [PDT scan / function populators]
//! ```

pub mod error;
pub mod protocol;
pub mod report;
pub mod types;

mod hid_raw;
mod register;

pub use error::TransportError;
pub use hid_raw::{run_report_reader_loop, HidRawTransport, ReaderConfig, ReportReader};
pub use protocol::RmiMode;
pub use register::PagedTransport;
pub use report::{Attention, InboundReport};
pub use types::{ReadPolicy, ReportSizes, TransportDeviceInfo};

/// Raw HID report I/O - implemented by each backend
///
/// Inbound reports are not read through this trait; the backend pushes them
/// to the device from its own delivery path.
pub trait HidTransport: Send + Sync {
    /// Send an output report (report ID in byte 0)
    ///
    /// # Returns
    /// Number of bytes the backend accepted
    fn output_report(&self, report: &[u8]) -> Result<usize, TransportError>;

    /// Send a feature report (report ID in byte 0)
    fn set_feature_report(&self, report: &[u8]) -> Result<(), TransportError>;

    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;
}

/// Blocking access to the 16-bit RMI4 register space
pub trait RegisterAccess {
    /// Read `len` consecutive registers starting at `addr`
    fn read_block(&self, addr: u16, len: usize) -> Result<Vec<u8>, TransportError>;

    /// Write consecutive registers starting at `addr`
    fn write_block(&self, addr: u16, data: &[u8]) -> Result<(), TransportError>;

    /// Read a single register
    fn read(&self, addr: u16) -> Result<u8, TransportError> {
        self.read_block(addr, 1)?
            .first()
            .copied()
            .ok_or(TransportError::Timeout)
    }
}
