//! Paged register transport
//!
//! RMI4 exposes a 16-bit register space split into 256-byte pages. A HID
//! output report cannot return data synchronously, so a register read is a
//! request (read-address report) followed by one or more read-data input
//! reports arriving later on the delivery path:
//!
//! ```text
//! caller thread                         delivery path (reader thread)
//! ─────────────                         ────────────────────────────
//! lock page ─► [select page] ─► arm
//!          ─► send read-address
//!          ─► wait (≤ timeout) ◄──────── deliver_read_data() deposits + notifies
//!          ─► copy fragment, repeat until len bytes
//! disarm ─► unlock page
//! ```
//!
//! The page lock is held for the whole cycle so only one register
//! transaction is ever in flight, which also tells us which read a
//! read-data report answers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::error::TransportError;
use crate::protocol::{self, RmiMode};
use crate::report::{self, ReadData};
use crate::types::{ReadPolicy, ReportSizes};
use crate::{HidTransport, RegisterAccess};

/// State of the single read slot shared with the delivery path
enum ReadSlot {
    /// No read outstanding; read-data reports are unsolicited
    Idle,
    /// A read request is outstanding; fragments delivered so far
    Pending(VecDeque<Vec<u8>>),
}

/// Single-slot rendezvous between a blocked reader and the delivery path
struct Rendezvous {
    slot: Mutex<ReadSlot>,
    ready: Condvar,
}

impl Rendezvous {
    fn new() -> Self {
        Self {
            slot: Mutex::new(ReadSlot::Idle),
            ready: Condvar::new(),
        }
    }

    /// Mark a read pending, dropping fragments left over from an earlier attempt
    fn arm(&self) {
        *self.slot.lock() = ReadSlot::Pending(VecDeque::new());
    }

    fn disarm(&self) {
        *self.slot.lock() = ReadSlot::Idle;
    }

    fn is_pending(&self) -> bool {
        matches!(*self.slot.lock(), ReadSlot::Pending(_))
    }

    /// Producer side. Returns false when no read is pending.
    fn deposit(&self, report: &[u8]) -> bool {
        let mut slot = self.slot.lock();
        match &mut *slot {
            ReadSlot::Idle => false,
            ReadSlot::Pending(fragments) => {
                fragments.push_back(report.to_vec());
                self.ready.notify_one();
                true
            }
        }
    }

    /// Consumer side. Waits until a fragment is available or the deadline passes.
    fn take(&self, deadline: Instant) -> Option<Vec<u8>> {
        let mut slot = self.slot.lock();
        loop {
            match &mut *slot {
                ReadSlot::Pending(fragments) => {
                    if let Some(fragment) = fragments.pop_front() {
                        return Some(fragment);
                    }
                }
                ReadSlot::Idle => return None,
            }
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                return match &mut *slot {
                    ReadSlot::Pending(fragments) => fragments.pop_front(),
                    ReadSlot::Idle => None,
                };
            }
        }
    }
}

/// Register transport over RMI4 HID reports
///
/// Implements [`RegisterAccess`] on top of any [`HidTransport`]. Inbound
/// read-data reports must be fed to [`PagedTransport::deliver_read_data`]
/// from the delivery path.
pub struct PagedTransport {
    hid: Arc<dyn HidTransport>,
    sizes: ReportSizes,
    policy: ReadPolicy,
    /// Last page written to the page select register (`None` until first write).
    /// Locked for the full duration of a register transaction.
    page: Mutex<Option<u8>>,
    rendezvous: Rendezvous,
}

impl PagedTransport {
    /// Create a new paged transport with the default read policy
    pub fn new(hid: Arc<dyn HidTransport>, sizes: ReportSizes) -> Self {
        Self {
            hid,
            sizes,
            policy: ReadPolicy::default(),
            page: Mutex::new(None),
            rendezvous: Rendezvous::new(),
        }
    }

    /// Override the read timeout / retry budget
    pub fn with_read_policy(mut self, policy: ReadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Access the wrapped report transport
    pub fn hid(&self) -> &Arc<dyn HidTransport> {
        &self.hid
    }

    pub fn sizes(&self) -> ReportSizes {
        self.sizes
    }

    pub fn read_policy(&self) -> ReadPolicy {
        self.policy
    }

    /// Page currently selected on the device, if known
    pub fn current_page(&self) -> Option<u8> {
        *self.page.lock()
    }

    /// Whether a register read is waiting for read-data reports
    pub fn read_pending(&self) -> bool {
        self.rendezvous.is_pending()
    }

    /// Write the page select register unconditionally
    pub fn set_page(&self, page: u8) -> Result<(), TransportError> {
        let mut current = self.page.lock();
        self.write_page(&mut current, page)
    }

    /// Select the device's reporting mode (feature report, no page involved)
    pub fn set_mode(&self, mode: RmiMode) -> Result<(), TransportError> {
        debug!("Setting RMI mode to {}", mode);
        self.hid
            .set_feature_report(&report::build_set_mode(mode))
            .inspect_err(|e| error!("Unable to set RMI mode to {}: {}", mode, e))
    }

    /// Feed a read-data input report from the delivery path.
    ///
    /// Fails with [`TransportError::UnsolicitedReadData`] when no read is
    /// pending; the report is dropped and nothing else changes.
    pub fn deliver_read_data(&self, report: &[u8]) -> Result<(), TransportError> {
        let report = &report[..report.len().min(self.sizes.input)];
        if self.rendezvous.deposit(report) {
            Ok(())
        } else {
            warn!("Read data report with no read request pending, dropping");
            Err(TransportError::UnsolicitedReadData)
        }
    }

    fn send_output(&self, frame: &[u8]) -> Result<(), TransportError> {
        let written = self.hid.output_report(frame)?;
        if written != frame.len() {
            return Err(TransportError::ShortWrite {
                expected: frame.len(),
                actual: written,
            });
        }
        Ok(())
    }

    fn write_page(&self, current: &mut Option<u8>, page: u8) -> Result<(), TransportError> {
        let frame = report::build_set_page(page, self.sizes.output);
        self.send_output(&frame)
            .inspect_err(|e| error!("Set page 0x{:02X} failed: {}", page, e))?;
        debug!("Selected page 0x{:02X}", page);
        *current = Some(page);
        Ok(())
    }

    fn select_page(&self, current: &mut Option<u8>, page: u8) -> Result<(), TransportError> {
        if *current != Some(page) {
            self.write_page(current, page)?;
        }
        Ok(())
    }

    fn read_with_retries(
        &self,
        addr: u16,
        request: &[u8],
        len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        for attempt in 1..=self.policy.retries {
            self.rendezvous.arm();
            self.send_output(request).inspect_err(|e| {
                error!("Failed to write read request for 0x{:04X}: {}", addr, e)
            })?;

            match self.collect(len) {
                Some(buf) => {
                    debug!(
                        "Read {} bytes at 0x{:04X} (attempt {}): {:02X?}",
                        len,
                        addr,
                        attempt,
                        &buf[..buf.len().min(16)]
                    );
                    return Ok(buf);
                }
                None => warn!(
                    "Read of {} bytes at 0x{:04X} timed out (attempt {}/{})",
                    len, addr, attempt, self.policy.retries
                ),
            }
        }

        Err(TransportError::Timeout)
    }

    /// Gather `len` bytes from one or more read-data reports
    fn collect(&self, len: usize) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(len);
        while buf.len() < len {
            let deadline = Instant::now() + self.policy.timeout;
            let fragment = self.rendezvous.take(deadline)?;
            match ReadData::parse(&fragment) {
                Ok(read) if read.count == 0 || read.data.is_empty() => {
                    warn!(
                        "Empty read data fragment, {} of {} bytes so far",
                        buf.len(),
                        len
                    );
                }
                Ok(read) => {
                    let take = (read.count as usize)
                        .min(len - buf.len())
                        .min(read.data.len());
                    buf.extend_from_slice(&read.data[..take]);
                }
                Err(e) => warn!("Discarding malformed read data report: {}", e),
            }
        }
        Some(buf)
    }
}

impl RegisterAccess for PagedTransport {
    fn read_block(&self, addr: u16, len: usize) -> Result<Vec<u8>, TransportError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let wire_len = u16::try_from(len).map_err(|_| TransportError::PayloadTooLarge {
            len,
            max: u16::MAX as usize,
        })?;

        let mut current = self.page.lock();
        self.select_page(&mut current, protocol::page(addr))?;

        let request = report::build_read_request(addr, wire_len, self.sizes.output);
        let result = self.read_with_retries(addr, &request, len);
        self.rendezvous.disarm();
        result
    }

    fn write_block(&self, addr: u16, data: &[u8]) -> Result<(), TransportError> {
        let frame = report::build_write(addr, data, self.sizes.output)?;

        let mut current = self.page.lock();
        self.select_page(&mut current, protocol::page(addr))?;
        debug!("Writing {} bytes at 0x{:04X}", data.len(), addr);
        self.send_output(&frame)
    }
}
