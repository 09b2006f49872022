//! Simulated RMI4 touchpad for integration tests
//!
//! Holds a full 64K register map and a page select register. Read requests
//! are answered synchronously with read-data reports pushed through
//! `Rmi4Device::on_report`, split to the configured input report size.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rmi4_device::rmi4_transport::protocol::{page_base, report_id};
use rmi4_device::rmi4_transport::report::{PageSelectFrame, ReadAddressFrame, WRITE_HEADER_LEN};
use rmi4_device::rmi4_transport::{
    HidTransport, PagedTransport, ReadPolicy, ReportSizes, TransportDeviceInfo, TransportError,
};
use rmi4_device::{RecordingSink, Rmi4Device};

pub struct SimulatedTouchpad {
    info: TransportDeviceInfo,
    input_size: usize,
    regs: Mutex<Vec<u8>>,
    page: Mutex<u8>,
    /// Read requests for these addresses are silently dropped
    ignore_reads_at: Mutex<HashSet<u16>>,
    pub features: Mutex<Vec<Vec<u8>>>,
    pub page_writes: Mutex<Vec<u8>>,
    /// Time each output report takes to go out
    pub output_delay: Mutex<Duration>,
    device: OnceLock<Weak<Rmi4Device>>,
}

impl SimulatedTouchpad {
    pub fn new(input_size: usize) -> Arc<Self> {
        Arc::new(Self {
            info: TransportDeviceInfo {
                vid: 0x06cb,
                pid: 0x5555,
                device_path: "sim".into(),
                serial: None,
                product_name: Some("Simulated RMI4 Touchpad".into()),
            },
            input_size,
            regs: Mutex::new(vec![0u8; 0x10000]),
            page: Mutex::new(0),
            ignore_reads_at: Mutex::new(HashSet::new()),
            features: Mutex::new(Vec::new()),
            page_writes: Mutex::new(Vec::new()),
            output_delay: Mutex::new(Duration::ZERO),
            device: OnceLock::new(),
        })
    }

    pub fn set(&self, addr: u16, bytes: &[u8]) {
        let mut regs = self.regs.lock();
        let start = usize::from(addr);
        regs[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn ignore_reads_at(&self, addr: u16) {
        self.ignore_reads_at.lock().insert(addr);
    }

    pub fn attach(&self, device: &Arc<Rmi4Device>) {
        let _ = self.device.set(Arc::downgrade(device));
    }

    fn answer_read(&self, frame: &ReadAddressFrame) {
        let addr = page_base(*self.page.lock()) | (frame.addr() & 0x00ff);
        if self.ignore_reads_at.lock().contains(&addr) {
            return;
        }
        let data: Vec<u8> = {
            let regs = self.regs.lock();
            let start = usize::from(addr);
            let end = (start + usize::from(frame.len())).min(regs.len());
            regs[start..end].to_vec()
        };

        let Some(device) = self.device.get().and_then(Weak::upgrade) else {
            return;
        };
        for chunk in data.chunks(self.input_size - 2) {
            let mut report = vec![0u8; self.input_size];
            report[0] = report_id::READ_DATA;
            report[1] = chunk.len() as u8;
            report[2..2 + chunk.len()].copy_from_slice(chunk);
            device.on_report(&report);
        }
    }
}

impl HidTransport for SimulatedTouchpad {
    fn output_report(&self, report: &[u8]) -> Result<usize, TransportError> {
        let delay = *self.output_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if let Some(frame) = PageSelectFrame::parse(report) {
            *self.page.lock() = frame.page();
            self.page_writes.lock().push(frame.page());
        } else if let Some(frame) = ReadAddressFrame::parse(report) {
            self.answer_read(&frame);
        } else if report.first() == Some(&report_id::WRITE) && report.len() >= WRITE_HEADER_LEN {
            let count = usize::from(report[1]);
            let addr = page_base(*self.page.lock()) | u16::from(report[2]);
            let data = &report[WRITE_HEADER_LEN..WRITE_HEADER_LEN + count];
            self.set(addr, data);
        }
        Ok(report.len())
    }

    fn set_feature_report(&self, report: &[u8]) -> Result<(), TransportError> {
        self.features.lock().push(report.to_vec());
        Ok(())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}

/// Two-finger 3000x1800 sensor (100 x 60 mm) with two GPIO buttons
///
/// PDT on page 0: F01 (irq bits 0-1), F11 (bit 2), F30 (bit 3).
pub fn touchpad_registers(sim: &SimulatedTouchpad) {
    sim.set(0x00e9, &[0x0a, 0x0b, 0x0c, 0x0d, 0x02, 0x01]);
    sim.set(0x00e3, &[0x40, 0x00, 0x50, 0x10, 0x01, 0x11]);
    sim.set(0x00dd, &[0x68, 0x00, 0x70, 0x18, 0x01, 0x30]);

    // F11 queries: has query 9 and 12, two fingers with absolute reporting
    sim.set(0x0040, &[0x28, 0x11]);
    sim.set(0x0048, &[0x04]);
    sim.set(0x004b, &[0x20, 0xec, 0x03, 0x53, 0x02]);
    // F11 control: max x 3000, max y 1800
    sim.set(0x0056, &[0xb8, 0x0b, 0x08, 0x07]);

    // F30: GPIOs only, three lines; line 2 output, line 0 pulled up
    sim.set(0x0068, &[0x08, 0x03]);
    sim.set(0x0071, &[0x04, 0x01]);
}

pub fn fast_policy() -> ReadPolicy {
    ReadPolicy {
        timeout: Duration::from_millis(50),
        retries: 2,
    }
}

pub fn start(
    sim: &Arc<SimulatedTouchpad>,
    sizes: ReportSizes,
) -> (Arc<Rmi4Device>, Arc<RecordingSink>) {
    let transport =
        Arc::new(PagedTransport::new(sim.clone(), sizes).with_read_policy(fast_policy()));
    let sink = Arc::new(RecordingSink::new());
    let device = Arc::new(Rmi4Device::new(transport, sink.clone()));
    sim.attach(&device);
    (device, sink)
}

/// Poll `cond` until it holds or two seconds pass
pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
