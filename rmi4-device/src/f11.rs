//! F11: 2D touch sensor
//!
//! Attention payload layout for `n` fingers:
//!
//! ```text
//! [finger status: ceil(n/4) bytes, 2 bits per finger]
//! [finger 0: X11..4][Y11..4][Y3..0 | X2..0][Wy | Wx][Z]
//! [finger 1: ...]
//! ```

use rmi4_transport::RegisterAccess;
use tracing::{debug, error, info};

use crate::dispatch::FunctionHandler;
use crate::error::{DecodeError, DeviceError};
use crate::events::{InputEvent, InputSink, TouchContact};
use crate::function::{FunctionDescriptor, F11};

/// Query register bits
mod query {
    /// Query 0
    pub const HAS_QUERY9: u8 = 1 << 3;
    pub const HAS_QUERY11: u8 = 1 << 4;
    pub const HAS_QUERY12: u8 = 1 << 5;
    /// Query 1
    pub const NUMBER_OF_FINGERS: u8 = 0x07;
    pub const HAS_ABS: u8 = 1 << 4;
    /// Query 8
    pub const HAS_QUERY10: u8 = 1 << 2;
    /// Query 12
    pub const HAS_PHYSICAL_PROPS: u8 = 1 << 5;

    /// Queries 0-8 are always present
    pub const QUERY12_BASE_OFFSET: u16 = 9;
}

/// Size of the control block holding the axis maxima
const CTRL_BLOCK_LEN: usize = 20;

/// Bytes per finger record
const FINGER_RECORD_LEN: usize = 5;

/// Finger state meaning "present, accurate"
const FINGER_PRESENT: u8 = 0x01;

/// Number of fingers encoded in query 1
///
/// The field is `fingers - 1`, except that anything above 5 fingers means
/// the sensor tracks 10.
pub fn finger_count(raw: u8) -> u8 {
    let fingers = (raw & query::NUMBER_OF_FINGERS) + 1;
    if fingers > 5 {
        10
    } else {
        fingers
    }
}

/// Length of the finger status prefix
fn status_len(fingers: u8) -> usize {
    usize::from(fingers).div_ceil(4)
}

/// Bytes F11 contributes to an attention report
pub fn report_size(fingers: u8) -> usize {
    usize::from(fingers) * FINGER_RECORD_LEN + status_len(fingers)
}

/// Tenths of a millimeter to whole millimeters, rounded to nearest
fn tenths_to_mm(tenths: u16) -> u16 {
    ((u32::from(tenths) + 5) / 10) as u16
}

/// Populated 2D sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchFunction {
    pub descriptor: FunctionDescriptor,
    pub max_fingers: u8,
    pub max_x: u16,
    pub max_y: u16,
    /// Physical sensor size, when the sensor reports it
    pub x_size_mm: Option<u16>,
    pub y_size_mm: Option<u16>,
}

/// Read F11's query and control registers
pub fn populate<R: RegisterAccess + ?Sized>(
    regs: &R,
    mut descriptor: FunctionDescriptor,
) -> Result<TouchFunction, DeviceError> {
    let query_base = descriptor.query_base_addr;
    let read = |addr: u16, len: usize, register: &'static str| {
        regs.read_block(addr, len).map_err(|source| {
            error!("F11: can not read {}: {}", register, source);
            DeviceError::Populate {
                function: F11,
                register,
                source,
            }
        })
    };
    let read_byte = |addr: u16, register: &'static str| -> Result<u8, DeviceError> {
        Ok(read(addr, 1, register)?.first().copied().unwrap_or(0))
    };

    let q0 = read_byte(query_base, "query 0")?;
    let has_query9 = q0 & query::HAS_QUERY9 != 0;
    let has_query11 = q0 & query::HAS_QUERY11 != 0;
    let has_query12 = q0 & query::HAS_QUERY12 != 0;

    let q1 = read_byte(query_base + 1, "query 1")?;
    let max_fingers = finger_count(q1);
    descriptor.report_size = report_size(max_fingers);

    if q1 & query::HAS_ABS == 0 {
        error!("F11: no absolute position reporting");
        return Err(DeviceError::Capability(
            "F11 does not report absolute positions".into(),
        ));
    }

    let q8 = read_byte(query_base + 8, "query 8")?;
    let has_query10 = q8 & query::HAS_QUERY10 != 0;

    let query12_offset = query::QUERY12_BASE_OFFSET
        + u16::from(has_query9)
        + u16::from(has_query10)
        + u16::from(has_query11);

    let mut x_size_mm = None;
    let mut y_size_mm = None;
    if has_query12 {
        let q12 = read_byte(query_base + query12_offset, "query 12")?;
        if q12 & query::HAS_PHYSICAL_PROPS != 0 {
            let buf = read(query_base + query12_offset + 1, 4, "queries 15-18")?;
            if let [x0, x1, y0, y1, ..] = buf[..] {
                let x = tenths_to_mm(u16::from_le_bytes([x0, x1]));
                let y = tenths_to_mm(u16::from_le_bytes([y0, y1]));
                info!("F11: size in mm: {} x {}", x, y);
                x_size_mm = Some(x);
                y_size_mm = Some(y);
            }
        }
    }

    let ctrl = read(descriptor.control_base_addr, CTRL_BLOCK_LEN, "control block")?;
    let word = |i: usize| match ctrl.get(i..i + 2) {
        Some(&[lo, hi]) => u16::from_le_bytes([lo, hi]),
        _ => 0,
    };
    let max_x = word(6);
    let max_y = word(8);

    debug!(
        "F11: {} fingers, {}x{}, report size {}",
        max_fingers, max_x, max_y, descriptor.report_size
    );

    Ok(TouchFunction {
        descriptor,
        max_fingers,
        max_x,
        max_y,
        x_size_mm,
        y_size_mm,
    })
}

impl TouchFunction {
    pub fn report_size(&self) -> usize {
        self.descriptor.report_size
    }

    /// Units per millimeter on each axis, when the physical size is known
    pub fn resolution(&self) -> Option<(u16, u16)> {
        match (self.x_size_mm, self.y_size_mm) {
            (Some(x_mm), Some(y_mm)) if x_mm > 0 && y_mm > 0 => Some((
                self.max_x.saturating_sub(1) / x_mm,
                self.max_y.saturating_sub(1) / y_mm,
            )),
            _ => None,
        }
    }

    fn decode_contact(&self, record: &[u8]) -> TouchContact {
        let x = (u16::from(record[0]) << 4) | u16::from(record[2] & 0x07);
        let y = (u16::from(record[1]) << 4) | u16::from(record[2] >> 4);
        let wx = record[3] & 0x07;
        let wy = record[3] >> 4;

        TouchContact {
            x,
            // Raw Y can overshoot max_y at the edge
            y: self.max_y.saturating_sub(y),
            pressure: record[4],
            touch_major: wx.max(wy),
            touch_minor: wx.min(wy),
            orientation: u8::from(wx > wy),
        }
    }
}

impl FunctionHandler for TouchFunction {
    fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    fn decode(&self, data: &[u8], sink: &dyn InputSink) -> Result<(), DecodeError> {
        if data.len() < self.report_size() {
            return Err(DecodeError::Truncated {
                function: F11,
                expected: self.report_size(),
                actual: data.len(),
            });
        }

        let (status, records) = data.split_at(status_len(self.max_fingers));
        for slot in 0..self.max_fingers {
            let i = usize::from(slot);
            let state = (status[i / 4] >> ((i % 4) * 2)) & 0x03;
            let contact = (state == FINGER_PRESENT).then(|| {
                let offset = i * FINGER_RECORD_LEN;
                self.decode_contact(&records[offset..offset + FINGER_RECORD_LEN])
            });
            sink.emit(InputEvent::Contact { slot, contact });
        }
        sink.emit(InputEvent::Sync);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::function::irq_mask;
    use parking_lot::Mutex;
    use rmi4_transport::TransportError;
    use std::collections::HashMap;

    fn descriptor() -> FunctionDescriptor {
        FunctionDescriptor {
            function_number: F11,
            page: 0,
            query_base_addr: 0x0040,
            command_base_addr: 0x0000,
            control_base_addr: 0x0050,
            data_base_addr: 0x0010,
            interrupt_base: 2,
            interrupt_count: 1,
            report_size: 0,
            irq_mask: irq_mask(2, 1),
        }
    }

    fn touchpad(max_fingers: u8, max_y: u16) -> TouchFunction {
        let mut descriptor = descriptor();
        descriptor.report_size = report_size(max_fingers);
        TouchFunction {
            descriptor,
            max_fingers,
            max_x: 3000,
            max_y,
            x_size_mm: None,
            y_size_mm: None,
        }
    }

    #[derive(Default)]
    struct Registers {
        regs: HashMap<u16, u8>,
        reads: Mutex<Vec<(u16, usize)>>,
        fail_at: Option<u16>,
    }

    impl Registers {
        fn set(&mut self, addr: u16, bytes: &[u8]) {
            for (i, b) in bytes.iter().enumerate() {
                self.regs.insert(addr + i as u16, *b);
            }
        }
    }

    impl RegisterAccess for Registers {
        fn read_block(&self, addr: u16, len: usize) -> Result<Vec<u8>, TransportError> {
            self.reads.lock().push((addr, len));
            if self.fail_at == Some(addr) {
                return Err(TransportError::Timeout);
            }
            Ok((0..len as u16)
                .map(|i| self.regs.get(&(addr + i)).copied().unwrap_or(0))
                .collect())
        }

        fn write_block(&self, _addr: u16, _data: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
    }

    /// 2 fingers, query 9 and 12 present, physical size 100.4 x 59.5 mm
    fn sensor_registers() -> Registers {
        let mut regs = Registers::default();
        regs.set(0x0040, &[query::HAS_QUERY9 | query::HAS_QUERY12]);
        regs.set(0x0041, &[0x01 | query::HAS_ABS]);
        regs.set(0x0048, &[query::HAS_QUERY10]);
        // query 12 at 9 + has9 + has10
        regs.set(0x004b, &[query::HAS_PHYSICAL_PROPS]);
        regs.set(0x004c, &[0xec, 0x03, 0x53, 0x02]);
        let mut ctrl = [0u8; CTRL_BLOCK_LEN];
        ctrl[6..10].copy_from_slice(&[0xb8, 0x0b, 0x08, 0x07]);
        regs.set(0x0050, &ctrl);
        regs
    }

    #[test]
    fn test_finger_count_quirk() {
        assert_eq!(finger_count(0), 1);
        assert_eq!(finger_count(4), 5);
        assert_eq!(finger_count(5), 10);
        assert_eq!(finger_count(6), 10);
        assert_eq!(finger_count(7), 10);
        // Upper bits are not part of the field
        assert_eq!(finger_count(0x11), 2);
    }

    #[test]
    fn test_report_size() {
        assert_eq!(report_size(10), 53);
        assert_eq!(report_size(1), 6);
        assert_eq!(report_size(4), 21);
        assert_eq!(report_size(5), 27);
    }

    #[test]
    fn test_populate() {
        let regs = sensor_registers();
        let touch = populate(&regs, descriptor()).unwrap();
        assert_eq!(touch.max_fingers, 2);
        assert_eq!(touch.report_size(), 11);
        assert_eq!(touch.max_x, 3000);
        assert_eq!(touch.max_y, 1800);
        assert_eq!(touch.x_size_mm, Some(100));
        assert_eq!(touch.y_size_mm, Some(60));
        assert_eq!(touch.resolution(), Some((29, 29)));

        let reads = regs.reads.lock();
        assert!(reads.contains(&(0x004b, 1)));
        assert!(reads.contains(&(0x004c, 4)));
        assert!(reads.contains(&(0x0050, CTRL_BLOCK_LEN)));
    }

    #[test]
    fn test_populate_without_query12() {
        let mut regs = sensor_registers();
        regs.set(0x0040, &[0x00]);
        let touch = populate(&regs, descriptor()).unwrap();
        assert_eq!(touch.x_size_mm, None);
        assert_eq!(touch.resolution(), None);
        assert!(!regs.reads.lock().iter().any(|&(addr, _)| addr == 0x004b));
    }

    #[test]
    fn test_populate_requires_absolute_reporting() {
        let mut regs = sensor_registers();
        regs.set(0x0041, &[0x01]);
        assert!(matches!(
            populate(&regs, descriptor()),
            Err(DeviceError::Capability(_))
        ));
    }

    #[test]
    fn test_populate_read_failure() {
        let mut regs = sensor_registers();
        regs.fail_at = Some(0x0050);
        match populate(&regs, descriptor()) {
            Err(DeviceError::Populate {
                function, register, ..
            }) => {
                assert_eq!(function, F11);
                assert_eq!(register, "control block");
            }
            other => panic!("Expected Populate error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_two_finger_frame() {
        let touch = touchpad(2, 1000);
        let sink = RecordingSink::new();
        let mut data = vec![0x01];
        data.extend_from_slice(&[0x10, 0x20, 0x03, 0x12, 0x64]);
        data.extend_from_slice(&[0xff; 5]);

        touch.decode(&data, &sink).unwrap();

        let expected = TouchContact {
            x: 0x103,
            y: 1000 - 0x200,
            pressure: 0x64,
            touch_major: 2,
            touch_minor: 1,
            orientation: 1,
        };
        assert_eq!(
            sink.events(),
            vec![
                InputEvent::Contact {
                    slot: 0,
                    contact: Some(expected)
                },
                InputEvent::Contact {
                    slot: 1,
                    contact: None
                },
                InputEvent::Sync,
            ]
        );
    }

    #[test]
    fn test_y_is_inverted() {
        let max_y = 1800;
        let touch = touchpad(1, max_y);
        for raw_y in [0u16, 1, 900, 1799, 1800] {
            let record = [0x00, (raw_y >> 4) as u8, ((raw_y & 0x0f) << 4) as u8, 0, 0];
            let contact = touch.decode_contact(&record);
            assert_eq!(contact.y + raw_y, max_y);
        }
    }

    #[test]
    fn test_y_beyond_max_clamps_to_top_edge() {
        let touch = touchpad(1, 1000);
        let sink = RecordingSink::new();
        // Raw Y 0x400 is past max_y
        touch
            .decode(&[0x01, 0x00, 0x40, 0x00, 0x00, 0x10], &sink)
            .unwrap();
        match sink.events()[0] {
            InputEvent::Contact {
                contact: Some(c), ..
            } => assert_eq!(c.y, 0),
            other => panic!("Expected a contact, got {:?}", other),
        }
    }

    #[test]
    fn test_status_bits_for_many_fingers() {
        let touch = touchpad(5, 1000);
        let sink = RecordingSink::new();
        // slot 4 lives in the second status byte, slot 1 reports state 2
        let mut data = vec![0b0000_1000, 0b0000_0001];
        data.extend_from_slice(&[0u8; 25]);
        data[2 + 4 * 5 + 4] = 0x33;

        touch.decode(&data, &sink).unwrap();

        let present: Vec<u8> = sink
            .events()
            .iter()
            .filter_map(|e| match e {
                InputEvent::Contact {
                    slot,
                    contact: Some(c),
                } => {
                    assert_eq!(c.pressure, 0x33);
                    Some(*slot)
                }
                _ => None,
            })
            .collect();
        assert_eq!(present, vec![4]);
    }

    #[test]
    fn test_decode_truncated() {
        let touch = touchpad(2, 1000);
        let sink = RecordingSink::new();
        let err = touch.decode(&[0x01; 10], &sink).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                function: F11,
                expected: 11,
                actual: 10
            }
        );
        assert!(sink.events().is_empty());
    }
}
