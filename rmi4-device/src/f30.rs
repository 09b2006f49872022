//! F30: GPIO / LED controller
//!
//! Physical buttons are GPIO lines configured as inputs. The line's level at
//! populate time is its idle level, so a pull-up button reads 1 when released.

use rmi4_transport::{RegisterAccess, TransportError};
use tracing::{debug, warn};

use crate::dispatch::FunctionHandler;
use crate::error::{DecodeError, DeviceError};
use crate::events::{InputEvent, InputSink};
use crate::function::{FunctionDescriptor, F30};

const HAS_LED: u8 = 1 << 2;
const HAS_GPIO: u8 = 1 << 3;
const GPIO_LED_COUNT: u8 = 0x1f;

fn bit(bytes: &[u8], line: usize) -> bool {
    bytes
        .get(line / 8)
        .is_some_and(|byte| (byte >> (line % 8)) & 1 != 0)
}

/// Populated button controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonFunction {
    pub descriptor: FunctionDescriptor,
    /// Total GPIO/LED lines
    pub line_count: u8,
    /// Lines that are buttons
    pub button_mask: u32,
    /// Idle level of each button line
    pub button_state_mask: u32,
}

/// Read F30's query registers and the direction/data control registers
pub fn populate<R: RegisterAccess + ?Sized>(
    regs: &R,
    mut descriptor: FunctionDescriptor,
) -> Result<ButtonFunction, DeviceError> {
    let populate_err = |register: &'static str| {
        move |source: TransportError| {
            warn!("F30: can not read {}: {}", register, source);
            DeviceError::Populate {
                function: F30,
                register,
                source,
            }
        }
    };

    let query = regs
        .read_block(descriptor.query_base_addr, 2)
        .map_err(populate_err("query registers"))?;
    let (q0, q1) = match query[..] {
        [q0, q1, ..] => (q0, q1),
        _ => (0, 0),
    };
    let has_gpio = q0 & HAS_GPIO != 0;
    let has_led = q0 & HAS_LED != 0;
    let line_count = q1 & GPIO_LED_COUNT;

    let bytes_per_ctrl = usize::from(line_count).div_ceil(8);
    // ctrl 0 exists only with both GPIOs and LEDs; ctrl 1 always does
    let ctrl0_len = if has_gpio && has_led { bytes_per_ctrl } else { 0 };
    let ctrl2_offset = ctrl0_len + bytes_per_ctrl;
    descriptor.report_size = bytes_per_ctrl;

    let ctrl = regs
        .read_block(
            descriptor.control_base_addr + ctrl2_offset as u16,
            2 * bytes_per_ctrl,
        )
        .map_err(populate_err("control 2 and 3"))?;
    let (direction, data) = ctrl.split_at(bytes_per_ctrl.min(ctrl.len()));

    let mut button_mask = 0u32;
    let mut button_state_mask = 0u32;
    for line in 0..usize::from(line_count) {
        if !bit(direction, line) {
            button_mask |= 1 << line;
            if bit(data, line) {
                button_state_mask |= 1 << line;
            }
        }
    }

    debug!(
        "F30: {} lines, button mask 0x{:08X}, idle levels 0x{:08X}",
        line_count, button_mask, button_state_mask
    );

    Ok(ButtonFunction {
        descriptor,
        line_count,
        button_mask,
        button_state_mask,
    })
}

impl ButtonFunction {
    pub fn report_size(&self) -> usize {
        self.descriptor.report_size
    }

    pub fn button_count(&self) -> u8 {
        self.button_mask.count_ones() as u8
    }
}

impl FunctionHandler for ButtonFunction {
    fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    fn decode(&self, data: &[u8], sink: &dyn InputSink) -> Result<(), DecodeError> {
        if data.len() < self.report_size() {
            return Err(DecodeError::Truncated {
                function: F30,
                expected: self.report_size(),
                actual: data.len(),
            });
        }

        let mut index = 0u8;
        for line in 0..usize::from(self.line_count) {
            if self.button_mask & (1 << line) == 0 {
                continue;
            }
            let idle = self.button_state_mask & (1 << line) != 0;
            sink.emit(InputEvent::Button {
                index,
                pressed: bit(data, line) ^ idle,
            });
            index += 1;
        }
        sink.emit(InputEvent::Sync);
        Ok(())
    }
}
