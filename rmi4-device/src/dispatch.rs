//! Attention report dispatch
//!
//! An attention report carries an interrupt-source bitmap followed by the
//! data of every function that raised an interrupt, packed in discovery
//! order. The dispatcher walks the functions by ascending `interrupt_base`
//! and hands each one its slice.

use rmi4_transport::Attention;
use tracing::{trace, warn};

use crate::error::DecodeError;
use crate::events::InputSink;
use crate::function::FunctionDescriptor;

/// A populated function able to decode its attention payload
pub trait FunctionHandler: Send + Sync {
    fn descriptor(&self) -> &FunctionDescriptor;

    /// Decode one report's worth of data and emit events to `sink`
    fn decode(&self, data: &[u8], sink: &dyn InputSink) -> Result<(), DecodeError>;
}

/// Demultiplexes attention reports to function handlers
pub struct AttentionDispatcher {
    handlers: Vec<Box<dyn FunctionHandler>>,
    /// Interrupt bits that belong to a known function
    known_mask: u32,
}

impl AttentionDispatcher {
    /// Create a dispatcher over `handlers`
    ///
    /// `known_mask` covers every recognized function found by the scan, even
    /// one that failed to populate, so its interrupts are not reported as
    /// unknown.
    pub fn new(mut handlers: Vec<Box<dyn FunctionHandler>>, known_mask: u32) -> Self {
        handlers.sort_by_key(|h| h.descriptor().interrupt_base);
        let known_mask = handlers
            .iter()
            .fold(known_mask, |mask, h| mask | h.descriptor().irq_mask);
        Self {
            handlers,
            known_mask,
        }
    }

    pub fn known_mask(&self) -> u32 {
        self.known_mask
    }

    /// Decode one attention report
    ///
    /// Returns the number of functions that decoded successfully. Decode
    /// failures are logged and the cursor still moves past the function.
    pub fn dispatch(&self, attention: &Attention<'_>, sink: &dyn InputSink) -> usize {
        let irq = u32::from(attention.irq);
        let unknown = irq & !self.known_mask;
        if unknown != 0 {
            warn!("Unknown interrupt source: 0x{:02X}", unknown);
        }

        let payload = attention.payload;
        let mut cursor = 0;
        let mut decoded = 0;

        for handler in &self.handlers {
            let descriptor = handler.descriptor();
            if irq & descriptor.irq_mask == 0 {
                continue;
            }

            let start = cursor.min(payload.len());
            let end = (cursor + descriptor.report_size).min(payload.len());
            trace!(
                "F{:02X} data at {}..{}",
                descriptor.function_number,
                start,
                end
            );
            match handler.decode(&payload[start..end], sink) {
                Ok(()) => decoded += 1,
                Err(e) => warn!("{}", e),
            }
            cursor += descriptor.report_size;
        }

        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{InputEvent, RecordingSink};
    use crate::f11::{self, TouchFunction};
    use crate::f30::ButtonFunction;
    use crate::function::{irq_mask, F11, F30};

    fn descriptor(
        function_number: u8,
        interrupt_base: u8,
        report_size: usize,
    ) -> FunctionDescriptor {
        FunctionDescriptor {
            function_number,
            page: 0,
            query_base_addr: 0,
            command_base_addr: 0,
            control_base_addr: 0,
            data_base_addr: 0,
            interrupt_base,
            interrupt_count: 1,
            report_size,
            irq_mask: irq_mask(interrupt_base, 1),
        }
    }

    fn touch(interrupt_base: u8) -> TouchFunction {
        TouchFunction {
            descriptor: descriptor(F11, interrupt_base, f11::report_size(1)),
            max_fingers: 1,
            max_x: 1000,
            max_y: 1000,
            x_size_mm: None,
            y_size_mm: None,
        }
    }

    fn buttons(interrupt_base: u8) -> ButtonFunction {
        ButtonFunction {
            descriptor: descriptor(F30, interrupt_base, 1),
            line_count: 1,
            button_mask: 1,
            button_state_mask: 1,
        }
    }

    fn finger_at(x_hi: u8) -> [u8; 6] {
        [0x01, x_hi, 0x00, 0x00, 0x00, 0x40]
    }

    fn contact_x(events: &[InputEvent]) -> Option<u16> {
        events.iter().find_map(|e| match e {
            InputEvent::Contact {
                contact: Some(c), ..
            } => Some(c.x),
            _ => None,
        })
    }

    #[test]
    fn test_dispatch_in_interrupt_order() {
        // Buttons registered first but discovered after the touch sensor
        let handlers: Vec<Box<dyn FunctionHandler>> =
            vec![Box::new(buttons(3)), Box::new(touch(2))];
        let dispatcher = AttentionDispatcher::new(handlers, 0);
        assert_eq!(dispatcher.known_mask(), 0x0c);

        let mut payload = finger_at(0x12).to_vec();
        payload.push(0x00);
        let sink = RecordingSink::new();
        let decoded = dispatcher.dispatch(
            &Attention {
                irq: 0x0c,
                payload: &payload,
            },
            &sink,
        );

        assert_eq!(decoded, 2);
        let events = sink.events();
        assert_eq!(contact_x(&events), Some(0x120));
        assert_eq!(
            &events[2..],
            &[
                InputEvent::Button {
                    index: 0,
                    pressed: true
                },
                InputEvent::Sync
            ]
        );
    }

    #[test]
    fn test_unraised_function_takes_no_bytes() {
        let handlers: Vec<Box<dyn FunctionHandler>> =
            vec![Box::new(buttons(2)), Box::new(touch(3))];
        let dispatcher = AttentionDispatcher::new(handlers, 0);
        let sink = RecordingSink::new();
        // Only the touch sensor raised; its data starts at offset 0
        let payload = finger_at(0x07);
        let decoded = dispatcher.dispatch(
            &Attention {
                irq: 0x08,
                payload: &payload,
            },
            &sink,
        );
        assert_eq!(decoded, 1);
        assert_eq!(contact_x(&sink.events()), Some(0x070));
    }

    #[test]
    fn test_unknown_bits_still_decode_known() {
        let handlers: Vec<Box<dyn FunctionHandler>> = vec![Box::new(touch(2))];
        let dispatcher = AttentionDispatcher::new(handlers, 0);
        let sink = RecordingSink::new();
        let payload = finger_at(0x01);
        let decoded = dispatcher.dispatch(
            &Attention {
                irq: 0x04 | 0x81,
                payload: &payload,
            },
            &sink,
        );
        assert_eq!(decoded, 1);
        assert_eq!(contact_x(&sink.events()), Some(0x010));
    }

    #[test]
    fn test_known_mask_includes_unpopulated_functions() {
        let handlers: Vec<Box<dyn FunctionHandler>> = vec![Box::new(touch(2))];
        let dispatcher = AttentionDispatcher::new(handlers, 0x08);
        assert_eq!(dispatcher.known_mask(), 0x0c);
    }

    #[test]
    fn test_truncated_payload_skips_function() {
        let handlers: Vec<Box<dyn FunctionHandler>> =
            vec![Box::new(touch(2)), Box::new(buttons(3))];
        let dispatcher = AttentionDispatcher::new(handlers, 0);
        let sink = RecordingSink::new();
        // Touch data cut short; buttons get nothing left either
        let decoded = dispatcher.dispatch(
            &Attention {
                irq: 0x0c,
                payload: &[0x01, 0x02, 0x03],
            },
            &sink,
        );
        assert_eq!(decoded, 0);
        assert!(sink.events().is_empty());
    }
}
