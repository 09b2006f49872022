//! Page Description Table scanner
//!
//! Every page carries a table of function entries growing downward from
//! offset 0xe9. A page's table ends at the first entry whose function number
//! is 0x00 or 0xff; the scan ends at the first page without any function.

use rmi4_transport::protocol::{page_base, pdt, MAX_PAGE};
use rmi4_transport::{RegisterAccess, TransportError};
use tracing::{debug, error, info};

use crate::error::DeviceError;
use crate::function::{FunctionDescriptor, RawPdtEntry, F11, F30};

/// Functions retained after a PDT scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionRegistry {
    /// 2D sensor (F11)
    pub touch: Option<FunctionDescriptor>,
    /// GPIO / button controller (F30)
    pub buttons: Option<FunctionDescriptor>,
    /// Interrupt sources claimed by all functions, recognized or not
    pub interrupt_count: u8,
}

impl FunctionRegistry {
    /// Look up a retained function by number
    pub fn get(&self, function_number: u8) -> Option<&FunctionDescriptor> {
        match function_number {
            F11 => self.touch.as_ref(),
            F30 => self.buttons.as_ref(),
            _ => None,
        }
    }

    /// Union of the retained functions' interrupt masks
    pub fn irq_mask(&self) -> u32 {
        self.touch
            .iter()
            .chain(self.buttons.iter())
            .fold(0, |mask, f| mask | f.irq_mask)
    }

    fn register(&mut self, descriptor: FunctionDescriptor) {
        match descriptor.function_number {
            F11 => self.touch = Some(descriptor),
            F30 => self.buttons = Some(descriptor),
            _ => {}
        }
    }
}

/// PDT entry addresses of one page, highest first
fn entry_addresses(page: u8) -> impl Iterator<Item = u16> {
    let base = page_base(page);
    (pdt::END_SCAN_LOCATION..=pdt::START_SCAN_LOCATION)
        .rev()
        .step_by(pdt::ENTRY_SIZE as usize)
        .map(move |offset| base | offset)
}

/// Walk the PDT and collect the recognized functions
///
/// Any read failure aborts the scan.
pub fn scan<R: RegisterAccess + ?Sized>(regs: &R) -> Result<FunctionRegistry, DeviceError> {
    info!("Scanning PDT...");
    let mut registry = FunctionRegistry::default();
    let mut interrupt: u8 = 0;

    for page in 0..=MAX_PAGE {
        let mut page_has_function = false;

        for addr in entry_addresses(page) {
            let bytes = regs.read_block(addr, RawPdtEntry::SIZE).map_err(|source| {
                error!("Read of PDT entry at 0x{:04X} failed: {}", addr, source);
                DeviceError::Discovery { addr, source }
            })?;
            let Some(entry) = RawPdtEntry::parse(&bytes) else {
                return Err(DeviceError::Discovery {
                    addr,
                    source: TransportError::ShortReport {
                        expected: RawPdtEntry::SIZE,
                        actual: bytes.len(),
                    },
                });
            };

            if pdt::is_end_of_table(entry.function_number) {
                break;
            }
            page_has_function = true;

            info!("Found F{:02X} on page 0x{:02X}", entry.function_number, page);
            let descriptor = FunctionDescriptor::from_pdt(&entry, page, interrupt);
            debug!("{:02X?}", descriptor);
            registry.register(descriptor);
            interrupt = interrupt.saturating_add(entry.interrupt_source_count());
        }

        if !page_has_function {
            break;
        }
    }

    registry.interrupt_count = interrupt;
    info!("Done with PDT scan");
    Ok(registry)
}
