//! RMI4 function descriptors
//!
//! Each function (a register-mapped sub-device) is announced by a 6-byte
//! entry in the Page Description Table:
//!
//! ```text
//! byte 0  query base      (page relative)
//! byte 1  command base
//! byte 2  control base
//! byte 3  data base
//! byte 4  bits 0-2 interrupt source count, bits 3-4 reserved,
//!         bits 5-6 function version, bit 7 reserved
//! byte 5  function number
//! ```

use rmi4_transport::protocol::page_base;
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// 2D touch sensor
pub const F11: u8 = 0x11;
/// GPIO / LED controller (physical buttons)
pub const F30: u8 = 0x30;

/// Raw PDT entry as it sits in the register space
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawPdtEntry {
    pub query_base: u8,
    pub command_base: u8,
    pub control_base: u8,
    pub data_base: u8,
    interrupt_info: u8,
    pub function_number: u8,
}

impl RawPdtEntry {
    pub const SIZE: usize = 6;

    const INTERRUPT_COUNT_MASK: u8 = 0x07;
    const VERSION_SHIFT: u8 = 5;
    const VERSION_MASK: u8 = 0x03;

    /// Parse an entry from the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        Self::read_from_prefix(bytes).ok().map(|(entry, _)| entry)
    }

    pub fn interrupt_source_count(&self) -> u8 {
        self.interrupt_info & Self::INTERRUPT_COUNT_MASK
    }

    pub fn version(&self) -> u8 {
        (self.interrupt_info >> Self::VERSION_SHIFT) & Self::VERSION_MASK
    }
}

/// Bits `base .. base + count` of the interrupt-source bitmap
pub fn irq_mask(base: u8, count: u8) -> u32 {
    if count == 0 {
        return 0;
    }
    let bits = (1u32 << count) - 1;
    bits.checked_shl(u32::from(base)).unwrap_or(0)
}

/// A discovered function with absolute register addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub function_number: u8,
    pub page: u8,
    pub query_base_addr: u16,
    pub command_base_addr: u16,
    pub control_base_addr: u16,
    pub data_base_addr: u16,
    /// First bit of this function's range in the interrupt-source bitmap
    pub interrupt_base: u8,
    pub interrupt_count: u8,
    /// Bytes this function contributes to an attention report (set by populate)
    pub report_size: usize,
    pub irq_mask: u32,
}

impl FunctionDescriptor {
    /// Build a descriptor from a PDT entry found on `page`
    pub fn from_pdt(entry: &RawPdtEntry, page: u8, interrupt_base: u8) -> Self {
        let base = page_base(page);
        let interrupt_count = entry.interrupt_source_count();
        Self {
            function_number: entry.function_number,
            page,
            query_base_addr: base | u16::from(entry.query_base),
            command_base_addr: base | u16::from(entry.command_base),
            control_base_addr: base | u16::from(entry.control_base),
            data_base_addr: base | u16::from(entry.data_base),
            interrupt_base,
            interrupt_count,
            report_size: 0,
            irq_mask: irq_mask(interrupt_base, interrupt_count),
        }
    }
}
