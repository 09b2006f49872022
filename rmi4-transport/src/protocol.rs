//! Protocol constants and utilities for RMI4-over-HID communication

use std::fmt;

/// HID report IDs used by the RMI4 HID transport
pub mod report_id {
    /// Mouse emulation report (device fell back to legacy mode)
    pub const MOUSE: u8 = 0x01;
    /// Register write output report (page select and register writes)
    pub const WRITE: u8 = 0x09;
    /// Read request output report: address + length
    pub const READ_ADDR: u8 = 0x0a;
    /// Read data input report: count + data
    pub const READ_DATA: u8 = 0x0b;
    /// Attention input report: interrupt sources + function payloads
    pub const ATTN: u8 = 0x0c;
    /// Mode select feature report
    pub const SET_RMI_MODE: u8 = 0x0f;

    /// Get human-readable name for a report ID
    pub fn name(id: u8) -> &'static str {
        match id {
            MOUSE => "MOUSE",
            WRITE => "WRITE",
            READ_ADDR => "READ_ADDR",
            READ_DATA => "READ_DATA",
            ATTN => "ATTN",
            SET_RMI_MODE => "SET_RMI_MODE",
            _ => "UNKNOWN",
        }
    }
}

/// Reporting mode selected through the mode-select feature report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RmiMode {
    /// RMI reporting disabled, device behaves as a plain HID mouse
    Off = 0,
    /// Attention reports with packed function data
    AttnReports = 1,
    /// Attention reports without packing
    NoPackedAttnReports = 2,
}

impl RmiMode {
    /// Wire value for the mode-select report
    pub fn wire(self) -> u8 {
        self as u8
    }

    /// Convert from wire value
    pub fn from_wire(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(Self::Off),
            1 => Some(Self::AttnReports),
            2 => Some(Self::NoPackedAttnReports),
            _ => None,
        }
    }
}

impl fmt::Display for RmiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::AttnReports => "attention",
            Self::NoPackedAttnReports => "attention-no-pack",
        })
    }
}

/// Register address of the page select register (present on every page)
pub const PAGE_SELECT_REGISTER: u8 = 0xff;

/// Number of registers in one page
pub const PAGE_SIZE: u16 = 0x0100;

/// Highest page number in the 16-bit address space
pub const MAX_PAGE: u8 = 0xff;

/// Page holding a 16-bit register address
pub fn page(addr: u16) -> u8 {
    (addr >> 8) as u8
}

/// First register address of a page
pub fn page_base(page: u8) -> u16 {
    u16::from(page) << 8
}

/// Page Description Table layout
pub mod pdt {
    /// First (highest) entry offset within a page; the scan walks downward
    pub const START_SCAN_LOCATION: u16 = 0x00e9;
    /// Last (lowest) entry offset within a page
    pub const END_SCAN_LOCATION: u16 = 0x0005;
    /// Size of one PDT entry in bytes
    pub const ENTRY_SIZE: u16 = 6;

    /// Function number 0x00 or 0xff terminates the table on a page
    pub fn is_end_of_table(function_number: u8) -> bool {
        function_number == 0x00 || function_number == 0xff
    }
}

/// Default report sizes (including the report ID byte)
pub mod report_size {
    /// Default size of the attention/read-data input report
    pub const DEFAULT_INPUT: usize = 30;
    /// Default size of the write/read-address output report
    pub const DEFAULT_OUTPUT: usize = 21;
    /// Smallest usable output report (read-address frame)
    pub const MIN_OUTPUT: usize = 6;
    /// Smallest usable input report (report ID + count + one byte)
    pub const MIN_INPUT: usize = 3;
}

/// Register read timing
pub mod timing {
    /// Number of read request attempts before giving up
    pub const READ_RETRIES: usize = 5;
    /// Time to wait for each read-data report (ms)
    pub const READ_TIMEOUT_MS: u64 = 1000;
}
