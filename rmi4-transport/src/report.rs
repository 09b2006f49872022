//! Fixed HID report layouts used by the RMI4 protocol
//!
//! Every exchange is discriminated by the report ID in byte 0:
//!
//! ```text
//! write (out):         [09][count][addrLo][addrHi][data...]
//!   page select:       [09][01][FF][00][page]
//! read-address (out):  [0A][00][addrLo][addrHi][lenLo][lenHi]
//! read-data (in):      [0B][count][data...]
//! attention (in):      [0C][irq bitmap][function payloads...]
//! mode-select (feat):  [0F][mode]
//! mouse (in):          [01][buttons...]   buttons == 0 → legacy fallback
//! ```
//!
//! The codec only checks lengths. Output frames are zero-padded to the
//! device's output report size.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::TransportError;
use crate::protocol::{report_id, RmiMode, PAGE_SELECT_REGISTER};

/// Bytes preceding register data in a write frame
pub const WRITE_HEADER_LEN: usize = 4;

/// Bytes preceding returned data in a read-data report
pub const READ_DATA_HEADER_LEN: usize = 2;

/// Read-address output frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ReadAddressFrame {
    report_id: u8,
    /// Obsolete one-byte read count, always zero
    legacy_count: u8,
    addr_lo: u8,
    addr_hi: u8,
    len_lo: u8,
    len_hi: u8,
}

impl ReadAddressFrame {
    pub fn new(addr: u16, len: u16) -> Self {
        let [addr_lo, addr_hi] = addr.to_le_bytes();
        let [len_lo, len_hi] = len.to_le_bytes();
        Self {
            report_id: report_id::READ_ADDR,
            legacy_count: 0,
            addr_lo,
            addr_hi,
            len_lo,
            len_hi,
        }
    }

    pub fn addr(&self) -> u16 {
        u16::from_le_bytes([self.addr_lo, self.addr_hi])
    }

    pub fn len(&self) -> u16 {
        u16::from_le_bytes([self.len_lo, self.len_hi])
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse a read-address frame from an output report
    pub fn parse(report: &[u8]) -> Option<Self> {
        let (frame, _) = Self::read_from_prefix(report).ok()?;
        (frame.report_id == report_id::READ_ADDR).then_some(frame)
    }
}

/// Page-select write frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct PageSelectFrame {
    report_id: u8,
    count: u8,
    register: u8,
    _reserved: u8,
    page: u8,
}

impl PageSelectFrame {
    pub fn new(page: u8) -> Self {
        Self {
            report_id: report_id::WRITE,
            count: 1,
            register: PAGE_SELECT_REGISTER,
            _reserved: 0,
            page,
        }
    }

    pub fn page(&self) -> u8 {
        self.page
    }

    /// Parse a page-select frame from an output report
    pub fn parse(report: &[u8]) -> Option<Self> {
        let (frame, _) = Self::read_from_prefix(report).ok()?;
        (frame.report_id == report_id::WRITE
            && frame.count == 1
            && frame.register == PAGE_SELECT_REGISTER)
            .then_some(frame)
    }
}

/// Zero-pad a frame to the output report size
fn padded(frame: &[u8], output_size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; output_size.max(frame.len())];
    buf[..frame.len()].copy_from_slice(frame);
    buf
}

/// Build a read request for `len` bytes starting at `addr`
pub fn build_read_request(addr: u16, len: u16, output_size: usize) -> Vec<u8> {
    padded(ReadAddressFrame::new(addr, len).as_bytes(), output_size)
}

/// Build a page-select write
pub fn build_set_page(page: u8, output_size: usize) -> Vec<u8> {
    padded(PageSelectFrame::new(page).as_bytes(), output_size)
}

/// Build a register write of `data` starting at `addr`
pub fn build_write(addr: u16, data: &[u8], output_size: usize) -> Result<Vec<u8>, TransportError> {
    let max = output_size.saturating_sub(WRITE_HEADER_LEN).min(u8::MAX as usize);
    if data.len() > max {
        return Err(TransportError::PayloadTooLarge {
            len: data.len(),
            max,
        });
    }
    let [addr_lo, addr_hi] = addr.to_le_bytes();
    let mut buf = vec![0u8; output_size.max(WRITE_HEADER_LEN)];
    buf[0] = report_id::WRITE;
    buf[1] = data.len() as u8;
    buf[2] = addr_lo;
    buf[3] = addr_hi;
    buf[WRITE_HEADER_LEN..WRITE_HEADER_LEN + data.len()].copy_from_slice(data);
    Ok(buf)
}

/// Build the mode-select feature report
pub fn build_set_mode(mode: RmiMode) -> [u8; 2] {
    [report_id::SET_RMI_MODE, mode.wire()]
}

/// Payload of a read-data report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadData<'a> {
    /// Byte count claimed by the device
    pub count: u8,
    /// Returned bytes, clipped to what the report actually carries
    pub data: &'a [u8],
}

impl<'a> ReadData<'a> {
    pub fn parse(report: &'a [u8]) -> Result<Self, TransportError> {
        if report.len() < READ_DATA_HEADER_LEN {
            return Err(TransportError::ShortReport {
                expected: READ_DATA_HEADER_LEN,
                actual: report.len(),
            });
        }
        let count = report[1];
        let end = (READ_DATA_HEADER_LEN + count as usize).min(report.len());
        Ok(Self {
            count,
            data: &report[READ_DATA_HEADER_LEN..end],
        })
    }
}

/// Attention report: interrupt-source bitmap plus concatenated function data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attention<'a> {
    pub irq: u8,
    pub payload: &'a [u8],
}

impl<'a> Attention<'a> {
    pub fn parse(report: &'a [u8]) -> Result<Self, TransportError> {
        if report.len() < 2 {
            return Err(TransportError::ShortReport {
                expected: 2,
                actual: report.len(),
            });
        }
        Ok(Self {
            irq: report[1],
            payload: &report[2..],
        })
    }
}

/// Inbound report classified by report ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundReport<'a> {
    /// Read-data report, kept raw so the transport can buffer it whole
    ReadData(&'a [u8]),
    Attention(Attention<'a>),
    /// Mouse emulation report; `legacy` is set when the marker byte is zero
    MouseEmulation { legacy: bool },
    /// Any other report ID
    Other(u8),
}

/// Classify a raw inbound report. Returns `None` for empty or malformed reports.
pub fn classify(report: &[u8]) -> Option<InboundReport<'_>> {
    let id = *report.first()?;
    let parsed = match id {
        report_id::READ_DATA => InboundReport::ReadData(report),
        report_id::ATTN => InboundReport::Attention(Attention::parse(report).ok()?),
        report_id::MOUSE => InboundReport::MouseEmulation {
            legacy: report.get(1) == Some(&0),
        },
        other => InboundReport::Other(other),
    };
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_layout() {
        let buf = build_read_request(0x12e9, 0x0106, 21);
        assert_eq!(buf.len(), 21);
        assert_eq!(&buf[..6], &[0x0a, 0x00, 0xe9, 0x12, 0x06, 0x01]);
        assert!(buf[6..].iter().all(|&b| b == 0));

        let frame = ReadAddressFrame::parse(&buf).unwrap();
        assert_eq!(frame.addr(), 0x12e9);
        assert_eq!(frame.len(), 0x0106);
    }

    #[test]
    fn test_set_page_layout() {
        let buf = build_set_page(0x03, 21);
        assert_eq!(&buf[..5], &[0x09, 0x01, 0xff, 0x00, 0x03]);
        assert_eq!(PageSelectFrame::parse(&buf).map(|f| f.page()), Some(3));
        // A read request is not a page select
        assert!(PageSelectFrame::parse(&build_read_request(0, 1, 21)).is_none());
    }

    #[test]
    fn test_write_layout_and_capacity() {
        let buf = build_write(0x0045, &[0xaa, 0xbb], 8).unwrap();
        assert_eq!(buf, vec![0x09, 0x02, 0x45, 0x00, 0xaa, 0xbb, 0x00, 0x00]);

        let err = build_write(0x0045, &[0u8; 5], 8).unwrap_err();
        assert!(matches!(err, TransportError::PayloadTooLarge { len: 5, max: 4 }));
    }

    #[test]
    fn test_set_mode() {
        assert_eq!(build_set_mode(RmiMode::AttnReports), [0x0f, 0x01]);
        assert_eq!(build_set_mode(RmiMode::Off), [0x0f, 0x00]);
    }

    #[test]
    fn test_read_data_clips_to_report() {
        let report = [0x0b, 0x04, 0x11, 0x22, 0x33, 0x44, 0x55];
        let rd = ReadData::parse(&report).unwrap();
        assert_eq!(rd.count, 4);
        assert_eq!(rd.data, &[0x11, 0x22, 0x33, 0x44]);

        // Count larger than the report carries
        let short = [0x0b, 0x09, 0x11];
        assert_eq!(ReadData::parse(&short).unwrap().data, &[0x11]);

        assert!(ReadData::parse(&[0x0b]).is_err());
    }

    #[test]
    fn test_classify() {
        assert!(classify(&[]).is_none());
        assert!(matches!(
            classify(&[0x0b, 0x01, 0x42]),
            Some(InboundReport::ReadData(_))
        ));
        match classify(&[0x0c, 0x05, 0xde, 0xad]) {
            Some(InboundReport::Attention(attn)) => {
                assert_eq!(attn.irq, 0x05);
                assert_eq!(attn.payload, &[0xde, 0xad]);
            }
            other => panic!("Expected Attention, got {:?}", other),
        }
        assert!(classify(&[0x0c]).is_none());
        assert_eq!(
            classify(&[0x01, 0x00, 0x00]),
            Some(InboundReport::MouseEmulation { legacy: true })
        );
        assert_eq!(
            classify(&[0x01, 0x01]),
            Some(InboundReport::MouseEmulation { legacy: false })
        );
        assert_eq!(classify(&[0x42, 0x00]), Some(InboundReport::Other(0x42)));
    }
}
