//! Device layer error types

use rmi4_transport::TransportError;
use thiserror::Error;

/// Errors from device initialization and control
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A PDT entry could not be read; the scan is abandoned
    #[error("Read of PDT entry at 0x{addr:04X} failed: {source}")]
    Discovery {
        addr: u16,
        #[source]
        source: TransportError,
    },

    /// A required function or feature is missing
    #[error("Missing capability: {0}")]
    Capability(String),

    /// A query or control register of a function could not be read
    #[error("F{function:02X}: can not read {register}: {source}")]
    Populate {
        function: u8,
        register: &'static str,
        #[source]
        source: TransportError,
    },

    /// `initialize` called on a device that is already running
    #[error("Device already started")]
    AlreadyStarted,
}

/// Errors from decoding a function's slice of an attention report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("F{function:02X} data truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        function: u8,
        expected: usize,
        actual: usize,
    },
}
