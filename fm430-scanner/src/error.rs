//! Scanner error types

use std::time::Duration;

use fm430_transport::TransportError;
use thiserror::Error;

use crate::classifier::{Malformed, NoData, ResponseStatus};

/// Argument checks that run before a frame is built
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Tag path is empty")]
    EmptyTagPath,

    #[error("Payload has {payload} entries for a tag path of {path}")]
    PayloadLength { path: usize, payload: usize },

    #[error("Tag and subtag codes must be 3 printable ASCII bytes, got {0:?}")]
    InvalidCode(String),

    #[error("{option}: {value} is outside {min}..={max}")]
    OutOfRange {
        option: String,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("{option}: '{value}' is not one of: {allowed}")]
    NotSanctioned {
        option: String,
        value: String,
        allowed: String,
    },

    #[error("{option}: {len} bytes exceeds the limit of {max}")]
    TooLong {
        option: String,
        len: usize,
        max: usize,
    },

    #[error("{option}: byte 0x{byte:02X} is not printable ASCII")]
    NotPrintable { option: String, byte: u8 },

    #[error("{option}: byte 0x{byte:02X} is a frame delimiter")]
    ReservedByte { option: String, byte: u8 },

    #[error("Frame of {len} bytes exceeds the {max}-byte report")]
    FrameTooLong { len: usize, max: usize },

    #[error("{option}: cannot parse '{value}' as a number")]
    NotANumber { option: String, value: String },

    #[error("{0} takes no argument")]
    UnexpectedArgument(String),

    #[error("{0} requires an argument")]
    MissingArgument(String),
}

/// Errors delivered to callers of the scanner facade
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScannerError {
    /// Device open/write/read failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Argument rejected before anything was sent
    #[error("Invalid argument: {0}")]
    Validation(#[from] ValidationError),

    /// Response frame could not be interpreted
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Data frame with nothing decodable in it
    #[error("Data frame carried no payload")]
    EmptyResponse,

    /// Scanner answered NAK/ENQ for (part of) a command
    #[error("Scanner rejected {code}: {status}")]
    Rejected { code: String, status: ResponseStatus },

    /// No response within the configured window
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// Dropped by `cancel()` or facade shutdown before completion
    #[error("Command cancelled")]
    Cancelled,

    /// Name not present in the option table
    #[error("Unknown option: {0}")]
    UnknownOption(String),
}

impl From<Malformed> for ScannerError {
    fn from(e: Malformed) -> Self {
        ScannerError::Protocol(e.to_string())
    }
}

impl From<NoData> for ScannerError {
    fn from(_: NoData) -> Self {
        ScannerError::EmptyResponse
    }
}
