//! Error taxonomy for the sysex protocol engine
//!
//! Each layer has its own error type so callers can tell transport corruption
//! apart from protocol misunderstandings and device-reported failures.
//! [`Error`] is the device-level umbrella that wraps all of them.

use std::time::Duration;
use thiserror::Error;

use crate::device::ModuleCategory;

/// Malformed 7-bit payload data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("byte 0x{value:02X} at offset {offset} is not 7-bit safe")]
    HighBitSet { offset: usize, value: u8 },

    #[error("7-bit block at offset {offset} has no data bytes")]
    DanglingBlock { offset: usize },
}

/// Failure to interpret a sysex frame as a known message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not a sysex frame")]
    NotSysex,

    #[error("frame does not end with F7")]
    MalformedTerminator,

    #[error("unknown message type 0x{0:02X}")]
    UnknownMessageType(u8),

    #[error("{kind} needs at least {expected} bytes, got {actual}")]
    TruncatedMessage {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("header mismatch: {0}")]
    HeaderMismatch(String),

    #[error("{kind} declares {declared} data bytes but carries {actual}")]
    LengthMismatch {
        kind: &'static str,
        declared: usize,
        actual: usize,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Chunked transfer bookkeeping failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketizerError {
    #[error("sequence gap: expected packet {expected}, got {received}")]
    SequenceGap { expected: u8, received: u8 },

    #[error("max sequence changed from {previous} to {received}")]
    SequenceMismatchMax { previous: u8, received: u8 },

    #[error("transfer of {size} bytes exceeds limit of {limit}")]
    OversizeTransfer { size: usize, limit: usize },

    #[error("packet for module {module} slot {slot} does not belong to this transfer")]
    ForeignPacket { module: u8, slot: u8 },

    #[error("transfer already complete")]
    TransferComplete,

    #[error("transfer was aborted")]
    TransferAborted,

    #[error("packet size limit {0} leaves no room for data")]
    PacketLimitTooSmall(usize),
}

/// Errors raised by a duplex byte channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("receive timed out")]
    Timeout,

    #[error("channel closed")]
    Closed,

    #[error("port error: {0}")]
    Port(String),
}

/// Negative acknowledgement or error status reported by the device.
///
/// The raw status byte is passed through untouched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("device reported status 0x{code:02X}")]
pub struct DeviceError {
    pub code: u8,
}

/// Failures of a single request/response exchange
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("another exchange is already awaiting a reply")]
    SessionBusy,

    #[error("expected reply to {expected}, received {received}")]
    UnexpectedReply {
        expected: &'static str,
        received: &'static str,
    },

    #[error("session state is indeterminate, a device inquiry is required")]
    NeedsResync,

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Packetizer(#[from] PacketizerError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Device-level error returned by [`crate::device::Device`] operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("slot {slot} is out of range for {category} ({count} slots)")]
    InvalidSlot {
        category: ModuleCategory,
        slot: u8,
        count: u8,
    },

    #[error("program {number} is out of range ({count} programs)")]
    InvalidProgram { number: u16, count: u16 },

    #[error("device has not been probed")]
    NotProbed,

    #[error("expected {expected} device, found family 0x{found:04X}")]
    FamilyMismatch { expected: &'static str, found: u16 },

    #[error("user API {found} is not supported (need major version {expected_major})")]
    UnsupportedApi { found: String, expected_major: u8 },

    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),

    #[error("unexpected {0} reply")]
    UnexpectedReply(&'static str),
}

impl Error {
    /// The raw device status code, if the device rejected the request
    pub fn device_code(&self) -> Option<u8> {
        match self {
            Error::Session(SessionError::Device(e)) => Some(e.code),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
