//! Status replies (type bytes 0x23-0x2F)

use std::fmt;

pub const STATUS_FIRST: u8 = 0x23;
pub const STATUS_LAST: u8 = 0x2F;

pub const DATA_LOAD_COMPLETED: u8 = 0x23;
pub const DATA_LOAD_ERROR: u8 = 0x24;

/// A status reply from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    pub code: u8,
}

/// Classification of a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// DATA LOAD COMPLETED
    Ack,
    /// DATA LOAD ERROR
    Nak,
    /// Any other code in the status range, passed through as-is
    Error(u8),
}

impl Status {
    pub const ACK: Status = Status {
        code: DATA_LOAD_COMPLETED,
    };
    pub const NAK: Status = Status {
        code: DATA_LOAD_ERROR,
    };

    /// True if `type_byte` falls in the status range
    pub fn is_status_byte(type_byte: u8) -> bool {
        (STATUS_FIRST..=STATUS_LAST).contains(&type_byte)
    }

    pub fn kind(&self) -> StatusKind {
        match self.code {
            DATA_LOAD_COMPLETED => StatusKind::Ack,
            DATA_LOAD_ERROR => StatusKind::Nak,
            code => StatusKind::Error(code),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.kind() == StatusKind::Ack
    }

    /// Name from the device's MIDI implementation chart, if the code is listed there
    pub fn description(&self) -> Option<&'static str> {
        match self.code {
            0x23 => Some("data load completed"),
            0x24 => Some("data load error"),
            0x26 => Some("data format error"),
            0x27 => Some("user data size error"),
            0x28 => Some("user data CRC error"),
            0x29 => Some("user target error"),
            0x2A => Some("user API error"),
            0x2B => Some("user load size error"),
            0x2C => Some("user module error"),
            0x2D => Some("user slot error"),
            0x2E => Some("user format error"),
            0x2F => Some("user internal error"),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(desc) => write!(f, "0x{:02X} ({})", self.code, desc),
            None => write!(f, "0x{:02X}", self.code),
        }
    }
}
