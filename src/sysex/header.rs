//! Exclusive header shared by all Korg logue-format messages

use crate::error::DecodeError;

pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;
pub const KORG_ID: u8 = 0x42;
pub const UNIVERSAL_NON_REALTIME: u8 = 0x7E;
pub const SEARCH_DEVICE: u8 = 0x50;

/// Format id nibble carried in the byte after the manufacturer id (`3g`)
const FORMAT_NIBBLE: u8 = 0x30;

/// `F0 42 3g ee ee ee`: framing, manufacturer, channel, family extended id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SysexHeader {
    /// Global MIDI channel (0-15)
    pub channel: u8,
    /// Family-specific extended id, e.g. `00 01 73` for the NTS-1 mkII
    pub extended_id: [u8; 3],
}

impl SysexHeader {
    /// Encoded size, including the leading F0
    pub const LEN: usize = 6;

    pub fn new(channel: u8, extended_id: [u8; 3]) -> Self {
        Self {
            channel: channel & 0x0F,
            extended_id,
        }
    }

    /// Header bytes including F0
    pub fn bytes(&self) -> [u8; Self::LEN] {
        let [a, b, c] = self.extended_id;
        [
            SYSEX_START,
            KORG_ID,
            FORMAT_NIBBLE | (self.channel & 0x0F),
            a,
            b,
            c,
        ]
    }

    /// Validate the header of a frame body (everything after F0).
    ///
    /// Replies from any channel are accepted since the device answers on its
    /// global channel; the manufacturer, format nibble and extended id must match.
    pub(crate) fn check(&self, body: &[u8]) -> Result<(), DecodeError> {
        if body.len() < Self::LEN - 1 {
            return Err(DecodeError::TruncatedMessage {
                kind: "exclusive header",
                expected: Self::LEN - 1,
                actual: body.len(),
            });
        }
        if body[0] != KORG_ID {
            return Err(DecodeError::HeaderMismatch(format!(
                "manufacturer 0x{:02X}",
                body[0]
            )));
        }
        if body[1] & 0xF0 != FORMAT_NIBBLE {
            return Err(DecodeError::HeaderMismatch(format!(
                "format byte 0x{:02X}",
                body[1]
            )));
        }
        if body[2..5] != self.extended_id {
            return Err(DecodeError::HeaderMismatch(format!(
                "extended id {:02X?}, expected {:02X?}",
                &body[2..5],
                self.extended_id
            )));
        }
        Ok(())
    }
}
