//! Duplex byte channel abstraction
//!
//! The session layer only needs to send complete sysex frames and receive
//! complete inbound messages with a timeout. Hardware ports (via midir) and
//! an in-memory channel pair implement the same trait.

pub mod channel;
pub mod midi_port;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::TransportError;

pub use channel::ChannelTransport;
pub use midi_port::MidiPortTransport;

/// A bidirectional channel carrying whole MIDI messages
#[async_trait]
pub trait Transport: Send {
    /// Send one complete message
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next inbound message
    async fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Shortened hex dump for large frames
pub fn format_hex_brief(data: &[u8]) -> String {
    const HEAD: usize = 16;
    if data.len() <= HEAD * 2 {
        return format_hex(data);
    }
    format!(
        "{} ... {} ({} bytes)",
        format_hex(&data[..HEAD]),
        format_hex(&data[data.len() - 4..]),
        data.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0xF0, 0x42, 0x30, 0xF7]), "F0 42 30 F7");
        assert_eq!(format_hex(&[]), "");
    }

    #[test]
    fn test_format_hex_brief() {
        let data: Vec<u8> = (0..100).collect();
        let brief = format_hex_brief(&data);
        assert!(brief.starts_with("00 01 02"));
        assert!(brief.ends_with("(100 bytes)"));
        assert_eq!(format_hex_brief(&[0x01, 0x02]), "01 02");
    }
}
