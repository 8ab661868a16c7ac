//! Hardware MIDI transport backed by midir
//!
//! Ports are matched by case-insensitive substring so that platform-specific
//! suffixes ("NTS-1 digital kit MIDI 1", "NTS-1 digital kit:0") still resolve.

use async_trait::async_trait;
use midir::{Ignore, MidiIO, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use super::{format_hex_brief, Transport};
use crate::error::TransportError;

const CLIENT_NAME: &str = "logue-librarian";
const INBOUND_CAPACITY: usize = 1000;

/// An open input/output port pair
pub struct MidiPortTransport {
    // Held to keep the input callback alive
    _input_conn: MidiInputConnection<()>,
    output_conn: MidiOutputConnection,
    inbound: mpsc::Receiver<Vec<u8>>,
    input_name: String,
    output_name: String,
}

// The connections are only touched through `&mut self`, never shared
unsafe impl Send for MidiPortTransport {}

impl std::fmt::Debug for MidiPortTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiPortTransport")
            .field("input", &self.input_name)
            .field("output", &self.output_name)
            .finish()
    }
}

fn port_error(context: &str, err: impl std::fmt::Display) -> TransportError {
    TransportError::Port(format!("{}: {}", context, err))
}

impl MidiPortTransport {
    /// Open the first input and output ports whose names contain the given patterns
    pub fn open(input_pattern: &str, output_pattern: &str) -> Result<Self, TransportError> {
        info!(
            "Opening MIDI ports - Input: '{}', Output: '{}'",
            input_pattern, output_pattern
        );

        let mut midi_in = MidiInput::new(&format!("{}-input", CLIENT_NAME))
            .map_err(|e| port_error("failed to create MIDI input", e))?;
        // Sysex is filtered by default
        midi_in.ignore(Ignore::None);

        debug!("Found {} MIDI input ports", midi_in.port_count());

        let (in_port, in_name) = find_port(named_ports(&midi_in), input_pattern)
            .ok_or_else(|| TransportError::Port(format!("input port '{}' not found", input_pattern)))?;

        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let input_conn = midi_in
            .connect(
                &in_port,
                CLIENT_NAME,
                move |_timestamp, data, _| {
                    // Never block the driver thread
                    if tx.try_send(data.to_vec()).is_err() {
                        debug!("Inbound queue full, dropped {} bytes", data.len());
                    }
                },
                (),
            )
            .map_err(|e| port_error("failed to connect input port", e))?;

        info!("Connected to input port: {}", in_name);

        let midi_out = MidiOutput::new(&format!("{}-output", CLIENT_NAME))
            .map_err(|e| port_error("failed to create MIDI output", e))?;

        debug!("Found {} MIDI output ports", midi_out.port_count());

        let (out_port, out_name) = find_port(named_ports(&midi_out), output_pattern)
            .ok_or_else(|| {
                TransportError::Port(format!("output port '{}' not found", output_pattern))
            })?;

        let output_conn = midi_out
            .connect(&out_port, CLIENT_NAME)
            .map_err(|e| port_error("failed to connect output port", e))?;

        info!("Connected to output port: {}", out_name);

        Ok(Self {
            _input_conn: input_conn,
            output_conn,
            inbound,
            input_name: in_name,
            output_name: out_name,
        })
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }
}

#[async_trait]
impl Transport for MidiPortTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.output_conn
            .send(bytes)
            .map_err(|e| port_error("failed to send MIDI message", e))?;
        trace!("Wrote {}", format_hex_brief(bytes));
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

/// Every port of `io` that reports a name
fn named_ports<IO: MidiIO>(io: &IO) -> Vec<(IO::Port, String)> {
    io.ports()
        .into_iter()
        .filter_map(|port| io.port_name(&port).ok().map(|name| (port, name)))
        .collect()
}

/// First port whose name contains `pattern`, ignoring case
fn find_port<P>(ports: Vec<(P, String)>, pattern: &str) -> Option<(P, String)> {
    let pattern = pattern.to_lowercase();
    let found = ports
        .into_iter()
        .find(|(_, name)| name.to_lowercase().contains(&pattern));
    if let Some((_, name)) = &found {
        debug!("Found port '{}' matching pattern '{}'", name, pattern);
    }
    found
}

/// Port enumeration helpers
pub mod discovery {
    use super::*;

    /// Information about a MIDI port
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PortInfo {
        pub name: String,
        pub is_virtual: bool,
    }

    impl PortInfo {
        fn new(name: String) -> Self {
            let is_virtual = is_virtual_name(&name);
            Self { name, is_virtual }
        }
    }

    pub(crate) fn is_virtual_name(name: &str) -> bool {
        name.contains("Virtual")
            || name.contains("loopMIDI")
            || name.contains("IAC")
            || name.contains("Midi Through")
    }

    fn list<IO: MidiIO>(io: &IO) -> Vec<PortInfo> {
        named_ports(io)
            .into_iter()
            .map(|(_, name)| PortInfo::new(name))
            .collect()
    }

    /// Discover input ports
    pub fn input_ports() -> Result<Vec<PortInfo>, TransportError> {
        let midi_in = MidiInput::new(&format!("{}-discovery", CLIENT_NAME))
            .map_err(|e| port_error("failed to create MIDI input", e))?;
        Ok(list(&midi_in))
    }

    /// Discover output ports
    pub fn output_ports() -> Result<Vec<PortInfo>, TransportError> {
        let midi_out = MidiOutput::new(&format!("{}-discovery", CLIENT_NAME))
            .map_err(|e| port_error("failed to create MIDI output", e))?;
        Ok(list(&midi_out))
    }

    /// Pick the first non-virtual input/output pair matching one of `patterns`
    pub fn find_device_ports(
        inputs: &[PortInfo],
        outputs: &[PortInfo],
        patterns: &[&str],
    ) -> Option<(String, String)> {
        for pattern in patterns {
            let pattern = pattern.to_lowercase();
            let matches = |p: &&PortInfo| !p.is_virtual && p.name.to_lowercase().contains(&pattern);

            if let (Some(inp), Some(out)) = (inputs.iter().find(matches), outputs.iter().find(matches))
            {
                return Some((inp.name.clone(), out.name.clone()));
            }
        }
        None
    }

}
