//! Sysex protocol engine and librarian for Korg logue devices
//!
//! Layers, leaves first: [`codec`] (7-bit packing), [`sysex`] (message
//! model), [`packetizer`] (chunked USER SLOT DATA transfers), [`session`]
//! (single-flight request/response over a [`transport::Transport`]) and
//! [`device`] (per-family slot layout and operations).

pub mod cli;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod packetizer;
pub mod paths;
pub mod preset;
pub mod session;
pub mod sysex;
pub mod transport;

pub use device::{Device, DeviceFamily, ModuleCategory};
pub use error::{Error, Result};
pub use session::Session;
pub use sysex::SysexMessage;
