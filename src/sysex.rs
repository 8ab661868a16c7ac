//! Sysex message model
//!
//! Typed representation of every message the librarian exchanges with a
//! logue device, with a canonical encoding and a decoder that dispatches on
//! the leading type byte.

pub mod header;
pub mod status;


use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{self, NAME_WIDTH};
use crate::error::DecodeError;

pub use header::{SysexHeader, KORG_ID, SYSEX_END, SYSEX_START};
pub use status::{Status, StatusKind};

use header::{SEARCH_DEVICE, UNIVERSAL_NON_REALTIME};

/// Logue-format message type bytes
pub mod msg_type {
    pub const GLOBAL_DATA_DUMP_REQUEST: u8 = 0x0E;
    pub const CURRENT_PROGRAM_DATA_DUMP_REQUEST: u8 = 0x10;
    pub const USER_API_VERSION_REQUEST: u8 = 0x17;
    pub const USER_MODULE_INFO_REQUEST: u8 = 0x18;
    pub const USER_SLOT_STATUS_REQUEST: u8 = 0x19;
    pub const USER_SLOT_DATA_REQUEST: u8 = 0x1A;
    pub const CLEAR_USER_SLOT: u8 = 0x1B;
    pub const PROGRAM_DATA_DUMP_REQUEST: u8 = 0x1C;
    pub const CLEAR_USER_MODULE: u8 = 0x1D;
    pub const SWAP_USER_DATA: u8 = 0x1E;
    pub const CURRENT_PROGRAM_DATA_DUMP: u8 = 0x40;
    pub const CURRENT_PROGRAM_CHANGED: u8 = 0x41;
    pub const USER_API_VERSION: u8 = 0x47;
    pub const USER_MODULE_INFO: u8 = 0x48;
    pub const USER_SLOT_STATUS: u8 = 0x49;
    pub const USER_SLOT_DATA: u8 = 0x4A;
    pub const PROGRAM_DATA_DUMP: u8 = 0x4C;
    pub const GLOBAL_DATA_DUMP: u8 = 0x51;
}

use msg_type::*;

/// Device identification block shared by inquiry and search replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceVersion {
    pub family: u16,
    pub member: u16,
    pub minor: u16,
    pub major: u16,
}

impl DeviceVersion {
    const WIRE_LEN: usize = 8;

    fn write(&self, out: &mut Vec<u8>) {
        for value in [self.family, self.member, self.minor, self.major] {
            out.extend_from_slice(&codec::split14(value));
        }
    }

    fn read(bytes: &[u8]) -> Self {
        Self {
            family: codec::join14(bytes[0], bytes[1]),
            member: codec::join14(bytes[2], bytes[3]),
            minor: codec::join14(bytes[4], bytes[5]),
            major: codec::join14(bytes[6], bytes[7]),
        }
    }
}

/// User API / unit version packed as `0x00MMmmpp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApiVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl ApiVersion {
    pub fn from_u32(value: u32) -> Self {
        Self {
            major: (value >> 16) as u8,
            minor: (value >> 8) as u8,
            patch: value as u8,
        }
    }

    pub fn to_u32(self) -> u32 {
        ((self.major as u32) << 16) | ((self.minor as u32) << 8) | self.patch as u32
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}-{}", self.major, self.minor, self.patch)
    }
}

/// Capacity information for one module category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub module: u8,
    pub max_program_size: u32,
    pub max_load_size: u32,
    pub slot_count: u32,
}

/// Metadata of a unit loaded into a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotContents {
    pub dev_id: u32,
    pub unit_id: u32,
    pub version: u32,
    pub name: String,
}

impl SlotContents {
    const WIRE_LEN: usize = 12 + NAME_WIDTH;

    pub fn unit_version(&self) -> ApiVersion {
        ApiVersion::from_u32(self.version)
    }
}

/// One USER SLOT DATA packet: a chunk of a possibly multi-packet transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotChunk {
    pub module: u8,
    pub slot: u8,
    pub sequence: u8,
    pub max_sequence: u8,
    pub data: Vec<u8>,
}

impl SlotChunk {
    /// Bytes of the 8-bit body preceding the chunk data (big-endian size)
    pub const SIZE_FIELD: usize = 4;

    /// Fixed wire bytes around the packed body: header, type, four index bytes, F7
    pub const OVERHEAD: usize = SysexHeader::LEN + 1 + 4 + 1;

    /// Encoded size of this chunk on the wire
    pub fn encoded_len(&self) -> usize {
        Self::OVERHEAD + codec::packed_len(Self::SIZE_FIELD + self.data.len())
    }

    /// Encode as a complete USER SLOT DATA frame
    pub fn encode(&self, header: &SysexHeader) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&header.bytes());
        out.push(USER_SLOT_DATA);
        self.write(&mut out);
        out.push(SYSEX_END);
        out
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[
            self.module & 0x7F,
            self.slot & 0x7F,
            self.sequence & 0x7F,
            self.max_sequence & 0x7F,
        ]);

        let mut body = Vec::with_capacity(Self::SIZE_FIELD + self.data.len());
        body.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        body.extend_from_slice(&self.data);
        out.extend(codec::pack7(&body));
    }
}

/// Every sysex message kind understood by the librarian
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SysexMessage {
    /// Universal identity request (`F0 7E nn 06 01 F7`)
    DeviceInquiryRequest { channel: u8 },
    DeviceInquiryReply {
        channel: u8,
        manufacturer: u8,
        device: DeviceVersion,
    },
    SearchDeviceRequest { echo_id: u8 },
    SearchDeviceReply {
        channel: u8,
        echo_id: u8,
        device: DeviceVersion,
    },
    CurrentProgramDataDumpRequest,
    CurrentProgramDataDump { data: Vec<u8> },
    /// Sent by the device on its own when the selected program changes
    CurrentProgramChanged { program: u16 },
    ProgramDataDumpRequest { program: u16 },
    ProgramDataDump { program: u16, data: Vec<u8> },
    GlobalDataDumpRequest,
    GlobalDataDump { data: Vec<u8> },
    UserApiVersionRequest,
    UserApiVersion(ApiVersion),
    UserModuleInfoRequest { module: u8 },
    UserModuleInfo(ModuleInfo),
    UserSlotStatusRequest { module: u8, slot: u8 },
    UserSlotStatus {
        module: u8,
        slot: u8,
        contents: Option<SlotContents>,
    },
    UserSlotDataRequest { module: u8, slot: u8 },
    UserSlotData(SlotChunk),
    ClearUserSlot { module: u8, slot: u8 },
    ClearUserModule { module: u8 },
    SwapUserData { module: u8, slot_a: u8, slot_b: u8 },
    Status(Status),
}

/// Human-readable name for a logue-format type byte
fn type_name(type_byte: u8) -> &'static str {
    match type_byte {
        GLOBAL_DATA_DUMP_REQUEST => "GLOBAL DATA DUMP REQUEST",
        CURRENT_PROGRAM_DATA_DUMP_REQUEST => "CURRENT PROGRAM DATA DUMP REQUEST",
        USER_API_VERSION_REQUEST => "USER API VERSION REQUEST",
        USER_MODULE_INFO_REQUEST => "USER MODULE INFO REQUEST",
        USER_SLOT_STATUS_REQUEST => "USER SLOT STATUS REQUEST",
        USER_SLOT_DATA_REQUEST => "USER SLOT DATA REQUEST",
        CLEAR_USER_SLOT => "CLEAR USER SLOT",
        PROGRAM_DATA_DUMP_REQUEST => "PROGRAM DATA DUMP REQUEST",
        CLEAR_USER_MODULE => "CLEAR USER MODULE",
        SWAP_USER_DATA => "SWAP USER DATA",
        CURRENT_PROGRAM_DATA_DUMP => "CURRENT PROGRAM DATA DUMP",
        CURRENT_PROGRAM_CHANGED => "CURRENT PROGRAM CHANGED",
        USER_API_VERSION => "USER API VERSION",
        USER_MODULE_INFO => "USER MODULE INFO",
        USER_SLOT_STATUS => "USER SLOT STATUS",
        USER_SLOT_DATA => "USER SLOT DATA",
        PROGRAM_DATA_DUMP => "PROGRAM DATA DUMP",
        GLOBAL_DATA_DUMP => "GLOBAL DATA DUMP",
        t if Status::is_status_byte(t) => "STATUS",
        _ => "UNKNOWN",
    }
}

/// Require at least `expected` bytes for `kind`
fn need(kind: &'static str, bytes: &[u8], expected: usize) -> Result<(), DecodeError> {
    if bytes.len() < expected {
        return Err(DecodeError::TruncatedMessage {
            kind,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Unpack 7-bit data and require at least `expected` host bytes
fn unpack_at_least(
    kind: &'static str,
    packed: &[u8],
    expected: usize,
) -> Result<Vec<u8>, DecodeError> {
    let data = codec::unpack7(packed)?;
    need(kind, &data, expected)?;
    Ok(data)
}

/// Read the big-endian u32 at `offset`; callers have checked the length
fn u32_at(data: &[u8], offset: usize) -> u32 {
    codec::read_u32(data, offset).unwrap_or_default()
}

impl SysexMessage {
    /// Logue-format type byte, `None` for universal and search messages
    pub fn type_byte(&self) -> Option<u8> {
        use SysexMessage::*;
        let t = match self {
            DeviceInquiryRequest { .. }
            | DeviceInquiryReply { .. }
            | SearchDeviceRequest { .. }
            | SearchDeviceReply { .. } => return None,
            CurrentProgramDataDumpRequest => CURRENT_PROGRAM_DATA_DUMP_REQUEST,
            CurrentProgramDataDump { .. } => CURRENT_PROGRAM_DATA_DUMP,
            CurrentProgramChanged { .. } => CURRENT_PROGRAM_CHANGED,
            ProgramDataDumpRequest { .. } => PROGRAM_DATA_DUMP_REQUEST,
            ProgramDataDump { .. } => PROGRAM_DATA_DUMP,
            GlobalDataDumpRequest => GLOBAL_DATA_DUMP_REQUEST,
            GlobalDataDump { .. } => GLOBAL_DATA_DUMP,
            UserApiVersionRequest => USER_API_VERSION_REQUEST,
            UserApiVersion(_) => USER_API_VERSION,
            UserModuleInfoRequest { .. } => USER_MODULE_INFO_REQUEST,
            UserModuleInfo(_) => USER_MODULE_INFO,
            UserSlotStatusRequest { .. } => USER_SLOT_STATUS_REQUEST,
            UserSlotStatus { .. } => USER_SLOT_STATUS,
            UserSlotDataRequest { .. } => USER_SLOT_DATA_REQUEST,
            UserSlotData(_) => USER_SLOT_DATA,
            ClearUserSlot { .. } => CLEAR_USER_SLOT,
            ClearUserModule { .. } => CLEAR_USER_MODULE,
            SwapUserData { .. } => SWAP_USER_DATA,
            Status(status) => status.code,
        };
        Some(t)
    }

    /// Message name as used in the device's MIDI implementation chart
    pub fn name(&self) -> &'static str {
        match self {
            SysexMessage::DeviceInquiryRequest { .. } => "DEVICE INQUIRY REQUEST",
            SysexMessage::DeviceInquiryReply { .. } => "DEVICE INQUIRY REPLY",
            SysexMessage::SearchDeviceRequest { .. } => "SEARCH DEVICE REQUEST",
            SysexMessage::SearchDeviceReply { .. } => "SEARCH DEVICE REPLY",
            other => other.type_byte().map(type_name).unwrap_or("UNKNOWN"),
        }
    }

    /// Encode to a complete F0 ... F7 frame
    pub fn encode(&self, header: &SysexHeader) -> Vec<u8> {
        match self {
            SysexMessage::DeviceInquiryRequest { channel } => {
                vec![
                    SYSEX_START,
                    UNIVERSAL_NON_REALTIME,
                    channel & 0x7F,
                    0x06,
                    0x01,
                    SYSEX_END,
                ]
            }
            SysexMessage::DeviceInquiryReply {
                channel,
                manufacturer,
                device,
            } => {
                let mut out = vec![
                    SYSEX_START,
                    UNIVERSAL_NON_REALTIME,
                    channel & 0x7F,
                    0x06,
                    0x02,
                    manufacturer & 0x7F,
                ];
                device.write(&mut out);
                out.push(SYSEX_END);
                out
            }
            SysexMessage::SearchDeviceRequest { echo_id } => {
                vec![SYSEX_START, KORG_ID, SEARCH_DEVICE, 0x00, echo_id & 0x7F, SYSEX_END]
            }
            SysexMessage::SearchDeviceReply {
                channel,
                echo_id,
                device,
            } => {
                let mut out = vec![
                    SYSEX_START,
                    KORG_ID,
                    SEARCH_DEVICE,
                    0x01,
                    channel & 0x0F,
                    echo_id & 0x7F,
                ];
                device.write(&mut out);
                out.push(SYSEX_END);
                out
            }
            other => {
                let mut out = header.bytes().to_vec();
                // Every variant not handled above has a type byte
                out.push(other.type_byte().unwrap_or_default());
                other.write_logue_body(&mut out);
                out.push(SYSEX_END);
                out
            }
        }
    }

    fn write_logue_body(&self, out: &mut Vec<u8>) {
        use SysexMessage::*;
        match self {
            CurrentProgramDataDump { data } | GlobalDataDump { data } => {
                out.extend(codec::pack7(data));
            }
            CurrentProgramChanged { program } | ProgramDataDumpRequest { program } => {
                out.extend_from_slice(&codec::split14(*program));
            }
            ProgramDataDump { program, data } => {
                out.extend_from_slice(&codec::split14(*program));
                out.extend(codec::pack7(data));
            }
            UserApiVersion(version) => {
                out.extend(codec::pack7(&version.to_u32().to_be_bytes()));
            }
            UserModuleInfoRequest { module } | ClearUserModule { module } => {
                out.push(module & 0x7F);
            }
            UserModuleInfo(info) => {
                out.push(info.module & 0x7F);
                let mut body = Vec::with_capacity(12);
                body.extend_from_slice(&info.max_program_size.to_be_bytes());
                body.extend_from_slice(&info.max_load_size.to_be_bytes());
                body.extend_from_slice(&info.slot_count.to_be_bytes());
                out.extend(codec::pack7(&body));
            }
            UserSlotStatusRequest { module, slot }
            | UserSlotDataRequest { module, slot }
            | ClearUserSlot { module, slot } => {
                out.extend_from_slice(&[module & 0x7F, slot & 0x7F]);
            }
            UserSlotStatus {
                module,
                slot,
                contents,
            } => {
                out.extend_from_slice(&[module & 0x7F, slot & 0x7F]);
                if let Some(contents) = contents {
                    let mut body = Vec::with_capacity(SlotContents::WIRE_LEN);
                    body.extend_from_slice(&contents.dev_id.to_be_bytes());
                    body.extend_from_slice(&contents.unit_id.to_be_bytes());
                    body.extend_from_slice(&contents.version.to_be_bytes());
                    body.extend_from_slice(&codec::encode_name(&contents.name));
                    out.extend(codec::pack7(&body));
                }
            }
            UserSlotData(chunk) => chunk.write(out),
            SwapUserData {
                module,
                slot_a,
                slot_b,
            } => {
                out.extend_from_slice(&[module & 0x7F, slot_a & 0x7F, slot_b & 0x7F]);
            }
            CurrentProgramDataDumpRequest
            | GlobalDataDumpRequest
            | UserApiVersionRequest
            | Status(_) => {}
            DeviceInquiryRequest { .. }
            | DeviceInquiryReply { .. }
            | SearchDeviceRequest { .. }
            | SearchDeviceReply { .. } => {}
        }
    }

    /// Decode a complete F0 ... F7 frame
    pub fn decode(bytes: &[u8], header: &SysexHeader) -> Result<Self, DecodeError> {
        if bytes.first() != Some(&SYSEX_START) {
            return Err(DecodeError::NotSysex);
        }
        if bytes.len() < 2 || bytes.last() != Some(&SYSEX_END) {
            return Err(DecodeError::MalformedTerminator);
        }

        let body = &bytes[1..bytes.len() - 1];
        if let Some(offset) = body.iter().position(|&b| b > 0x7F) {
            return Err(crate::error::CodecError::HighBitSet {
                offset: offset + 1,
                value: body[offset],
            }
            .into());
        }

        match body.first() {
            Some(&UNIVERSAL_NON_REALTIME) => Self::decode_universal(body),
            Some(&KORG_ID) if body.get(1) == Some(&SEARCH_DEVICE) => Self::decode_search(body),
            Some(&KORG_ID) => {
                header.check(body)?;
                Self::decode_logue(&body[SysexHeader::LEN - 1..])
            }
            Some(other) => Err(DecodeError::HeaderMismatch(format!(
                "manufacturer 0x{:02X}",
                other
            ))),
            None => Err(DecodeError::TruncatedMessage {
                kind: "sysex",
                expected: 1,
                actual: 0,
            }),
        }
    }

    fn decode_universal(body: &[u8]) -> Result<Self, DecodeError> {
        need("DEVICE INQUIRY", body, 4)?;
        if body[2] != 0x06 {
            return Err(DecodeError::UnknownMessageType(body[2]));
        }
        match body[3] {
            0x01 => Ok(SysexMessage::DeviceInquiryRequest { channel: body[1] }),
            0x02 => {
                need("DEVICE INQUIRY REPLY", body, 5 + DeviceVersion::WIRE_LEN)?;
                Ok(SysexMessage::DeviceInquiryReply {
                    channel: body[1],
                    manufacturer: body[4],
                    device: DeviceVersion::read(&body[5..]),
                })
            }
            other => Err(DecodeError::UnknownMessageType(other)),
        }
    }

    fn decode_search(body: &[u8]) -> Result<Self, DecodeError> {
        need("SEARCH DEVICE", body, 3)?;
        match body[2] {
            0x00 => {
                need("SEARCH DEVICE REQUEST", body, 4)?;
                Ok(SysexMessage::SearchDeviceRequest { echo_id: body[3] })
            }
            0x01 => {
                need("SEARCH DEVICE REPLY", body, 5 + DeviceVersion::WIRE_LEN)?;
                Ok(SysexMessage::SearchDeviceReply {
                    channel: body[3],
                    echo_id: body[4],
                    device: DeviceVersion::read(&body[5..]),
                })
            }
            other => Err(DecodeError::UnknownMessageType(other)),
        }
    }

    fn decode_logue(rest: &[u8]) -> Result<Self, DecodeError> {
        let (&t, args) = rest.split_first().ok_or(DecodeError::TruncatedMessage {
            kind: "message type",
            expected: 1,
            actual: 0,
        })?;
        let kind = type_name(t);

        let msg = match t {
            GLOBAL_DATA_DUMP_REQUEST => SysexMessage::GlobalDataDumpRequest,
            CURRENT_PROGRAM_DATA_DUMP_REQUEST => SysexMessage::CurrentProgramDataDumpRequest,
            USER_API_VERSION_REQUEST => SysexMessage::UserApiVersionRequest,
            USER_MODULE_INFO_REQUEST => {
                need(kind, args, 1)?;
                SysexMessage::UserModuleInfoRequest { module: args[0] }
            }
            USER_SLOT_STATUS_REQUEST | USER_SLOT_DATA_REQUEST | CLEAR_USER_SLOT => {
                need(kind, args, 2)?;
                let (module, slot) = (args[0], args[1]);
                match t {
                    USER_SLOT_STATUS_REQUEST => SysexMessage::UserSlotStatusRequest { module, slot },
                    USER_SLOT_DATA_REQUEST => SysexMessage::UserSlotDataRequest { module, slot },
                    _ => SysexMessage::ClearUserSlot { module, slot },
                }
            }
            PROGRAM_DATA_DUMP_REQUEST => {
                need(kind, args, 2)?;
                SysexMessage::ProgramDataDumpRequest {
                    program: codec::join14(args[0], args[1]),
                }
            }
            CLEAR_USER_MODULE => {
                need(kind, args, 1)?;
                SysexMessage::ClearUserModule { module: args[0] }
            }
            SWAP_USER_DATA => {
                need(kind, args, 3)?;
                SysexMessage::SwapUserData {
                    module: args[0],
                    slot_a: args[1],
                    slot_b: args[2],
                }
            }
            t if Status::is_status_byte(t) => SysexMessage::Status(Status { code: t }),
            CURRENT_PROGRAM_DATA_DUMP => SysexMessage::CurrentProgramDataDump {
                data: codec::unpack7(args)?,
            },
            CURRENT_PROGRAM_CHANGED => {
                need(kind, args, 2)?;
                SysexMessage::CurrentProgramChanged {
                    program: codec::join14(args[0], args[1]),
                }
            }
            USER_API_VERSION => {
                let data = unpack_at_least(kind, args, 4)?;
                SysexMessage::UserApiVersion(ApiVersion::from_u32(u32_at(&data, 0)))
            }
            USER_MODULE_INFO => {
                need(kind, args, 1)?;
                let data = unpack_at_least(kind, &args[1..], 12)?;
                SysexMessage::UserModuleInfo(ModuleInfo {
                    module: args[0],
                    max_program_size: u32_at(&data, 0),
                    max_load_size: u32_at(&data, 4),
                    slot_count: u32_at(&data, 8),
                })
            }
            USER_SLOT_STATUS => {
                need(kind, args, 2)?;
                let packed = &args[2..];
                let contents = if packed.is_empty() {
                    None
                } else {
                    let data = unpack_at_least(kind, packed, SlotContents::WIRE_LEN)?;
                    Some(SlotContents {
                        dev_id: u32_at(&data, 0),
                        unit_id: u32_at(&data, 4),
                        version: u32_at(&data, 8),
                        name: codec::decode_name(&data[12..12 + NAME_WIDTH]),
                    })
                };
                SysexMessage::UserSlotStatus {
                    module: args[0],
                    slot: args[1],
                    contents,
                }
            }
            USER_SLOT_DATA => {
                need(kind, args, 4)?;
                let mut body = unpack_at_least(kind, &args[4..], SlotChunk::SIZE_FIELD)?;
                let declared = u32_at(&body, 0) as usize;
                let data = body.split_off(SlotChunk::SIZE_FIELD);
                if declared != data.len() {
                    return Err(DecodeError::LengthMismatch {
                        kind,
                        declared,
                        actual: data.len(),
                    });
                }
                SysexMessage::UserSlotData(SlotChunk {
                    module: args[0],
                    slot: args[1],
                    sequence: args[2],
                    max_sequence: args[3],
                    data,
                })
            }
            PROGRAM_DATA_DUMP => {
                need(kind, args, 2)?;
                SysexMessage::ProgramDataDump {
                    program: codec::join14(args[0], args[1]),
                    data: codec::unpack7(&args[2..])?,
                }
            }
            GLOBAL_DATA_DUMP => SysexMessage::GlobalDataDump {
                data: codec::unpack7(args)?,
            },
            other => return Err(DecodeError::UnknownMessageType(other)),
        };

        Ok(msg)
    }

    /// Device-initiated notifications that never answer a request
    pub fn is_notification(&self) -> bool {
        matches!(self, SysexMessage::CurrentProgramChanged { .. })
    }

    /// True if the device answers this message with a status reply instead of data
    pub fn expects_ack(&self) -> bool {
        matches!(
            self,
            SysexMessage::ClearUserSlot { .. }
                | SysexMessage::ClearUserModule { .. }
                | SysexMessage::SwapUserData { .. }
                | SysexMessage::UserSlotData(_)
                | SysexMessage::ProgramDataDump { .. }
                | SysexMessage::CurrentProgramDataDump { .. }
                | SysexMessage::GlobalDataDump { .. }
        )
    }

    /// Correlate a reply with the request that produced it.
    ///
    /// The protocol has no request ids, so correlation is by message-type
    /// pairing plus whatever module/slot/program context the request carries.
    pub fn is_reply_to(&self, request: &SysexMessage) -> bool {
        use SysexMessage::*;
        match (request, self) {
            (DeviceInquiryRequest { .. }, DeviceInquiryReply { .. }) => true,
            (SearchDeviceRequest { echo_id }, SearchDeviceReply { echo_id: echo, .. }) => {
                echo_id == echo
            }
            (CurrentProgramDataDumpRequest, CurrentProgramDataDump { .. }) => true,
            (ProgramDataDumpRequest { program }, ProgramDataDump { program: p, .. }) => {
                program == p
            }
            (GlobalDataDumpRequest, GlobalDataDump { .. }) => true,
            (UserApiVersionRequest, UserApiVersion(_)) => true,
            (UserModuleInfoRequest { module }, UserModuleInfo(info)) => *module == info.module,
            (
                UserSlotStatusRequest { module, slot },
                UserSlotStatus {
                    module: m, slot: s, ..
                },
            ) => module == m && slot == s,
            (UserSlotDataRequest { module, slot }, UserSlotData(chunk)) => {
                *module == chunk.module && *slot == chunk.slot
            }
            (request, Status(status)) => request.expects_ack() && status.is_ack(),
            _ => false,
        }
    }
}

impl fmt::Display for SysexMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SysexMessage::UserSlotData(chunk) => write!(
                f,
                "USER SLOT DATA module:{} slot:{} seq:{}/{} {} bytes",
                chunk.module,
                chunk.slot,
                chunk.sequence,
                chunk.max_sequence,
                chunk.data.len()
            ),
            SysexMessage::UserSlotStatus { module, slot, contents } => match contents {
                Some(c) => write!(f, "USER SLOT STATUS module:{} slot:{} '{}'", module, slot, c.name),
                None => write!(f, "USER SLOT STATUS module:{} slot:{} empty", module, slot),
            },
            SysexMessage::Status(status) => write!(f, "STATUS {}", status),
            other => f.write_str(other.name()),
        }
    }
}
