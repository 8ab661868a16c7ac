//! Device model
//!
//! Maps the generic message set onto one family's slot layout. Every
//! operation is a single exchange (or a short series of them) through the
//! owned [`Session`], so device calls are serialized by the session gate.

pub mod family;


use parking_lot::RwLock;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::sysex::{ApiVersion, DeviceVersion, ModuleInfo, SlotChunk, SlotContents, SysexMessage};
use crate::session::{Session, DEFAULT_TIMEOUT};
use crate::transport::Transport;

pub use family::{DeviceFamily, ModuleCategory};

/// Universal device id that addresses every channel
const ALL_CALL: u8 = 0x7F;

/// Identity reported by a device inquiry or search reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub family: DeviceFamily,
    /// Global MIDI channel the device answers on
    pub channel: u8,
    pub version: DeviceVersion,
}

impl DeviceIdentity {
    /// Firmware `(major, minor)`, corrected for family quirks
    pub fn firmware(&self) -> (u16, u16) {
        self.family.firmware_version(&self.version)
    }
}

/// State established by a successful [`Device::probe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceSession {
    pub identity: DeviceIdentity,
    pub api_version: ApiVersion,
}

/// Occupancy of one user slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Occupancy {
    Empty,
    Occupied(SlotContents),
}

/// Snapshot of one user slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    pub category: ModuleCategory,
    pub slot: u8,
    pub occupancy: Occupancy,
}

impl SlotStatus {
    pub fn is_empty(&self) -> bool {
        self.occupancy == Occupancy::Empty
    }

    pub fn contents(&self) -> Option<&SlotContents> {
        match &self.occupancy {
            Occupancy::Occupied(contents) => Some(contents),
            Occupancy::Empty => None,
        }
    }
}

/// A logue device reached through a session
pub struct Device<T> {
    session: Session<T>,
    family: DeviceFamily,
    timeout: Duration,
    probed: RwLock<Option<DeviceSession>>,
}

impl<T: Transport> Device<T> {
    /// Wrap `transport`, addressing the device on channel 0 until probed
    pub fn new(transport: T, family: DeviceFamily) -> Self {
        Self::with_session(Session::new(transport, family.header(0)), family)
    }

    pub fn with_session(session: Session<T>, family: DeviceFamily) -> Self {
        Self {
            session,
            family,
            timeout: DEFAULT_TIMEOUT,
            probed: RwLock::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// State from the last successful probe
    pub fn device_session(&self) -> Option<DeviceSession> {
        *self.probed.read()
    }

    /// Identify the device and negotiate the user API version.
    ///
    /// Also resolves an indeterminate session.
    pub async fn probe(&self) -> Result<DeviceSession> {
        *self.probed.write() = None;

        let reply = self
            .session
            .exchange(
                &SysexMessage::DeviceInquiryRequest { channel: ALL_CALL },
                self.timeout,
            )
            .await?;

        let identity = match reply {
            SysexMessage::DeviceInquiryReply {
                channel,
                manufacturer,
                device,
            } => {
                if manufacturer != crate::sysex::KORG_ID {
                    return Err(Error::FamilyMismatch {
                        expected: self.family.name(),
                        found: device.family,
                    });
                }
                self.identity(channel, device)?
            }
            other => return Err(Error::UnexpectedReply(other.name())),
        };

        self.session.set_channel(identity.channel);

        let api_version = self.request_api_version().await?;
        if api_version.major != self.family.api_major() {
            return Err(Error::UnsupportedApi {
                found: api_version.to_string(),
                expected_major: self.family.api_major(),
            });
        }

        let (major, minor) = identity.firmware();
        info!(
            "Connected to {} on channel {} (firmware {}.{}, user API {})",
            self.family,
            identity.channel + 1,
            major,
            minor,
            api_version
        );

        let session = DeviceSession {
            identity,
            api_version,
        };
        *self.probed.write() = Some(session);
        Ok(session)
    }

    /// Korg search-device handshake; does not require a probe
    pub async fn search(&self, echo_id: u8) -> Result<DeviceIdentity> {
        let reply = self
            .session
            .exchange(
                &SysexMessage::SearchDeviceRequest {
                    echo_id: echo_id & 0x7F,
                },
                self.timeout,
            )
            .await?;

        match reply {
            SysexMessage::SearchDeviceReply {
                channel, device, ..
            } => self.identity(channel, device),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    pub async fn api_version(&self) -> Result<ApiVersion> {
        self.require_probe()?;
        self.request_api_version().await
    }

    pub async fn module_info(&self, category: ModuleCategory) -> Result<ModuleInfo> {
        self.require_probe()?;
        match self
            .request(SysexMessage::UserModuleInfoRequest {
                module: category.module_id(),
            })
            .await?
        {
            SysexMessage::UserModuleInfo(info) => Ok(info),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Status of a single slot
    pub async fn slot_status(&self, category: ModuleCategory, slot: u8) -> Result<SlotStatus> {
        self.require_probe()?;
        self.check_slot(category, slot)?;

        match self
            .request(SysexMessage::UserSlotStatusRequest {
                module: category.module_id(),
                slot,
            })
            .await?
        {
            SysexMessage::UserSlotStatus { contents, .. } => Ok(SlotStatus {
                category,
                slot,
                occupancy: contents.map_or(Occupancy::Empty, Occupancy::Occupied),
            }),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Status of every slot in `category`, in slot order
    pub async fn list_slots(&self, category: ModuleCategory) -> Result<Vec<SlotStatus>> {
        self.require_probe()?;
        let count = self.family.slot_count(category);
        let mut slots = Vec::with_capacity(count as usize);
        for slot in 0..count {
            slots.push(self.slot_status(category, slot).await?);
        }
        debug!(
            "{}: {} of {} slots occupied",
            category,
            slots.iter().filter(|s| !s.is_empty()).count(),
            count
        );
        Ok(slots)
    }

    /// Download the unit stored in a slot
    pub async fn fetch_slot_data(&self, category: ModuleCategory, slot: u8) -> Result<Vec<u8>> {
        self.require_probe()?;
        self.check_slot(category, slot)?;

        match self
            .request(SysexMessage::UserSlotDataRequest {
                module: category.module_id(),
                slot,
            })
            .await?
        {
            SysexMessage::UserSlotData(chunk) => {
                info!(
                    "Fetched {} bytes from {} slot {}",
                    chunk.data.len(),
                    category,
                    slot
                );
                Ok(chunk.data)
            }
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Upload a unit into a slot
    pub async fn install_slot_data(
        &self,
        category: ModuleCategory,
        slot: u8,
        data: &[u8],
    ) -> Result<()> {
        self.require_probe()?;
        self.check_slot(category, slot)?;

        self.request(SysexMessage::UserSlotData(SlotChunk {
            module: category.module_id(),
            slot,
            sequence: 0,
            max_sequence: 0,
            data: data.to_vec(),
        }))
        .await?;

        info!("Installed {} bytes into {} slot {}", data.len(), category, slot);
        Ok(())
    }

    pub async fn clear_slot(&self, category: ModuleCategory, slot: u8) -> Result<()> {
        self.require_probe()?;
        self.check_slot(category, slot)?;

        self.request(SysexMessage::ClearUserSlot {
            module: category.module_id(),
            slot,
        })
        .await?;

        info!("Cleared {} slot {}", category, slot);
        Ok(())
    }

    /// Clear every slot of a category
    pub async fn clear_module(&self, category: ModuleCategory) -> Result<()> {
        self.require_probe()?;

        self.request(SysexMessage::ClearUserModule {
            module: category.module_id(),
        })
        .await?;

        info!("Cleared all {} slots", category);
        Ok(())
    }

    pub async fn swap_slots(&self, category: ModuleCategory, slot_a: u8, slot_b: u8) -> Result<()> {
        self.require_probe()?;
        self.check_slot(category, slot_a)?;
        self.check_slot(category, slot_b)?;

        self.request(SysexMessage::SwapUserData {
            module: category.module_id(),
            slot_a,
            slot_b,
        })
        .await?;

        info!("Swapped {} slots {} and {}", category, slot_a, slot_b);
        Ok(())
    }

    /// Program currently loaded in the edit buffer
    pub async fn current_program(&self) -> Result<Vec<u8>> {
        self.require_probe()?;
        match self
            .request(SysexMessage::CurrentProgramDataDumpRequest)
            .await?
        {
            SysexMessage::CurrentProgramDataDump { data } => Ok(data),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Replace the edit buffer
    pub async fn load_current_program(&self, data: &[u8]) -> Result<()> {
        self.require_probe()?;
        self.request(SysexMessage::CurrentProgramDataDump {
            data: data.to_vec(),
        })
        .await?;
        Ok(())
    }

    /// Stored program `number` (zero-based)
    pub async fn program(&self, number: u16) -> Result<Vec<u8>> {
        self.require_probe()?;
        self.check_program(number)?;

        match self
            .request(SysexMessage::ProgramDataDumpRequest { program: number })
            .await?
        {
            SysexMessage::ProgramDataDump { data, .. } => Ok(data),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Overwrite stored program `number`
    pub async fn load_program(&self, number: u16, data: &[u8]) -> Result<()> {
        self.require_probe()?;
        self.check_program(number)?;

        self.request(SysexMessage::ProgramDataDump {
            program: number,
            data: data.to_vec(),
        })
        .await?;

        debug!("Loaded program {} ({} bytes)", number, data.len());
        Ok(())
    }

    pub async fn global_data(&self) -> Result<Vec<u8>> {
        self.require_probe()?;
        match self.request(SysexMessage::GlobalDataDumpRequest).await? {
            SysexMessage::GlobalDataDump { data } => Ok(data),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    async fn request(&self, message: SysexMessage) -> Result<SysexMessage> {
        Ok(self.session.exchange(&message, self.timeout).await?)
    }

    async fn request_api_version(&self) -> Result<ApiVersion> {
        match self.request(SysexMessage::UserApiVersionRequest).await? {
            SysexMessage::UserApiVersion(version) => Ok(version),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    fn identity(&self, channel: u8, version: DeviceVersion) -> Result<DeviceIdentity> {
        if version.family != self.family.family_id() {
            return Err(Error::FamilyMismatch {
                expected: self.family.name(),
                found: version.family,
            });
        }
        Ok(DeviceIdentity {
            family: self.family,
            channel,
            version,
        })
    }

    fn require_probe(&self) -> Result<()> {
        if self.probed.read().is_none() {
            return Err(Error::NotProbed);
        }
        Ok(())
    }

    fn check_slot(&self, category: ModuleCategory, slot: u8) -> Result<()> {
        let count = self.family.slot_count(category);
        if slot >= count {
            return Err(Error::InvalidSlot {
                category,
                slot,
                count,
            });
        }
        Ok(())
    }

    fn check_program(&self, number: u16) -> Result<()> {
        let count = self.family.program_count();
        if count == 0 {
            return Err(Error::Unsupported("program memory"));
        }
        if number >= count {
            return Err(Error::InvalidProgram { number, count });
        }
        Ok(())
    }
}
