//! Per-family constant tables
//!
//! Families differ only in data: extended header id, identity bytes, slot
//! counts and the user API generation they speak.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec;
use crate::sysex::{DeviceVersion, SysexHeader};

/// User module category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum ModuleCategory {
    #[serde(rename = "osc")]
    #[value(name = "osc")]
    Osc,
    #[serde(rename = "modfx")]
    #[value(name = "modfx")]
    ModFx,
    #[serde(rename = "delfx")]
    #[value(name = "delfx")]
    DelFx,
    #[serde(rename = "revfx")]
    #[value(name = "revfx")]
    RevFx,
}

impl ModuleCategory {
    pub const ALL: [ModuleCategory; 4] = [
        ModuleCategory::Osc,
        ModuleCategory::ModFx,
        ModuleCategory::DelFx,
        ModuleCategory::RevFx,
    ];

    /// Module id used on the wire
    pub fn module_id(self) -> u8 {
        match self {
            ModuleCategory::ModFx => 1,
            ModuleCategory::DelFx => 2,
            ModuleCategory::RevFx => 3,
            ModuleCategory::Osc => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleCategory::Osc => "osc",
            ModuleCategory::ModFx => "modfx",
            ModuleCategory::DelFx => "delfx",
            ModuleCategory::RevFx => "revfx",
        }
    }
}

impl fmt::Display for ModuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported logue device families
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceFamily {
    /// NTS-1 digital kit (user API 1.x)
    #[value(name = "nts1")]
    Nts1,
    /// NTS-1 digital kit mkII (user API 2.x)
    #[default]
    #[value(name = "nts1-mk2")]
    Nts1Mk2,
}

impl DeviceFamily {
    pub const ALL: [DeviceFamily; 2] = [DeviceFamily::Nts1, DeviceFamily::Nts1Mk2];

    pub fn name(self) -> &'static str {
        match self {
            DeviceFamily::Nts1 => "NTS-1 digital kit",
            DeviceFamily::Nts1Mk2 => "NTS-1 digital kit mkII",
        }
    }

    /// Bytes following `F0 42 3g` in every logue-format message
    pub fn extended_id(self) -> [u8; 3] {
        match self {
            DeviceFamily::Nts1 => [0x00, 0x01, 0x57],
            DeviceFamily::Nts1Mk2 => [0x00, 0x01, 0x73],
        }
    }

    pub fn header(self, channel: u8) -> SysexHeader {
        SysexHeader::new(channel, self.extended_id())
    }

    /// Family id as reported by inquiry and search replies
    pub fn family_id(self) -> u16 {
        match self {
            DeviceFamily::Nts1 => codec::join14(0x57, 0x01),
            DeviceFamily::Nts1Mk2 => codec::join14(0x73, 0x01),
        }
    }

    pub fn member_id(self) -> u16 {
        match self {
            DeviceFamily::Nts1 => 0,
            DeviceFamily::Nts1Mk2 => 1,
        }
    }

    pub fn from_family_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.family_id() == id)
    }

    /// Major user API version this family speaks
    pub fn api_major(self) -> u8 {
        match self {
            DeviceFamily::Nts1 => 1,
            DeviceFamily::Nts1Mk2 => 2,
        }
    }

    pub fn slot_count(self, category: ModuleCategory) -> u8 {
        match category {
            ModuleCategory::Osc | ModuleCategory::ModFx => 16,
            ModuleCategory::DelFx | ModuleCategory::RevFx => 8,
        }
    }

    /// Stored programs; the NTS-1 has no program memory
    pub fn program_count(self) -> u16 {
        match self {
            DeviceFamily::Nts1 => 0,
            DeviceFamily::Nts1Mk2 => 200,
        }
    }

    /// Firmware version as `(major, minor)`.
    ///
    /// The NTS-1 reports its major and minor fields swapped.
    pub fn firmware_version(self, device: &DeviceVersion) -> (u16, u16) {
        match self {
            DeviceFamily::Nts1 => (device.minor, device.major),
            DeviceFamily::Nts1Mk2 => (device.major, device.minor),
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
