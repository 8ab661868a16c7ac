//! Program preset files
//!
//! A preset file is a JSON snapshot of the edit buffer and the stored
//! programs of one device, with program data hex-encoded.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::device::{Device, DeviceFamily};
use crate::error::Error;
use crate::transport::Transport;

/// Hex (de)serialization for raw program data
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim()).map_err(serde::de::Error::custom)
    }
}

/// One stored program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEntry {
    pub number: u16,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

/// Edit buffer contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentProgram {
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

/// Preset snapshot for JSON serialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetFile {
    /// Version of the file format
    pub format_version: String,
    pub family: DeviceFamily,
    /// Milliseconds since epoch
    pub saved_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<CurrentProgram>,
    #[serde(default)]
    pub programs: Vec<ProgramEntry>,
}

impl PresetFile {
    pub const FORMAT_VERSION: &'static str = "1.0.0";

    pub fn new(family: DeviceFamily) -> Self {
        Self {
            format_version: Self::FORMAT_VERSION.to_string(),
            family,
            saved_at_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
            current: None,
            programs: Vec::new(),
        }
    }

    pub fn set_current(&mut self, data: Vec<u8>) {
        self.current = Some(CurrentProgram { data });
    }

    /// Add or replace a program, keeping entries ordered by number
    pub fn insert_program(&mut self, number: u16, data: Vec<u8>) {
        match self.programs.binary_search_by_key(&number, |p| p.number) {
            Ok(index) => self.programs[index].data = data,
            Err(index) => self.programs.insert(index, ProgramEntry { number, data }),
        }
    }

    pub fn program(&self, number: u16) -> Option<&[u8]> {
        self.programs
            .iter()
            .find(|p| p.number == number)
            .map(|p| p.data.as_slice())
    }

    /// Save preset to JSON file
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize preset")?;

        fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write preset file: {}", path.display()))?;

        info!(
            "Saved {} program(s) to {}",
            self.programs.len(),
            path.display()
        );
        Ok(())
    }

    /// Load preset from JSON file
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read preset file: {}", path.display()))?;

        let preset: PresetFile =
            serde_json::from_str(&json).context("Failed to parse preset JSON")?;

        debug!(
            "Preset loaded (version: {}, family: {}, {} programs)",
            preset.format_version,
            preset.family,
            preset.programs.len()
        );

        Ok(preset)
    }
}

/// Read the edit buffer and every stored program from a probed device
pub async fn capture<T: Transport>(device: &Device<T>) -> crate::error::Result<PresetFile> {
    let mut preset = PresetFile::new(device.family());
    preset.set_current(device.current_program().await?);

    for number in 0..device.family().program_count() {
        let data = device.program(number).await?;
        debug!("Captured program {} ({} bytes)", number, data.len());
        preset.insert_program(number, data);
    }

    Ok(preset)
}

/// Write a preset back to a probed device of the same family
pub async fn restore<T: Transport>(
    device: &Device<T>,
    preset: &PresetFile,
) -> crate::error::Result<()> {
    if preset.family != device.family() {
        return Err(Error::FamilyMismatch {
            expected: device.family().name(),
            found: preset.family.family_id(),
        });
    }

    for entry in &preset.programs {
        device.load_program(entry.number, &entry.data).await?;
    }
    if let Some(current) = &preset.current {
        device.load_current_program(&current.data).await?;
    }

    info!("Restored {} program(s)", preset.programs.len());
    Ok(())
}
