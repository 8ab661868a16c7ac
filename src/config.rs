//! Configuration management for the librarian
//!
//! Handles loading and saving the YAML configuration file. Every field has a
//! default so a missing or partial file is valid.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use crate::device::DeviceFamily;
use crate::packetizer::{chunk_capacity, MAX_PACKET_SIZE};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LibrarianConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// MIDI port configuration (case-insensitive substrings of port names)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MidiConfig {
    #[serde(default = "default_port")]
    pub input_port: String,
    #[serde(default = "default_port")]
    pub output_port: String,
}

/// Target device
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub family: DeviceFamily,
    /// Channel used until the device reports its global channel (0-15)
    #[serde(default)]
    pub channel: u8,
}

/// Exchange tuning
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Reply timeout per message
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            input_port: default_port(),
            output_port: default_port(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_packet_size: default_max_packet_size(),
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl LibrarianConfig {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: LibrarianConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Reject values the protocol cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.device.channel > 15 {
            bail!("device.channel must be 0-15, got {}", self.device.channel);
        }
        if self.session.timeout_ms == 0 {
            bail!("session.timeout_ms must be greater than zero");
        }
        if self.session.max_packet_size > MAX_PACKET_SIZE {
            bail!(
                "session.max_packet_size must not exceed {}, got {}",
                MAX_PACKET_SIZE,
                self.session.max_packet_size
            );
        }
        chunk_capacity(self.session.max_packet_size).context("Invalid session.max_packet_size")?;
        Ok(())
    }
}

// Default value functions
fn default_port() -> String { "NTS-1".to_string() }
fn default_timeout_ms() -> u64 { 2000 }
fn default_max_packet_size() -> usize { MAX_PACKET_SIZE }
