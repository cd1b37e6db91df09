use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use softu2f_frame::CID_BROADCAST;

use crate::error::{DeviceError, Result};

/// Runtime settings for one emulated device.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// How long the run loop blocks waiting for input before re-checking
    /// for shutdown.
    pub input_wait_ms: u64,
    /// Delay between outbound frames of one message. Zero disables pacing.
    pub frame_pacing_ms: u64,
    /// First channel id handed out by INIT.
    pub first_channel_id: u32,
    /// Device version reported in INIT responses.
    pub version_major: u8,
    pub version_minor: u8,
    pub version_build: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            input_wait_ms: 1000,
            frame_pacing_ms: 5,
            first_channel_id: 1,
            version_major: 0,
            version_minor: 0,
            version_build: 0,
        }
    }
}

impl DeviceConfig {
    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            DeviceError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Parse and validate a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the device cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.input_wait_ms == 0 {
            return Err(DeviceError::Config(
                "input_wait_ms must be greater than zero".to_string(),
            ));
        }
        if self.first_channel_id == 0 || self.first_channel_id == CID_BROADCAST {
            return Err(DeviceError::Config(format!(
                "first_channel_id {:#010x} is reserved",
                self.first_channel_id
            )));
        }
        Ok(())
    }

    pub fn input_wait(&self) -> Duration {
        Duration::from_millis(self.input_wait_ms)
    }

    pub fn frame_pacing(&self) -> Duration {
        Duration::from_millis(self.frame_pacing_ms)
    }
}
