//! Runner configuration
//!
//! ```yaml
//! input_channels: 0
//! output_channels: 2
//! sample_rate: 44100
//! block_frames: 1024
//! device: simulated      # or: cpal
//! patch:
//!   name: main.pd
//!   dir: /path/to/patches
//! run_seconds: 10
//! ```

mod io;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{ChannelConfig, DEFAULT_BLOCK_FRAMES, DEFAULT_SAMPLE_RATE};

pub use io::{load_config, read_config, save_config};

/// Which device adapter the runner opens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Timer-driven headless device
    #[default]
    Simulated,
    /// System audio through CPAL
    Cpal,
}

/// Patch opened after the session is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchConfig {
    /// File name inside `dir`
    pub name: String,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Capture channels; 0 disables capture
    pub input_channels: u32,
    pub output_channels: u32,
    pub sample_rate: u32,
    /// Frames per exchanged block, a multiple of the engine's native block
    pub block_frames: usize,
    pub device: DeviceKind,
    pub patch: Option<PatchConfig>,
    /// How long the runner plays before shutting down
    pub run_seconds: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            input_channels: 0,
            output_channels: 2,
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_frames: DEFAULT_BLOCK_FRAMES,
            device: DeviceKind::default(),
            patch: None,
            run_seconds: 10,
        }
    }
}

impl BridgeConfig {
    pub fn channels(&self) -> ChannelConfig {
        ChannelConfig::new(self.input_channels, self.output_channels, self.sample_rate)
    }

    /// Check channel counts, sample rate and block size
    pub fn validate(&self) -> Result<(), String> {
        self.channels().validate()?;
        if self.block_frames == 0 {
            return Err("block_frames must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Default config file location
///
/// Returns: `{config_dir}/pdbridge/config.yaml` (e.g. `~/.config/pdbridge/config.yaml`)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pdbridge")
        .join("config.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.channels(), ChannelConfig::default());
    }

    #[test]
    fn test_validate_rejects() {
        let config = BridgeConfig {
            block_frames: 0,
            ..BridgeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BridgeConfig {
            sample_rate: 12345,
            ..BridgeConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("12345"));

        let config = BridgeConfig {
            input_channels: 513,
            ..BridgeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("pdbridge/config.yaml"));
    }
}
