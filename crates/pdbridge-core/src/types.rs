//! Common types for pdbridge
//!
//! Sample format, stream directions, channel configuration and the PCM
//! format descriptor shared by device adapters and processing engines.

use serde::{Deserialize, Serialize};

/// PCM sample type exchanged with the device (signed 16-bit, little-endian on the wire)
pub type Sample = i16;

/// Frames per exchanged block (per channel)
/// Must be a multiple of the engine's native block size (libpd uses 64)
pub const DEFAULT_BLOCK_FRAMES: usize = 1024;

/// Upper bound on channels per direction
pub const MAX_CHANNEL_COUNT: u32 = 512;

/// Default sample rate when none is configured
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Number of buffers the device queue holds per direction (double buffering)
pub const DEVICE_QUEUE_DEPTH: usize = 2;

/// Sample rates a device adapter can be opened with
pub const SUPPORTED_SAMPLE_RATES: [u32; 12] = [
    8000, 11025, 16000, 22050, 24000, 32000, 44100, 48000, 64000, 88200, 96000, 192000,
];

/// Check whether a sample rate is in the supported table
pub fn is_supported_sample_rate(sample_rate: u32) -> bool {
    SUPPORTED_SAMPLE_RATES.contains(&sample_rate)
}

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Capture (hardware fills, processing consumes)
    Input,
    /// Playback (processing fills, hardware consumes)
    Output,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Playback state requested from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
}

/// Channel layout announced to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerLayout {
    /// Mono streams map to the front-center speaker
    FrontCenter,
    /// Anything wider maps to front left/right
    FrontLeftRight,
}

impl SpeakerLayout {
    pub fn for_channels(channels: u32) -> Self {
        if channels > 1 {
            SpeakerLayout::FrontLeftRight
        } else {
            SpeakerLayout::FrontCenter
        }
    }
}

/// Fixed channel/rate configuration of a session
///
/// Chosen at creation and never mutated. An input channel count of 0
/// disables the capture path entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub input_channels: u32,
    pub output_channels: u32,
    pub sample_rate: u32,
}

impl ChannelConfig {
    pub fn new(input_channels: u32, output_channels: u32, sample_rate: u32) -> Self {
        Self {
            input_channels,
            output_channels,
            sample_rate,
        }
    }

    /// Whether the capture path is active
    #[inline]
    pub fn input_enabled(&self) -> bool {
        self.input_channels > 0
    }

    /// Channel count for a direction
    pub fn channels(&self, direction: Direction) -> u32 {
        match direction {
            Direction::Input => self.input_channels,
            Direction::Output => self.output_channels,
        }
    }

    /// Validate channel counts and sample rate
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.output_channels == 0 {
            return Err("output channel count must be at least 1".to_string());
        }
        if self.output_channels > MAX_CHANNEL_COUNT {
            return Err(format!(
                "output channel count {} exceeds maximum {}",
                self.output_channels, MAX_CHANNEL_COUNT
            ));
        }
        if self.input_channels > MAX_CHANNEL_COUNT {
            return Err(format!(
                "input channel count {} exceeds maximum {}",
                self.input_channels, MAX_CHANNEL_COUNT
            ));
        }
        if !is_supported_sample_rate(self.sample_rate) {
            return Err(format!("unsupported sample rate {}Hz", self.sample_rate));
        }
        Ok(())
    }

    /// PCM format for one direction, or None when that direction is disabled
    pub fn pcm_format(&self, direction: Direction) -> Option<PcmFormat> {
        let channels = self.channels(direction);
        (channels > 0).then(|| PcmFormat::new(channels, self.sample_rate))
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new(0, 2, DEFAULT_SAMPLE_RATE)
    }
}

/// PCM stream format handed to a device adapter when it is opened
///
/// Always 16-bit little-endian interleaved, with a queue of
/// [`DEVICE_QUEUE_DEPTH`] buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u32,
    pub sample_rate: u32,
    pub layout: SpeakerLayout,
    pub queue_depth: usize,
}

impl PcmFormat {
    pub fn new(channels: u32, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            layout: SpeakerLayout::for_channels(channels),
            queue_depth: DEVICE_QUEUE_DEPTH,
        }
    }

    /// Bytes per interleaved frame
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * std::mem::size_of::<Sample>()
    }

    /// Duration of `frames` frames at this format's rate
    pub fn period(&self, frames: usize) -> std::time::Duration {
        std::time::Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_rates() {
        assert!(is_supported_sample_rate(44100));
        assert!(is_supported_sample_rate(192000));
        assert!(!is_supported_sample_rate(44000));
        assert!(!is_supported_sample_rate(0));
    }

    #[test]
    fn test_speaker_layout() {
        assert_eq!(SpeakerLayout::for_channels(1), SpeakerLayout::FrontCenter);
        assert_eq!(SpeakerLayout::for_channels(2), SpeakerLayout::FrontLeftRight);
        assert_eq!(SpeakerLayout::for_channels(6), SpeakerLayout::FrontLeftRight);
    }

    #[test]
    fn test_channel_config_validation() {
        assert!(ChannelConfig::new(0, 2, 44100).validate().is_ok());
        assert!(ChannelConfig::new(1, 1, 48000).validate().is_ok());
        assert!(ChannelConfig::new(0, 0, 44100).validate().is_err());
        assert!(ChannelConfig::new(513, 2, 44100).validate().is_err());
        assert!(ChannelConfig::new(0, 2, 12345).validate().is_err());
    }

    #[test]
    fn test_disabled_input_has_no_format() {
        let config = ChannelConfig::new(0, 2, 44100);
        assert!(!config.input_enabled());
        assert!(config.pcm_format(Direction::Input).is_none());

        let out = config.pcm_format(Direction::Output).unwrap();
        assert_eq!(out.frame_bytes(), 4);
        assert_eq!(out.queue_depth, 2);
    }
}
