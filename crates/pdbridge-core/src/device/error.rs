//! Device adapter error types

use thiserror::Error;

use crate::types::Direction;

/// Errors reported by a device adapter
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Device could not be opened or realized
    #[error("Failed to initialize audio device: {0}")]
    Init(String),

    /// Sample rate not in the supported table
    #[error("Unsupported sample rate: {0}Hz")]
    UnsupportedSampleRate(u32),

    /// Device can't provide the requested PCM format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Enqueueing a buffer failed
    #[error("Failed to submit {direction} buffer: {reason}")]
    Submit { direction: Direction, reason: String },

    /// Changing the playback state failed
    #[error("Failed to set playback state: {0}")]
    PlaybackState(String),

    /// Stream error reported by the backend
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// Operation on a device that was already released
    #[error("Audio device already released")]
    Released,
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeviceError::Submit {
            direction: Direction::Output,
            reason: "queue full".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to submit output buffer: queue full");

        let err = DeviceError::UnsupportedSampleRate(12345);
        assert!(err.to_string().contains("12345"));
    }
}
