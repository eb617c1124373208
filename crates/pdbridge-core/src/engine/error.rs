//! Error types for processing engines

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine could not be initialized or configured
    #[error("Failed to initialize engine: {channels_in} in / {channels_out} out @ {sample_rate}Hz - {reason}")]
    Init {
        channels_in: u32,
        channels_out: u32,
        sample_rate: u32,
        reason: String,
    },

    /// Block processing failed
    #[error("Engine processing failed: {0}")]
    Process(String),

    /// Control message rejected
    #[error("Failed to send control message: {0}")]
    Control(String),

    /// Exchanged block isn't a multiple of the engine block size
    #[error("Block of {block_frames} frames is not a multiple of engine block size {native}")]
    BlockSize { block_frames: usize, native: usize },

    /// Asset file not found
    #[error("Asset not found: {0}")]
    AssetNotFound(PathBuf),

    /// Asset exists but could not be opened
    #[error("Failed to open asset '{path}': {reason}")]
    AssetOpen { path: PathBuf, reason: String },
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::BlockSize {
            block_frames: 1000,
            native: 64,
        };
        assert!(err.to_string().contains("1000"));
        assert!(err.to_string().contains("64"));

        let err = EngineError::AssetNotFound(PathBuf::from("/patches/synth.pd"));
        assert!(err.to_string().contains("/patches/synth.pd"));
    }
}
