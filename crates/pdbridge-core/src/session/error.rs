//! Session error types

use thiserror::Error;

use super::state::SessionState;
use crate::device::DeviceError;
use crate::engine::EngineError;

/// Errors surfaced by session operations
#[derive(Error, Debug)]
pub enum SessionError {
    /// Channel/rate/block configuration rejected at creation
    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    /// Lifecycle operation not allowed in the current state
    #[error("Cannot {operation} while session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Device initialization or playback-state failure
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Buffer submission failed during playback (fatal to the session)
    #[error("Buffer submission failed: {0}")]
    Submit(#[source] DeviceError),

    /// Processing engine failure
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Processing thread could not be started
    #[error("Failed to spawn processing thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// Processing thread panicked
    #[error("Processing thread panicked")]
    LoopPanicked,
}

/// Category of the last recorded error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// Configuration rejected at creation
    Config,
    /// Device initialization or state change
    Device,
    /// Buffer submission during playback
    Submit,
    /// Processing engine
    Engine,
    /// Operation not allowed in the current state
    Misuse,
    /// Processing thread spawn or panic
    Thread,
}

impl SessionError {
    pub fn kind(&self) -> SessionErrorKind {
        match self {
            SessionError::InvalidConfig(_) => SessionErrorKind::Config,
            SessionError::InvalidState { .. } => SessionErrorKind::Misuse,
            SessionError::Device(_) => SessionErrorKind::Device,
            SessionError::Submit(_) => SessionErrorKind::Submit,
            SessionError::Engine(_) => SessionErrorKind::Engine,
            SessionError::ThreadSpawn(_) | SessionError::LoopPanicked => SessionErrorKind::Thread,
        }
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;

    #[test]
    fn test_error_kinds() {
        let err = SessionError::Submit(DeviceError::Submit {
            direction: Direction::Output,
            reason: "gone".to_string(),
        });
        assert_eq!(err.kind(), SessionErrorKind::Submit);
        assert!(err.to_string().contains("gone"));

        let err = SessionError::InvalidState {
            operation: "start",
            state: SessionState::Playing,
        };
        assert_eq!(err.kind(), SessionErrorKind::Misuse);
        assert_eq!(err.to_string(), "Cannot start while session is Playing");

        let err: SessionError = EngineError::Process("boom".to_string()).into();
        assert_eq!(err.kind(), SessionErrorKind::Engine);
    }
}
