//! Session and processing-loop state shared across threads
//!
//! The lifecycle thread drives [`SessionState`] transitions; the processing
//! loop only reads the running flag, except when it hits a fatal error and
//! moves the session to [`SessionState::Closed`] itself.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use super::error::{SessionError, SessionErrorKind};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Uninitialized = 0,
    Initialized = 1,
    Playing = 2,
    Paused = 3,
    /// Terminal; device and buffer resources are released
    Closed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Uninitialized,
            1 => SessionState::Initialized,
            2 => SessionState::Playing,
            3 => SessionState::Paused,
            _ => SessionState::Closed,
        }
    }
}

/// State of the processing loop thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    /// Not started yet
    Idle = 0,
    Running = 1,
    /// Stop observed, unwinding
    Stopping = 2,
    /// Thread has exited
    Stopped = 3,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LoopState::Idle,
            1 => LoopState::Running,
            2 => LoopState::Stopping,
            _ => LoopState::Stopped,
        }
    }
}

/// Atomics shared by the session owner and the processing loop
#[derive(Debug)]
pub(crate) struct SessionShared {
    state: AtomicU8,
    loop_state: AtomicU8,
    running: AtomicBool,
    last_error: Mutex<Option<SessionErrorKind>>,
}

impl SessionShared {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Uninitialized as u8),
            loop_state: AtomicU8::new(LoopState::Idle as u8),
            running: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; fails if another thread changed the state
    pub(crate) fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn loop_state(&self) -> LoopState {
        LoopState::from_u8(self.loop_state.load(Ordering::Acquire))
    }

    pub(crate) fn set_loop_state(&self, state: LoopState) {
        self.loop_state.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn record(&self, kind: SessionErrorKind) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(kind);
    }

    pub(crate) fn last_error(&self) -> Option<SessionErrorKind> {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a fatal error and close the session
    pub(crate) fn fault(&self, error: &SessionError) {
        log::error!("Session fault: {}", error);
        self.record(error.kind());
        self.set_running(false);
        self.set_state(SessionState::Closed);
    }
}
