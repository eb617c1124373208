//! Readiness flag + condition variable handshake
//!
//! One [`Readiness`] exists per direction. Hardware callbacks call
//! [`Readiness::signal_ready`] (O(1), never blocks for longer than the
//! uncontended mutex), and the processing loop parks in
//! [`Readiness::wait_and_consume`] until a slot is available or a stop is
//! requested.
//!
//! The flag is deliberately a bool, not a counter: several rapid callbacks
//! coalesce into a single wake, since the loop handles exactly one block per
//! iteration.

use std::sync::{Condvar, Mutex, PoisonError};

use crate::types::Direction;

/// Result of a readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A slot was available; the flag has been consumed
    Proceed,
    /// A stop was requested; the flag was left untouched
    Stop,
}

/// Per-direction readiness flag guarded by a mutex and paired with a condvar
#[derive(Debug)]
pub struct Readiness {
    direction: Direction,
    ready: Mutex<bool>,
    condvar: Condvar,
}

impl Readiness {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            ready: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Mark a slot as available and wake one waiter
    ///
    /// Called from hardware-callback context.
    #[inline]
    pub fn signal_ready(&self) {
        {
            let mut ready = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
            *ready = true;
        }
        self.condvar.notify_one();
    }

    /// Preset the flag so the first wait after start proceeds immediately
    pub fn prime(&self) {
        self.signal_ready();
    }

    /// Current flag value (diagnostics and tests)
    pub fn is_ready(&self) -> bool {
        *self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake every waiter so it re-evaluates its stop predicate
    ///
    /// The caller must publish the stop condition before calling this. Taking
    /// the mutex here orders the notification after any waiter's predicate
    /// check, so the wake-up cannot be lost.
    pub fn interrupt(&self) {
        drop(self.ready.lock().unwrap_or_else(PoisonError::into_inner));
        self.condvar.notify_all();
    }

    /// Block until the flag is set or `stop` returns true
    ///
    /// On [`WaitOutcome::Proceed`] the flag has been cleared. On
    /// [`WaitOutcome::Stop`] the flag keeps its value. `stop` is evaluated
    /// under the mutex on every wake-up.
    pub fn wait_and_consume<F>(&self, stop: F) -> WaitOutcome
    where
        F: Fn() -> bool,
    {
        let mut ready = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        while !*ready && !stop() {
            ready = self
                .condvar
                .wait(ready)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if stop() {
            return WaitOutcome::Stop;
        }

        *ready = false;
        WaitOutcome::Proceed
    }
}
