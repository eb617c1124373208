//! Processing loop - runs on its own thread while the session is playing
//!
//! Each iteration:
//!
//! 1. wait for the input slot (skipped when capture is disabled)
//! 2. process `block_count` native blocks under the engine lock
//! 3. wait for the output slot
//! 4. submit the output block, then the input block
//! 5. flip both pairs
//!
//! Both readiness flags are primed at start, so the first iteration runs
//! without a device callback. Stop requests are observed at every wait.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use super::error::{SessionError, SessionResult};
use super::state::{LoopState, SessionShared};
use crate::buffer::BufferStore;
use crate::device::DeviceAdapter;
use crate::engine::ProcessingEngine;
use crate::sync::{Readiness, WaitOutcome};
use crate::types::Direction;

/// Engine shared between the lifecycle thread and the processing loop
pub(crate) type SharedEngine = Arc<Mutex<Box<dyn ProcessingEngine>>>;

/// What the loop thread hands back when it exits
pub(crate) struct LoopOutcome {
    /// The buffers, returned so a restart can reuse them
    pub store: BufferStore,
    /// Completed iterations, or the fatal error that ended the loop
    pub result: SessionResult<u64>,
}

pub(crate) struct ProcessingLoop {
    pub store: BufferStore,
    pub engine: SharedEngine,
    pub device: Arc<dyn DeviceAdapter>,
    pub input_ready: Option<Arc<Readiness>>,
    pub output_ready: Arc<Readiness>,
    pub shared: Arc<SessionShared>,
    pub block_count: usize,
}

impl ProcessingLoop {
    /// Spawn the loop on a named thread
    pub(crate) fn spawn(self) -> std::io::Result<JoinHandle<LoopOutcome>> {
        thread::Builder::new()
            .name("pdbridge-loop".to_string())
            .spawn(move || self.run())
    }

    fn run(mut self) -> LoopOutcome {
        self.shared.set_loop_state(LoopState::Running);
        log::debug!(
            "Processing loop started ({} native blocks per exchange)",
            self.block_count
        );

        let mut iterations: u64 = 0;
        let result = loop {
            if !self.shared.is_running() {
                break Ok(iterations);
            }
            match self.iterate(iterations == 0) {
                Ok(WaitOutcome::Proceed) => iterations += 1,
                Ok(WaitOutcome::Stop) => break Ok(iterations),
                Err(e) => break Err(e),
            }
        };

        self.shared.set_loop_state(LoopState::Stopping);
        match &result {
            Ok(iterations) => {
                log::debug!("Processing loop stopped after {} iterations", iterations);
            }
            Err(e) => self.shared.fault(e),
        }
        self.shared.set_loop_state(LoopState::Stopped);

        LoopOutcome {
            store: self.store,
            result,
        }
    }

    /// One exchange; `primed` is true on the first pass after start, when
    /// both readiness flags came from priming rather than the device
    fn iterate(&mut self, primed: bool) -> SessionResult<WaitOutcome> {
        let shared = &self.shared;
        let stop = || !shared.is_running();

        if let Some(input_ready) = &self.input_ready {
            if input_ready.wait_and_consume(stop) == WaitOutcome::Stop {
                return Ok(WaitOutcome::Stop);
            }
            if let Some(input) = self.store.input_mut() {
                let reclaimed = input.reclaim();
                debug_assert!(reclaimed != primed, "input signal without a held block");
            }
        }

        {
            let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
            let (input, output) = self.store.current_blocks();
            engine.process(self.block_count, input, output)?;
        }

        if self.output_ready.wait_and_consume(stop) == WaitOutcome::Stop {
            return Ok(WaitOutcome::Stop);
        }
        let reclaimed = self.store.output_mut().reclaim();
        debug_assert!(reclaimed != primed, "output signal without a held block");

        let output = self.store.output_mut();
        output.mark_submitted();
        self.device
            .submit(Direction::Output, output.current_mut().samples_mut())
            .map_err(SessionError::Submit)?;

        if let Some(input) = self.store.input_mut() {
            input.mark_submitted();
            self.device
                .submit(Direction::Input, input.current_mut().samples_mut())
                .map_err(SessionError::Submit)?;
        }

        self.store.output_mut().flip();
        if let Some(input) = self.store.input_mut() {
            input.flip();
        }

        Ok(WaitOutcome::Proceed)
    }
}
