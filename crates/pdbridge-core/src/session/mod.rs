//! Session - owns the buffers, the processing loop and the lifecycle
//!
//! A [`Session`] binds one [`DeviceAdapter`] to one [`ProcessingEngine`] for a
//! fixed [`ChannelConfig`]. The owner drives it through
//! [`start`](Session::start), [`pause`](Session::pause) and
//! [`close`](Session::close); the processing loop runs on its own thread in
//! between.
//!
//! ```text
//!            create()          start()            pause()
//! Uninitialized ──► Initialized ──────► Playing ◄────────► Paused
//!                        │                 │       start()    │
//!                        └─────────────────┴──────────────────┴──► Closed
//!                                   close() / fatal loop error
//! ```
//!
//! The [`BufferStore`] moves into the loop thread on start and comes back
//! when the thread is joined.

mod error;
mod processing;
mod state;

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crate::buffer::BufferStore;
use crate::device::{DeviceAdapter, DeviceCallbacks};
use crate::engine::{AssetHandle, EngineError, ProcessingEngine};
use crate::sync::Readiness;
use crate::types::{ChannelConfig, Direction, PlaybackState, DEFAULT_BLOCK_FRAMES};

use processing::{LoopOutcome, ProcessingLoop, SharedEngine};
use state::SessionShared;

pub use error::{SessionError, SessionErrorKind, SessionResult};
pub use state::{LoopState, SessionState};

/// A running bridge between a device and a processing engine
pub struct Session {
    config: ChannelConfig,
    block_frames: usize,
    block_count: usize,
    device: Arc<dyn DeviceAdapter>,
    engine: SharedEngine,
    input_ready: Option<Arc<Readiness>>,
    output_ready: Arc<Readiness>,
    shared: Arc<SessionShared>,
    /// Present while the loop is not running
    store: Option<BufferStore>,
    worker: Option<JoinHandle<LoopOutcome>>,
    released: bool,
}

impl Session {
    /// Create a session with [`DEFAULT_BLOCK_FRAMES`] frames per block
    pub fn create(
        config: ChannelConfig,
        device: Arc<dyn DeviceAdapter>,
        engine: Box<dyn ProcessingEngine>,
    ) -> SessionResult<Self> {
        Self::create_with_block_frames(config, DEFAULT_BLOCK_FRAMES, device, engine)
    }

    /// Create a session exchanging blocks of `block_frames` frames
    ///
    /// Validates the configuration, initializes the engine, opens the device
    /// and allocates the buffers. On failure nothing stays open.
    pub fn create_with_block_frames(
        config: ChannelConfig,
        block_frames: usize,
        device: Arc<dyn DeviceAdapter>,
        mut engine: Box<dyn ProcessingEngine>,
    ) -> SessionResult<Self> {
        config.validate().map_err(SessionError::InvalidConfig)?;
        if block_frames == 0 {
            return Err(SessionError::InvalidConfig(
                "block_frames must be non-zero".to_string(),
            ));
        }
        let output_format = config.pcm_format(Direction::Output).ok_or_else(|| {
            SessionError::InvalidConfig("output channel count must be at least 1".to_string())
        })?;

        engine.initialize(config.input_channels, config.output_channels, config.sample_rate)?;

        let native = engine.native_block_size();
        if native == 0 || block_frames % native != 0 {
            return Err(EngineError::BlockSize {
                block_frames,
                native,
            }
            .into());
        }
        let block_count = block_frames / native;

        let output_ready = Arc::new(Readiness::new(Direction::Output));
        let input_ready = config
            .input_enabled()
            .then(|| Arc::new(Readiness::new(Direction::Input)));
        let callbacks = DeviceCallbacks::new(output_ready.clone(), input_ready.clone());

        device.open(config.pcm_format(Direction::Input), output_format, callbacks)?;

        let store = BufferStore::new(block_frames, config.input_channels, config.output_channels);

        let shared = Arc::new(SessionShared::new());
        shared.set_state(SessionState::Initialized);

        log::info!(
            "Session created: {} in / {} out @ {}Hz ({} frames, device={}, engine={})",
            config.input_channels,
            config.output_channels,
            config.sample_rate,
            block_frames,
            device.name(),
            engine.name()
        );

        Ok(Self {
            config,
            block_frames,
            block_count,
            device,
            engine: Arc::new(Mutex::new(engine)),
            input_ready,
            output_ready,
            shared,
            store: Some(store),
            worker: None,
            released: false,
        })
    }

    pub fn config(&self) -> ChannelConfig {
        self.config
    }

    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// Native engine blocks per exchanged block
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn loop_state(&self) -> LoopState {
        self.shared.loop_state()
    }

    /// Kind of the most recent error, if any
    pub fn last_error(&self) -> Option<SessionErrorKind> {
        self.shared.last_error()
    }

    /// Start (or resume) the exchange
    ///
    /// Allowed from Initialized or Paused. Zeroes the buffers, primes both
    /// readiness flags, launches the loop, sets the device playing and
    /// enables DSP.
    pub fn start(&mut self) -> SessionResult<()> {
        let state = self.state();
        if !matches!(state, SessionState::Initialized | SessionState::Paused) {
            if state == SessionState::Closed {
                self.close();
            }
            return Err(self.reject("start", state));
        }

        let mut store = match self.store.take() {
            Some(store) => store,
            None => return Err(self.reject("start", state)),
        };
        store.reset();

        self.output_ready.prime();
        if let Some(input_ready) = &self.input_ready {
            input_ready.prime();
        }
        self.shared.set_running(true);

        let processing = ProcessingLoop {
            store,
            engine: self.engine.clone(),
            device: self.device.clone(),
            input_ready: self.input_ready.clone(),
            output_ready: self.output_ready.clone(),
            shared: self.shared.clone(),
            block_count: self.block_count,
        };
        match processing.spawn() {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => {
                let err = SessionError::ThreadSpawn(e);
                self.shared.fault(&err);
                self.release_resources();
                return Err(err);
            }
        }

        if let Err(e) = self.device.set_playback_state(PlaybackState::Playing) {
            self.halt_loop();
            return Err(self.fail(e.into()));
        }
        if let Err(e) = self.compute_audio(true) {
            self.halt_loop();
            if let Err(pause_err) = self.device.set_playback_state(PlaybackState::Paused) {
                log::warn!("Failed to pause device after start failure: {}", pause_err);
            }
            return Err(e);
        }

        if !self.shared.transition(state, SessionState::Playing) {
            // The loop faulted before the transition
            let err = self.halt_loop().unwrap_or(SessionError::InvalidState {
                operation: "start",
                state: self.state(),
            });
            return Err(err);
        }

        log::info!("Session started");
        Ok(())
    }

    /// Stop the loop and pause the device
    ///
    /// Returns promptly even when the loop is blocked waiting for the device.
    /// A no-op unless the session is playing.
    pub fn pause(&mut self) -> SessionResult<()> {
        let state = self.state();
        if state != SessionState::Playing {
            log::debug!("Pause ignored while {:?}", state);
            if state == SessionState::Closed {
                // Reap a loop that faulted and release the device
                self.close();
            }
            return Ok(());
        }

        if let Some(err) = self.halt_loop() {
            return Err(err);
        }
        self.shared.set_state(SessionState::Paused);

        self.device
            .set_playback_state(PlaybackState::Paused)
            .map_err(|e| self.fail(e.into()))?;

        log::info!("Session paused");
        Ok(())
    }

    /// Stop the loop, release the device and drop the buffers
    ///
    /// Safe to call repeatedly; calls after the first do nothing.
    pub fn close(&mut self) {
        if self.released {
            return;
        }
        if let Some(err) = self.halt_loop() {
            log::warn!("Processing loop ended with error: {}", err);
        }
        self.release_resources();
        log::info!("Session closed");
    }

    /// Enable or disable DSP in the engine
    pub fn compute_audio(&self, enable: bool) -> SessionResult<()> {
        let state = self.state();
        if state == SessionState::Closed {
            return Err(self.reject("compute audio", state));
        }
        self.engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send_control_message(enable)
            .map_err(|e| self.fail(e.into()))
    }

    /// Open an engine asset (a patch) named `identifier` inside `location`
    pub fn load_asset(&self, identifier: &str, location: &Path) -> SessionResult<AssetHandle> {
        let state = self.state();
        if state == SessionState::Closed {
            return Err(self.reject("load asset", state));
        }
        self.engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .open_asset(identifier, location)
            .map_err(|e| self.fail(e.into()))
    }

    /// Clear the running flag, wake both waits and join the loop thread
    ///
    /// Returns the loop's fatal error, if it ended with one. The buffers come
    /// back into the session on a clean exit.
    fn halt_loop(&mut self) -> Option<SessionError> {
        self.shared.set_running(false);
        if let Some(input_ready) = &self.input_ready {
            input_ready.interrupt();
        }
        self.output_ready.interrupt();

        let worker = self.worker.take()?;
        match worker.join() {
            Ok(LoopOutcome { store, result }) => match result {
                Ok(_) => {
                    self.store = Some(store);
                    None
                }
                Err(e) => Some(e),
            },
            Err(_) => {
                let err = SessionError::LoopPanicked;
                self.shared.fault(&err);
                Some(err)
            }
        }
    }

    fn release_resources(&mut self) {
        self.device.release();
        self.store = None;
        self.shared.set_state(SessionState::Closed);
        self.released = true;
    }

    fn reject(&self, operation: &'static str, state: SessionState) -> SessionError {
        self.fail(SessionError::InvalidState { operation, state })
    }

    fn fail(&self, err: SessionError) -> SessionError {
        log::error!("Session error: {}", err);
        self.shared.record(err.kind());
        err
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
