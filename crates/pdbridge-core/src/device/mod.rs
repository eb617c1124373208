//! Device adapters: the hardware side of the exchange
//!
//! A [`DeviceAdapter`] plays and captures the blocks the processing loop
//! submits, and reports buffer completion through [`DeviceCallbacks`].
//!
//! # Contract
//!
//! - [`DeviceAdapter::open`] negotiates the PCM formats and registers the
//!   callbacks. The input hook is only registered when capture is enabled.
//! - [`DeviceAdapter::submit`] gets transient access to a block. The adapter
//!   copies what it needs before returning and never keeps a reference.
//! - Callbacks run in the backend's own context and only flip a readiness
//!   flag. They never block and never call into the processing engine.
//! - [`DeviceAdapter::release`] tears resources down in reverse acquisition
//!   order (player, mixer, engine) and is safe to call more than once.
//!
//! # Implementations
//!
//! - [`ClockedDevice`]: headless adapter clocked by a timer thread
//! - `CpalDevice`: hardware adapter over CPAL streams (`cpal-device` feature)

mod error;
mod sim;

#[cfg(feature = "cpal-device")]
mod cpal_device;

use std::sync::Arc;

use crate::sync::Readiness;
use crate::types::{Direction, PcmFormat, PlaybackState, Sample};

pub use error::{DeviceError, DeviceResult};
pub use sim::{ClockedDevice, SinkStats};

#[cfg(feature = "cpal-device")]
pub use cpal_device::CpalDevice;

/// Hooks a device invokes when a buffer slot frees up
///
/// Each hook forwards to the matching [`Readiness::signal_ready`]. Cloning is
/// cheap (two `Arc`s).
#[derive(Debug, Clone)]
pub struct DeviceCallbacks {
    output: Arc<Readiness>,
    input: Option<Arc<Readiness>>,
}

impl DeviceCallbacks {
    pub fn new(output: Arc<Readiness>, input: Option<Arc<Readiness>>) -> Self {
        Self { output, input }
    }

    /// The device finished playing one submitted output buffer
    #[inline]
    pub fn on_output_buffer_consumed(&self) {
        self.output.signal_ready();
    }

    /// The device finished capturing one input buffer
    ///
    /// No-op when capture is disabled.
    #[inline]
    pub fn on_input_buffer_filled(&self) {
        if let Some(input) = &self.input {
            input.signal_ready();
        }
    }

    /// Whether an input hook was registered
    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }
}

/// Platform audio endpoint consumed by a session
pub trait DeviceAdapter: Send + Sync {
    /// Human-readable backend name for logs
    fn name(&self) -> &str;

    /// Realize the device for the given formats and register the callbacks
    ///
    /// `input` is `None` when capture is disabled. Adapters with capture
    /// enabled start recording here.
    fn open(
        &self,
        input: Option<PcmFormat>,
        output: PcmFormat,
        callbacks: DeviceCallbacks,
    ) -> DeviceResult<()>;

    /// Enqueue a block
    ///
    /// For [`Direction::Output`] the adapter reads `block` for playback. For
    /// [`Direction::Input`] the adapter fills `block` from its capture queue.
    fn submit(&self, direction: Direction, block: &mut [Sample]) -> DeviceResult<()>;

    /// Transition the player between playing and paused
    fn set_playback_state(&self, state: PlaybackState) -> DeviceResult<()>;

    /// Tear down player, mixer and engine objects (idempotent)
    fn release(&self);
}
