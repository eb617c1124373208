//! Processing engines: the software side of the exchange
//!
//! A [`ProcessingEngine`] transforms one input block into one output block,
//! synchronously, in units of its native block size. The session calls
//! [`ProcessingEngine::process`] only from the processing loop and holds the
//! engine lock for the duration, so control messages sent from the lifecycle
//! thread never interleave with a block.
//!
//! # Implementations
//!
//! - [`GainEngine`]: built-in channel-mapping gain stage
//! - `PdEngine`: Pure Data via libpd-rs (`pd-engine` feature)

mod error;
mod gain;

#[cfg(feature = "pd-engine")]
mod pd;

use std::path::Path;

use crate::types::Sample;

pub use error::{EngineError, EngineResult};
pub use gain::GainEngine;

#[cfg(feature = "pd-engine")]
pub use pd::PdEngine;

/// Handle to an asset opened by an engine (a patch's `$0` for Pure Data)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetHandle(pub i32);

impl AssetHandle {
    pub fn id(&self) -> i32 {
        self.0
    }
}

/// Block-synchronous signal-processing engine
pub trait ProcessingEngine: Send {
    /// Human-readable engine name for logs
    fn name(&self) -> &str;

    /// Configure channel counts and sample rate
    ///
    /// Called once during session creation, before any other method.
    fn initialize(
        &mut self,
        input_channels: u32,
        output_channels: u32,
        sample_rate: u32,
    ) -> EngineResult<()>;

    /// Frames the engine processes per tick
    fn native_block_size(&self) -> usize;

    /// Transform `block_count` native blocks
    ///
    /// `input` holds `block_count × native × input_channels` interleaved
    /// samples (empty when capture is disabled); `output` holds
    /// `block_count × native × output_channels`.
    fn process(
        &mut self,
        block_count: usize,
        input: &[Sample],
        output: &mut [Sample],
    ) -> EngineResult<()>;

    /// Enable or disable DSP computation
    fn send_control_message(&mut self, enable_dsp: bool) -> EngineResult<()>;

    /// Open an asset (patch) named `identifier` inside `location`
    fn open_asset(&mut self, identifier: &str, location: &Path) -> EngineResult<AssetHandle>;
}
