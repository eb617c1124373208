//! PdEngine - Pure Data processing engine via libpd-rs
//!
//! libpd processes audio in ticks of 64 frames. One exchanged block of
//! `block_frames` frames therefore runs `block_frames / 64` ticks per call.
//! DSP is toggled with the `pd dsp 0|1` message, and assets are `.pd` patches
//! opened from a directory.

use std::path::Path;
use std::sync::Once;

use libpd_rs::functions::receive::on_print;
use libpd_rs::functions::verbose_print_state;
use libpd_rs::{Pd, PdAudioContext};

use super::error::{EngineError, EngineResult};
use super::{AssetHandle, ProcessingEngine};
use crate::types::Sample;

/// Global flag to ensure print hook is only registered once
static PRINT_HOOK_INIT: Once = Once::new();

/// Route PD console output into the `log` facade
fn init_print_hook() {
    PRINT_HOOK_INIT.call_once(|| {
        verbose_print_state(true);

        on_print(|msg: &str| {
            let msg = msg.trim();
            if msg.is_empty() {
                return;
            }

            if msg.contains("error") || msg.contains("can't") || msg.contains("couldn't") {
                log::error!("[PD] {}", msg);
            } else if msg.contains("warning") || msg.contains("deprecated") {
                log::warn!("[PD] {}", msg);
            } else {
                log::info!("[PD] {}", msg);
            }
        });

        log::debug!("PD print hook initialized");
    });
}

/// Pure Data engine
///
/// libpd is initialized explicitly in [`ProcessingEngine::initialize`], never
/// at construction or load time.
pub struct PdEngine {
    pd: Option<Pd>,
    ctx: Option<PdAudioContext>,
    dsp_enabled: bool,
    open_patches: usize,
}

impl PdEngine {
    pub fn new() -> Self {
        Self {
            pd: None,
            ctx: None,
            dsp_enabled: false,
            open_patches: 0,
        }
    }

    /// Number of patches opened so far
    pub fn open_patch_count(&self) -> usize {
        self.open_patches
    }
}

impl Default for PdEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingEngine for PdEngine {
    fn name(&self) -> &str {
        "libpd"
    }

    fn initialize(
        &mut self,
        input_channels: u32,
        output_channels: u32,
        sample_rate: u32,
    ) -> EngineResult<()> {
        init_print_hook();

        let pd = Pd::init_and_configure(
            input_channels as i32,
            output_channels as i32,
            sample_rate as i32,
        )
        .map_err(|e| EngineError::Init {
            channels_in: input_channels,
            channels_out: output_channels,
            sample_rate,
            reason: format!("libpd init failed: {}", e),
        })?;

        log::info!(
            "PdEngine initialized: {} in / {} out @ {}Hz",
            input_channels,
            output_channels,
            sample_rate
        );

        self.ctx = Some(pd.audio_context());
        self.pd = Some(pd);
        Ok(())
    }

    fn native_block_size(&self) -> usize {
        libpd_rs::functions::block_size() as usize
    }

    fn process(
        &mut self,
        block_count: usize,
        input: &[Sample],
        output: &mut [Sample],
    ) -> EngineResult<()> {
        let (Some(pd), Some(ctx)) = (self.pd.as_ref(), self.ctx.as_ref()) else {
            return Err(EngineError::Process("libpd not initialized".to_string()));
        };
        pd.set_as_current();
        ctx.process_short(block_count as i32, input, output);
        Ok(())
    }

    fn send_control_message(&mut self, enable_dsp: bool) -> EngineResult<()> {
        let pd = self
            .pd
            .as_mut()
            .ok_or_else(|| EngineError::Control("libpd not initialized".to_string()))?;

        pd.activate_audio(enable_dsp)
            .map_err(|e| EngineError::Control(format!("pd dsp {}: {}", enable_dsp as u8, e)))?;

        self.dsp_enabled = enable_dsp;
        log::info!("[PD] DSP {}", if enable_dsp { "on" } else { "off" });
        Ok(())
    }

    fn open_asset(&mut self, identifier: &str, location: &Path) -> EngineResult<AssetHandle> {
        let path = location.join(identifier);
        if !path.exists() {
            return Err(EngineError::AssetNotFound(path));
        }

        let pd = self
            .pd
            .as_mut()
            .ok_or_else(|| EngineError::AssetOpen {
                path: path.clone(),
                reason: "libpd not initialized".to_string(),
            })?;

        pd.open_patch(&path).map_err(|e| EngineError::AssetOpen {
            path: path.clone(),
            reason: format!("{}", e),
        })?;

        let dollar_zero = pd.dollar_zero().map_err(|e| EngineError::AssetOpen {
            path: path.clone(),
            reason: format!("Failed to get $0: {}", e),
        })?;

        self.open_patches += 1;
        log::info!("[PD] Opened patch: {} ($0={})", path.display(), dollar_zero);

        Ok(AssetHandle(dollar_zero))
    }
}

impl Drop for PdEngine {
    fn drop(&mut self) {
        if self.dsp_enabled {
            let _ = self.send_control_message(false);
        }
        log::debug!("PdEngine dropped");
    }
}

// SAFETY: the libpd instance is only reached through `&mut self`, and the
// session serializes every call behind its engine mutex. Processing makes the
// instance current before touching it.
unsafe impl Send for PdEngine {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_engine_reports_errors() {
        let mut engine = PdEngine::new();
        let mut output = vec![0; 128];
        assert!(matches!(
            engine.process(1, &[], &mut output),
            Err(EngineError::Process(_))
        ));
        assert!(matches!(
            engine.send_control_message(true),
            Err(EngineError::Control(_))
        ));
    }

    #[test]
    fn test_missing_patch_is_not_found() {
        let mut engine = PdEngine::new();
        let result = engine.open_asset("missing.pd", Path::new("/nonexistent/patches"));
        assert!(matches!(result, Err(EngineError::AssetNotFound(_))));
        assert_eq!(engine.open_patch_count(), 0);
    }
}
