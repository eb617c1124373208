//! Built-in gain engine
//!
//! Routes input channel `c % input_channels` to output channel `c` and applies
//! a fixed gain. Produces silence while DSP is disabled or when the session has
//! no input. Useful for loopback checks and headless runs without libpd.

use std::path::Path;

use super::error::{EngineError, EngineResult};
use super::{AssetHandle, ProcessingEngine};
use crate::types::Sample;

/// Native block size, matching libpd's
const GAIN_BLOCK_SIZE: usize = 64;

pub struct GainEngine {
    gain: f32,
    input_channels: usize,
    output_channels: usize,
    dsp_enabled: bool,
}

impl GainEngine {
    pub fn new(gain: f32) -> Self {
        Self {
            gain,
            input_channels: 0,
            output_channels: 0,
            dsp_enabled: false,
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn is_dsp_enabled(&self) -> bool {
        self.dsp_enabled
    }
}

impl Default for GainEngine {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ProcessingEngine for GainEngine {
    fn name(&self) -> &str {
        "gain"
    }

    fn initialize(
        &mut self,
        input_channels: u32,
        output_channels: u32,
        _sample_rate: u32,
    ) -> EngineResult<()> {
        self.input_channels = input_channels as usize;
        self.output_channels = output_channels as usize;
        Ok(())
    }

    fn native_block_size(&self) -> usize {
        GAIN_BLOCK_SIZE
    }

    fn process(
        &mut self,
        block_count: usize,
        input: &[Sample],
        output: &mut [Sample],
    ) -> EngineResult<()> {
        let frames = block_count * GAIN_BLOCK_SIZE;
        if output.len() != frames * self.output_channels {
            return Err(EngineError::Process(format!(
                "output holds {} samples, expected {}",
                output.len(),
                frames * self.output_channels
            )));
        }
        if input.len() != frames * self.input_channels {
            return Err(EngineError::Process(format!(
                "input holds {} samples, expected {}",
                input.len(),
                frames * self.input_channels
            )));
        }

        if !self.dsp_enabled || self.input_channels == 0 {
            output.fill(0);
            return Ok(());
        }

        for (in_frame, out_frame) in input
            .chunks_exact(self.input_channels)
            .zip(output.chunks_exact_mut(self.output_channels))
        {
            for (c, out) in out_frame.iter_mut().enumerate() {
                let sample = in_frame[c % self.input_channels] as f32 * self.gain;
                *out = sample.clamp(Sample::MIN as f32, Sample::MAX as f32) as Sample;
            }
        }
        Ok(())
    }

    fn send_control_message(&mut self, enable_dsp: bool) -> EngineResult<()> {
        self.dsp_enabled = enable_dsp;
        log::debug!("GainEngine DSP {}", if enable_dsp { "on" } else { "off" });
        Ok(())
    }

    fn open_asset(&mut self, identifier: &str, location: &Path) -> EngineResult<AssetHandle> {
        Err(EngineError::AssetOpen {
            path: location.join(identifier),
            reason: "gain engine does not load assets".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_until_dsp_enabled() {
        let mut engine = GainEngine::new(2.0);
        assert_eq!(engine.gain(), 2.0);
        engine.initialize(1, 2, 44100).unwrap();

        let input = vec![100; 64];
        let mut output = vec![7; 128];
        engine.process(1, &input, &mut output).unwrap();
        assert!(output.iter().all(|&s| s == 0));
        assert!(!engine.is_dsp_enabled());

        engine.send_control_message(true).unwrap();
        assert!(engine.is_dsp_enabled());
        engine.process(1, &input, &mut output).unwrap();
        assert!(output.iter().all(|&s| s == 200));
    }

    #[test]
    fn test_channel_mapping_and_clipping() {
        let mut engine = GainEngine::new(4.0);
        engine.initialize(2, 2, 48000).unwrap();
        engine.send_control_message(true).unwrap();

        let input: Vec<Sample> = (0..64).flat_map(|_| [10_000, -5]).collect();
        let mut output = vec![0; 128];
        engine.process(1, &input, &mut output).unwrap();

        assert_eq!(output[0], Sample::MAX);
        assert_eq!(output[1], -20);
    }

    #[test]
    fn test_rejects_wrong_block_length() {
        let mut engine = GainEngine::default();
        engine.initialize(0, 2, 44100).unwrap();

        let mut output = vec![0; 100];
        assert!(matches!(
            engine.process(1, &[], &mut output),
            Err(EngineError::Process(_))
        ));
    }

    #[test]
    fn test_no_assets() {
        let mut engine = GainEngine::default();
        assert!(engine.open_asset("x.pd", Path::new("/tmp")).is_err());
    }
}
