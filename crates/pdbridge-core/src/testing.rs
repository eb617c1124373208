//! Instrumented device and engine doubles for session tests

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::device::{DeviceAdapter, DeviceCallbacks, DeviceError, DeviceResult};
use crate::engine::{AssetHandle, EngineError, EngineResult, ProcessingEngine};
use crate::types::{Direction, PcmFormat, PlaybackState, Sample};

/// Poll `condition` until it holds or two seconds pass
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// One call to [`DeviceAdapter::submit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitRecord {
    pub direction: Direction,
    /// Address of the submitted block, identifies the slot
    pub addr: usize,
    /// First sample of the block at submit time
    pub stamp: Sample,
}

#[derive(Default)]
struct MockDeviceLog {
    submits: Vec<SubmitRecord>,
    playback: Vec<PlaybackState>,
    input_hook: Option<bool>,
    releases: usize,
}

/// Device that records every interaction and is driven by hand
#[derive(Default)]
pub struct MockDevice {
    log: Mutex<MockDeviceLog>,
    callbacks: Mutex<Option<DeviceCallbacks>>,
    output_attempts: AtomicUsize,
    fail_output_at: Option<usize>,
    fail_open: bool,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th output submit (1-based)
    pub fn failing_output_at(n: usize) -> Self {
        Self {
            fail_output_at: Some(n),
            ..Self::default()
        }
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Simulate the hardware finishing one output buffer
    pub fn fire_output(&self) {
        if let Some(callbacks) = self.callbacks.lock().unwrap().as_ref() {
            callbacks.on_output_buffer_consumed();
        }
    }

    /// Simulate the hardware filling one input buffer
    pub fn fire_input(&self) {
        if let Some(callbacks) = self.callbacks.lock().unwrap().as_ref() {
            callbacks.on_input_buffer_filled();
        }
    }

    pub fn submits(&self, direction: Direction) -> Vec<SubmitRecord> {
        self.log
            .lock()
            .unwrap()
            .submits
            .iter()
            .filter(|r| r.direction == direction)
            .copied()
            .collect()
    }

    /// Output submit attempts, including a failed one
    pub fn output_submit_count(&self) -> usize {
        self.output_attempts.load(Ordering::SeqCst)
    }

    pub fn input_submit_count(&self) -> usize {
        self.submits(Direction::Input).len()
    }

    pub fn playback_states(&self) -> Vec<PlaybackState> {
        self.log.lock().unwrap().playback.clone()
    }

    /// Whether `open` registered an input hook; None before `open`
    pub fn input_hook_registered(&self) -> Option<bool> {
        self.log.lock().unwrap().input_hook
    }

    pub fn release_count(&self) -> usize {
        self.log.lock().unwrap().releases
    }
}

impl DeviceAdapter for MockDevice {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(
        &self,
        input: Option<PcmFormat>,
        _output: PcmFormat,
        callbacks: DeviceCallbacks,
    ) -> DeviceResult<()> {
        if self.fail_open {
            return Err(DeviceError::Init("mock open failure".to_string()));
        }
        assert_eq!(input.is_some(), callbacks.has_input());
        self.log.lock().unwrap().input_hook = Some(callbacks.has_input());
        *self.callbacks.lock().unwrap() = Some(callbacks);
        Ok(())
    }

    fn submit(&self, direction: Direction, block: &mut [Sample]) -> DeviceResult<()> {
        if direction == Direction::Output {
            let attempt = self.output_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_output_at == Some(attempt) {
                return Err(DeviceError::Submit {
                    direction,
                    reason: format!("injected failure on output submit {}", attempt),
                });
            }
        }
        self.log.lock().unwrap().submits.push(SubmitRecord {
            direction,
            addr: block.as_ptr() as usize,
            stamp: block.first().copied().unwrap_or_default(),
        });
        Ok(())
    }

    fn set_playback_state(&self, state: PlaybackState) -> DeviceResult<()> {
        self.log.lock().unwrap().playback.push(state);
        Ok(())
    }

    fn release(&self) {
        self.log.lock().unwrap().releases += 1;
    }
}

/// Counters shared between a [`MockEngine`] and the test
#[derive(Default)]
pub struct EngineCalls {
    process_calls: AtomicUsize,
    block_counts: Mutex<Vec<usize>>,
    controls: Mutex<Vec<bool>>,
    assets: Mutex<Vec<PathBuf>>,
}

impl EngineCalls {
    pub fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }

    pub fn block_counts(&self) -> Vec<usize> {
        self.block_counts.lock().unwrap().clone()
    }

    pub fn controls(&self) -> Vec<bool> {
        self.controls.lock().unwrap().clone()
    }

    pub fn assets(&self) -> Vec<PathBuf> {
        self.assets.lock().unwrap().clone()
    }
}

/// Engine that stamps output block `n` with the value `n`
pub struct MockEngine {
    calls: Arc<EngineCalls>,
    native_block_size: usize,
    fail_process_at: Option<usize>,
}

impl MockEngine {
    pub fn new(calls: Arc<EngineCalls>) -> Self {
        Self {
            calls,
            native_block_size: 64,
            fail_process_at: None,
        }
    }

    pub fn with_native_block_size(mut self, frames: usize) -> Self {
        self.native_block_size = frames;
        self
    }

    /// Fail the `n`th process call (1-based)
    pub fn failing_process_at(mut self, n: usize) -> Self {
        self.fail_process_at = Some(n);
        self
    }
}

impl ProcessingEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn initialize(&mut self, _in: u32, _out: u32, _rate: u32) -> EngineResult<()> {
        Ok(())
    }

    fn native_block_size(&self) -> usize {
        self.native_block_size
    }

    fn process(
        &mut self,
        block_count: usize,
        _input: &[Sample],
        output: &mut [Sample],
    ) -> EngineResult<()> {
        let n = self.calls.process_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.block_counts.lock().unwrap().push(block_count);
        if self.fail_process_at == Some(n) {
            return Err(EngineError::Process(format!("injected failure on call {}", n)));
        }
        output.fill(n as Sample);
        Ok(())
    }

    fn send_control_message(&mut self, enable_dsp: bool) -> EngineResult<()> {
        self.calls.controls.lock().unwrap().push(enable_dsp);
        Ok(())
    }

    fn open_asset(&mut self, identifier: &str, location: &Path) -> EngineResult<AssetHandle> {
        let mut assets = self.calls.assets.lock().unwrap();
        assets.push(location.join(identifier));
        Ok(AssetHandle(1000 + assets.len() as i32))
    }
}
