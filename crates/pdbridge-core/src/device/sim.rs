//! Headless device adapter clocked by a timer thread
//!
//! `ClockedDevice` behaves like a buffer-queue audio device without touching
//! any hardware. A clock thread ticks once per block period and on every tick:
//!
//! - drains one queued output block (counted and peak-metered in
//!   [`SinkStats`]) and fires `on_output_buffer_consumed`
//! - when capture is enabled, synthesizes one block of test tone and fires
//!   `on_input_buffer_filled`
//!
//! Submitted output blocks travel to the clock thread through a lock-free
//! `rtrb` ring sized for [`DEVICE_QUEUE_DEPTH`] blocks.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};

use super::error::{DeviceError, DeviceResult};
use super::{DeviceAdapter, DeviceCallbacks};
use crate::types::{
    is_supported_sample_rate, Direction, PcmFormat, PlaybackState, Sample, DEVICE_QUEUE_DEPTH,
};

/// Frequency of the synthesized capture tone
const TEST_TONE_HZ: f32 = 440.0;

/// Amplitude of the synthesized capture tone (about -12 dBFS)
const TEST_TONE_AMPLITUDE: f32 = 8192.0;

/// Counters updated by the clock thread (lock-free reads)
#[derive(Debug, Default)]
pub struct SinkStats {
    blocks_played: AtomicU64,
    blocks_captured: AtomicU64,
    underruns: AtomicU64,
    peak: AtomicU32,
}

impl SinkStats {
    /// Output blocks drained by the clock
    pub fn blocks_played(&self) -> u64 {
        self.blocks_played.load(Ordering::Relaxed)
    }

    /// Input blocks synthesized by the clock
    pub fn blocks_captured(&self) -> u64 {
        self.blocks_captured.load(Ordering::Relaxed)
    }

    /// Ticks where no output block was queued
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Largest absolute sample value played so far
    pub fn peak(&self) -> u32 {
        self.peak.load(Ordering::Relaxed)
    }
}

/// Resources that exist between `open` and `release`
struct Realized {
    producer: rtrb::Producer<Sample>,
    output_block_len: usize,
    capture_enabled: bool,
    stop_tx: Sender<()>,
    clock: JoinHandle<()>,
}

/// Buffer-queue device emulated by a timer thread
pub struct ClockedDevice {
    block_frames: usize,
    playing: Arc<AtomicBool>,
    stats: Arc<SinkStats>,
    /// Most recent captured block (written by the clock, read by submit)
    capture: Arc<Mutex<Vec<Sample>>>,
    realized: Mutex<Option<Realized>>,
}

impl ClockedDevice {
    /// Create a device that exchanges `block_frames`-frame blocks
    pub fn new(block_frames: usize) -> Self {
        Self {
            block_frames: block_frames.max(1),
            playing: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SinkStats::default()),
            capture: Arc::new(Mutex::new(Vec::new())),
            realized: Mutex::new(None),
        }
    }

    /// Shared playback counters
    pub fn stats(&self) -> Arc<SinkStats> {
        self.stats.clone()
    }

    fn lock_realized(&self) -> std::sync::MutexGuard<'_, Option<Realized>> {
        self.realized.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceAdapter for ClockedDevice {
    fn name(&self) -> &str {
        "clocked"
    }

    fn open(
        &self,
        input: Option<PcmFormat>,
        output: PcmFormat,
        callbacks: DeviceCallbacks,
    ) -> DeviceResult<()> {
        if !is_supported_sample_rate(output.sample_rate) {
            return Err(DeviceError::UnsupportedSampleRate(output.sample_rate));
        }

        let mut realized = self.lock_realized();
        if realized.is_some() {
            return Err(DeviceError::Init("device already open".to_string()));
        }

        let output_block_len = self.block_frames * output.channels as usize;
        let (producer, consumer) = rtrb::RingBuffer::new(output_block_len * DEVICE_QUEUE_DEPTH);

        let capture_block_len = input.map_or(0, |f| self.block_frames * f.channels as usize);
        *self.capture.lock().unwrap_or_else(PoisonError::into_inner) =
            vec![0; capture_block_len];

        let (stop_tx, stop_rx) = channel::bounded(1);
        let clock = ClockThread {
            period: output.period(self.block_frames),
            output_block_len,
            input_format: input,
            consumer,
            callbacks,
            playing: self.playing.clone(),
            stats: self.stats.clone(),
            capture: self.capture.clone(),
            phase: 0.0,
        };

        let clock = thread::Builder::new()
            .name("pdbridge-clock".to_string())
            .spawn(move || clock.run(stop_rx))
            .map_err(|e| DeviceError::Init(format!("failed to spawn clock thread: {}", e)))?;

        log::info!(
            "ClockedDevice opened: {} out ch, {} in ch @ {}Hz, {} frames/block",
            output.channels,
            input.map_or(0, |f| f.channels),
            output.sample_rate,
            self.block_frames
        );

        *realized = Some(Realized {
            producer,
            output_block_len,
            capture_enabled: input.is_some(),
            stop_tx,
            clock,
        });

        Ok(())
    }

    fn submit(&self, direction: Direction, block: &mut [Sample]) -> DeviceResult<()> {
        let mut realized = self.lock_realized();
        let realized = realized.as_mut().ok_or(DeviceError::Released)?;

        match direction {
            Direction::Output => {
                if block.len() != realized.output_block_len {
                    return Err(DeviceError::Submit {
                        direction,
                        reason: format!(
                            "block length {} != {}",
                            block.len(),
                            realized.output_block_len
                        ),
                    });
                }
                let chunk = realized
                    .producer
                    .write_chunk_uninit(block.len())
                    .map_err(|e| DeviceError::Submit {
                        direction,
                        reason: format!("queue full: {}", e),
                    })?;
                chunk.fill_from_iter(block.iter().copied());
                Ok(())
            }
            Direction::Input => {
                if !realized.capture_enabled {
                    return Err(DeviceError::Submit {
                        direction,
                        reason: "capture disabled".to_string(),
                    });
                }
                let capture = self.capture.lock().unwrap_or_else(PoisonError::into_inner);
                let n = capture.len().min(block.len());
                block[..n].copy_from_slice(&capture[..n]);
                Ok(())
            }
        }
    }

    fn set_playback_state(&self, state: PlaybackState) -> DeviceResult<()> {
        if self.lock_realized().is_none() {
            return Err(DeviceError::Released);
        }
        self.playing
            .store(state == PlaybackState::Playing, Ordering::Release);
        log::debug!("ClockedDevice playback state: {:?}", state);
        Ok(())
    }

    fn release(&self) {
        let Some(realized) = self.lock_realized().take() else {
            return;
        };

        self.playing.store(false, Ordering::Release);
        let _ = realized.stop_tx.send(());
        if realized.clock.join().is_err() {
            log::error!("ClockedDevice clock thread panicked");
        }

        log::info!(
            "ClockedDevice released ({} blocks played, {} underruns)",
            self.stats.blocks_played(),
            self.stats.underruns()
        );
    }
}

impl Drop for ClockedDevice {
    fn drop(&mut self) {
        self.release();
    }
}

/// State owned by the clock thread
struct ClockThread {
    period: Duration,
    output_block_len: usize,
    input_format: Option<PcmFormat>,
    consumer: rtrb::Consumer<Sample>,
    callbacks: DeviceCallbacks,
    playing: Arc<AtomicBool>,
    stats: Arc<SinkStats>,
    capture: Arc<Mutex<Vec<Sample>>>,
    phase: f32,
}

impl ClockThread {
    fn run(mut self, stop_rx: Receiver<()>) {
        let ticker = channel::tick(self.period);
        log::debug!("Clock thread started ({:?} per block)", self.period);

        loop {
            crossbeam::select! {
                recv(stop_rx) -> _ => break,
                recv(ticker) -> _ => {
                    if self.playing.load(Ordering::Acquire) {
                        self.tick();
                    }
                }
            }
        }

        log::debug!("Clock thread stopped");
    }

    fn tick(&mut self) {
        match self.consumer.read_chunk(self.output_block_len) {
            Ok(chunk) => {
                let (first, second) = chunk.as_slices();
                let peak = first
                    .iter()
                    .chain(second)
                    .map(|s| s.unsigned_abs() as u32)
                    .max()
                    .unwrap_or(0);
                chunk.commit_all();

                self.stats.peak.fetch_max(peak, Ordering::Relaxed);
                self.stats.blocks_played.fetch_add(1, Ordering::Relaxed);
                self.callbacks.on_output_buffer_consumed();
            }
            Err(_) => {
                self.stats.underruns.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(format) = self.input_format {
            self.synthesize_capture(format);
            self.stats.blocks_captured.fetch_add(1, Ordering::Relaxed);
            self.callbacks.on_input_buffer_filled();
        }
    }

    fn synthesize_capture(&mut self, format: PcmFormat) {
        let channels = format.channels.max(1) as usize;
        let step = std::f32::consts::TAU * TEST_TONE_HZ / format.sample_rate as f32;

        let mut capture = self.capture.lock().unwrap_or_else(PoisonError::into_inner);
        for frame in capture.chunks_mut(channels) {
            let value = (self.phase.sin() * TEST_TONE_AMPLITUDE) as Sample;
            frame.fill(value);
            self.phase = (self.phase + step) % std::f32::consts::TAU;
        }
    }
}
