//! CPAL hardware device adapter
//!
//! Bridges the push-style buffer queue expected by the session onto CPAL's
//! pull-style stream callbacks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  submit(Output)   ┌─────────────────────┐
//! │ Processing loop  │──────────────────►│  Playback ring      │
//! │                  │                   │  (rtrb, 2 blocks)   │
//! └──────────────────┘                   └──────────┬──────────┘
//!          ▲                                        │ pop (output callback)
//!          │ submit(Input)                          ▼
//! ┌────────┴─────────┐                   ┌─────────────────────┐
//! │  Capture ring    │◄──────────────────│  CPAL stream thread │
//! │  (rtrb)          │  push (input cb)  │  fires per-block    │
//! └──────────────────┘                   │  readiness hooks    │
//!                                        └─────────────────────┘
//! ```
//!
//! CPAL streams are not `Send` on every platform, so they live on a dedicated
//! owner thread that takes playback-state commands over a crossbeam channel.

use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample as _;
use cpal::{FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam::channel::{self, Receiver, Sender};

use super::error::{DeviceError, DeviceResult};
use super::{DeviceAdapter, DeviceCallbacks};
use crate::types::{
    is_supported_sample_rate, Direction, PcmFormat, PlaybackState, Sample, DEVICE_QUEUE_DEPTH,
};

/// Capture ring capacity in blocks (absorbs scheduling jitter)
const CAPTURE_RING_BLOCKS: usize = 4;

/// Commands handled by the stream owner thread
enum StreamCommand {
    SetState(PlaybackState, Sender<DeviceResult<()>>),
    Release,
}

struct Realized {
    producer: rtrb::Producer<Sample>,
    capture: Option<rtrb::Consumer<Sample>>,
    output_block_len: usize,
    commands: Sender<StreamCommand>,
    owner: JoinHandle<()>,
}

/// Hardware device adapter over CPAL default (or named) devices
pub struct CpalDevice {
    block_frames: usize,
    device_name: Option<String>,
    realized: Mutex<Option<Realized>>,
}

impl CpalDevice {
    pub fn new(block_frames: usize) -> Self {
        Self {
            block_frames: block_frames.max(1),
            device_name: None,
            realized: Mutex::new(None),
        }
    }

    /// Select devices by name instead of the host defaults
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    fn lock_realized(&self) -> std::sync::MutexGuard<'_, Option<Realized>> {
        self.realized.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceAdapter for CpalDevice {
    fn name(&self) -> &str {
        "cpal"
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
        let (producer, playback) = rtrb::RingBuffer::new(output_block_len * DEVICE_QUEUE_DEPTH);

        let (capture_tx, capture_rx) = match input {
            Some(format) => {
                let len = self.block_frames * format.channels as usize;
                let (tx, rx) = rtrb::RingBuffer::new(len * CAPTURE_RING_BLOCKS);
                (Some(tx), Some(rx))
            }
            None => (None, None),
        };

        let (command_tx, command_rx) = channel::unbounded();
        let (ready_tx, ready_rx) = channel::bounded(1);
        let block_frames = self.block_frames;
        let device_name = self.device_name.clone();

        let owner = thread::Builder::new()
            .name("pdbridge-cpal".to_string())
            .spawn(move || {
                let streams = build_streams(
                    device_name.as_deref(),
                    block_frames,
                    input,
                    output,
                    playback,
                    capture_tx,
                    callbacks,
                );
                match streams {
                    Ok(streams) => {
                        let _ = ready_tx.send(Ok(()));
                        run_stream_owner(streams, command_rx);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| DeviceError::Init(format!("failed to spawn stream thread: {}", e)))?;

        let built = ready_rx
            .recv()
            .map_err(|_| DeviceError::Init("stream thread exited during setup".to_string()))?;
        if let Err(e) = built {
            let _ = owner.join();
            return Err(e);
        }

        log::info!(
            "CpalDevice opened: {} out ch, {} in ch @ {}Hz, {} frames/block",
            output.channels,
            input.map_or(0, |f| f.channels),
            output.sample_rate,
            self.block_frames
        );

        *realized = Some(Realized {
            producer,
            capture: capture_rx,
            output_block_len,
            commands: command_tx,
            owner,
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
                let capture = realized.capture.as_mut().ok_or_else(|| DeviceError::Submit {
                    direction,
                    reason: "capture disabled".to_string(),
                })?;

                // Copy what has been captured; zero-fill on overrun of the reader
                let available = capture.slots().min(block.len());
                if let Ok(chunk) = capture.read_chunk(available) {
                    let (first, second) = chunk.as_slices();
                    block[..first.len()].copy_from_slice(first);
                    block[first.len()..available].copy_from_slice(second);
                    chunk.commit_all();
                }
                block[available..].fill(0);
                Ok(())
            }
        }
    }

    fn set_playback_state(&self, state: PlaybackState) -> DeviceResult<()> {
        let commands = {
            let realized = self.lock_realized();
            realized
                .as_ref()
                .ok_or(DeviceError::Released)?
                .commands
                .clone()
        };

        let (reply_tx, reply_rx) = channel::bounded(1);
        commands
            .send(StreamCommand::SetState(state, reply_tx))
            .map_err(|_| DeviceError::PlaybackState("stream thread gone".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| DeviceError::PlaybackState("stream thread gone".to_string()))?
    }

    fn release(&self) {
        let Some(realized) = self.lock_realized().take() else {
            return;
        };

        let _ = realized.commands.send(StreamCommand::Release);
        if realized.owner.join().is_err() {
            log::error!("CPAL stream thread panicked");
        }
        log::info!("CpalDevice released");
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.release();
    }
}

/// Streams held by the owner thread; dropped output-first
struct Streams {
    output: Stream,
    input: Option<Stream>,
}

fn run_stream_owner(streams: Streams, commands: Receiver<StreamCommand>) {
    let Streams { output, input } = streams;

    for command in commands.iter() {
        match command {
            StreamCommand::SetState(state, reply) => {
                let result = match state {
                    PlaybackState::Playing => output.play().map_err(|e| e.to_string()),
                    PlaybackState::Paused => output.pause().map_err(|e| e.to_string()),
                };
                let _ = reply.send(result.map_err(DeviceError::PlaybackState));
            }
            StreamCommand::Release => break,
        }
    }

    // Player first, then recorder; the host goes with the thread
    drop(output);
    drop(input);
    log::debug!("CPAL streams dropped");
}

fn find_device(
    host: &cpal::Host,
    name: Option<&str>,
    direction: Direction,
) -> DeviceResult<cpal::Device> {
    let found = match (name, direction) {
        (Some(name), Direction::Output) => host
            .output_devices()
            .map_err(|e| DeviceError::Init(e.to_string()))?
            .find(|d| d.name().ok().as_deref() == Some(name)),
        (Some(name), Direction::Input) => host
            .input_devices()
            .map_err(|e| DeviceError::Init(e.to_string()))?
            .find(|d| d.name().ok().as_deref() == Some(name)),
        (None, Direction::Output) => host.default_output_device(),
        (None, Direction::Input) => host.default_input_device(),
    };

    found.ok_or_else(|| {
        DeviceError::Init(format!(
            "no {} device{}",
            direction,
            name.map(|n| format!(" named '{}'", n)).unwrap_or_default()
        ))
    })
}

fn stream_config(format: PcmFormat) -> StreamConfig {
    StreamConfig {
        channels: format.channels as u16,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

fn build_streams(
    device_name: Option<&str>,
    block_frames: usize,
    input: Option<PcmFormat>,
    output: PcmFormat,
    playback: rtrb::Consumer<Sample>,
    capture: Option<rtrb::Producer<Sample>>,
    callbacks: DeviceCallbacks,
) -> DeviceResult<Streams> {
    let host = cpal::default_host();

    let out_device = find_device(&host, device_name, Direction::Output)?;
    log::info!(
        "Using output device: {}",
        out_device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    let out_format = out_device
        .default_output_config()
        .map_err(|e| DeviceError::Init(e.to_string()))?
        .sample_format();

    let player = PlayerState {
        ring: playback,
        block_len: block_frames * output.channels as usize,
        drained: 0,
        callbacks: callbacks.clone(),
    };
    let output_stream = match out_format {
        SampleFormat::I16 => build_output::<i16>(&out_device, output, player),
        SampleFormat::F32 => build_output::<f32>(&out_device, output, player),
        other => Err(DeviceError::UnsupportedFormat(format!("{:?}", other))),
    }?;
    // Player stays silent until the session starts it
    output_stream
        .pause()
        .map_err(|e| DeviceError::Stream(format!("player: {}", e)))?;

    let input_stream = match (input, capture) {
        (Some(format), Some(ring)) => {
            let in_device = find_device(&host, device_name, Direction::Input)?;
            let in_format = in_device
                .default_input_config()
                .map_err(|e| DeviceError::Init(e.to_string()))?
                .sample_format();
            let recorder = RecorderState {
                ring,
                block_len: block_frames * format.channels as usize,
                filled: 0,
                callbacks,
            };
            let stream = match in_format {
                SampleFormat::I16 => build_input::<i16>(&in_device, format, recorder),
                SampleFormat::F32 => build_input::<f32>(&in_device, format, recorder),
                other => Err(DeviceError::UnsupportedFormat(format!("{:?}", other))),
            }?;
            // The recorder runs from open onwards
            stream
                .play()
                .map_err(|e| DeviceError::Stream(format!("recorder: {}", e)))?;
            Some(stream)
        }
        _ => None,
    };

    Ok(Streams {
        output: output_stream,
        input: input_stream,
    })
}

/// Output callback state: drains the playback ring, signals per block
struct PlayerState {
    ring: rtrb::Consumer<Sample>,
    block_len: usize,
    drained: usize,
    callbacks: DeviceCallbacks,
}

impl PlayerState {
    fn fill<T>(&mut self, data: &mut [T])
    where
        T: SizedSample + FromSample<Sample>,
    {
        let available = self.ring.slots().min(data.len());
        if let Ok(chunk) = self.ring.read_chunk(available) {
            let (first, second) = chunk.as_slices();
            for (dst, &src) in data.iter_mut().zip(first.iter().chain(second)) {
                *dst = T::from_sample(src);
            }
            chunk.commit_all();
        }
        // Underrun: pad with silence
        for dst in &mut data[available..] {
            *dst = T::EQUILIBRIUM;
        }

        self.drained += available;
        while self.drained >= self.block_len {
            self.drained -= self.block_len;
            self.callbacks.on_output_buffer_consumed();
        }
    }
}

/// Input callback state: fills the capture ring, signals per block
struct RecorderState {
    ring: rtrb::Producer<Sample>,
    block_len: usize,
    filled: usize,
    callbacks: DeviceCallbacks,
}

impl RecorderState {
    fn push<T>(&mut self, data: &[T])
    where
        T: SizedSample,
        Sample: FromSample<T>,
    {
        // Overrun: drop what doesn't fit
        let n = self.ring.slots().min(data.len());
        if let Ok(chunk) = self.ring.write_chunk_uninit(n) {
            chunk.fill_from_iter(data.iter().map(|&s| Sample::from_sample(s)));
        }

        self.filled += n;
        while self.filled >= self.block_len {
            self.filled -= self.block_len;
            self.callbacks.on_input_buffer_filled();
        }
    }
}

fn build_output<T>(
    device: &cpal::Device,
    format: PcmFormat,
    mut player: PlayerState,
) -> DeviceResult<Stream>
where
    T: SizedSample + FromSample<Sample>,
{
    device
        .build_output_stream(
            &stream_config(format),
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| player.fill(data),
            |e| log::error!("Audio output stream error: {}", e),
            None,
        )
        .map_err(|e| DeviceError::Init(format!("output stream: {}", e)))
}

fn build_input<T>(
    device: &cpal::Device,
    format: PcmFormat,
    mut recorder: RecorderState,
) -> DeviceResult<Stream>
where
    T: SizedSample,
    Sample: FromSample<T>,
{
    device
        .build_input_stream(
            &stream_config(format),
            move |data: &[T], _: &cpal::InputCallbackInfo| recorder.push(data),
            |e| log::error!("Audio input stream error: {}", e),
            None,
        )
        .map_err(|e| DeviceError::Init(format!("input stream: {}", e)))
}
