//! pdbridge-run - headless runner
//!
//! Loads a config, opens the configured device and engine, plays for
//! `run_seconds` and shuts down.
//!
//! ## Usage
//!
//! ```text
//! pdbridge-run [config.yaml]
//! ```
//!
//! Without an argument the config is read from the default path
//! (`~/.config/pdbridge/config.yaml`). Set `RUST_LOG=debug` for verbose output.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};

use pdbridge_core::config::{self, BridgeConfig, DeviceKind};
use pdbridge_core::{ClockedDevice, DeviceAdapter, ProcessingEngine, Session, SessionState};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("pdbridge-run failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);
    let config: BridgeConfig = config::load_config(&config_path);
    config
        .validate()
        .map_err(|reason| anyhow!("Invalid config {:?}: {}", config_path, reason))?;

    log::info!(
        "pdbridge-run starting: {:?} device, {} in / {} out @ {}Hz, {}s",
        config.device,
        config.input_channels,
        config.output_channels,
        config.sample_rate,
        config.run_seconds
    );

    let device = build_device(&config)?;
    let engine = build_engine();
    let mut session =
        Session::create_with_block_frames(config.channels(), config.block_frames, device, engine)
            .context("Failed to create session")?;

    if let Some(patch) = &config.patch {
        let handle = session
            .load_asset(&patch.name, &patch.dir)
            .with_context(|| format!("Failed to open patch {}", patch.name))?;
        log::info!("Patch {} opened (id {})", patch.name, handle.id());
    }

    session.start().context("Failed to start session")?;

    let deadline = Instant::now() + Duration::from_secs(config.run_seconds);
    while Instant::now() < deadline {
        std::thread::sleep(POLL_INTERVAL);
        if session.last_error().is_some() || session.state() == SessionState::Closed {
            break;
        }
    }

    let paused = session.pause();
    session.close();

    if let Some(kind) = session.last_error() {
        bail!("Session ended with {:?} error", kind);
    }
    paused.context("Failed to pause session")?;

    log::info!("pdbridge-run finished");
    Ok(())
}

fn build_device(config: &BridgeConfig) -> Result<Arc<dyn DeviceAdapter>> {
    match config.device {
        DeviceKind::Simulated => Ok(Arc::new(ClockedDevice::new(config.block_frames))),
        #[cfg(feature = "cpal-device")]
        DeviceKind::Cpal => Ok(Arc::new(pdbridge_core::device::CpalDevice::new(
            config.block_frames,
        ))),
        #[cfg(not(feature = "cpal-device"))]
        DeviceKind::Cpal => bail!("cpal device requested but built without the cpal-device feature"),
    }
}

#[cfg(feature = "pd-engine")]
fn build_engine() -> Box<dyn ProcessingEngine> {
    Box::new(pdbridge_core::engine::PdEngine::new())
}

#[cfg(not(feature = "pd-engine"))]
fn build_engine() -> Box<dyn ProcessingEngine> {
    log::info!("Built without pd-engine, using the gain engine");
    Box::new(pdbridge_core::GainEngine::default())
}
