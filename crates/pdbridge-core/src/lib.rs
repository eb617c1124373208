//! pdbridge core - double-buffered PCM exchange between an audio device and a
//! block-synchronous processing engine (Pure Data via libpd)
//!
//! ```ignore
//! use std::sync::Arc;
//! use pdbridge_core::{ChannelConfig, ClockedDevice, GainEngine, Session};
//!
//! let device = Arc::new(ClockedDevice::new(1024));
//! let mut session = Session::create(
//!     ChannelConfig::new(0, 2, 44100),
//!     device,
//!     Box::new(GainEngine::default()),
//! )?;
//! session.start()?;
//! // ...
//! session.pause()?;
//! session.close();
//! ```

pub mod buffer;
pub mod config;
pub mod device;
pub mod engine;
pub mod session;
pub mod sync;
pub mod types;

#[cfg(test)]
mod testing;

pub use device::{ClockedDevice, DeviceAdapter, DeviceCallbacks, DeviceError};
pub use engine::{AssetHandle, EngineError, GainEngine, ProcessingEngine};
pub use session::{LoopState, Session, SessionError, SessionErrorKind, SessionResult, SessionState};
pub use types::*;
