//! Synchronization between hardware callbacks and the processing loop
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐  signal_ready()   ┌──────────────────────┐
//! │  Hardware callback   │──────────────────►│  Readiness (input)   │
//! │  (input filled)      │                   │  Mutex<bool>+Condvar │
//! └──────────────────────┘                   └──────────┬───────────┘
//!                                                       │ wait_and_consume()
//!                                                       ▼
//!                                            ┌──────────────────────┐
//!                                            │   Processing loop    │
//!                                            └──────────▲───────────┘
//!                                                       │ wait_and_consume()
//! ┌──────────────────────┐  signal_ready()   ┌──────────┴───────────┐
//! │  Hardware callback   │──────────────────►│  Readiness (output)  │
//! │  (output consumed)   │                   │  Mutex<bool>+Condvar │
//! └──────────────────────┘                   └──────────────────────┘
//! ```
//!
//! Lifecycle operations stop the loop by clearing the shared running flag and
//! calling [`Readiness::interrupt`] on both coordinators.

mod readiness;

pub use readiness::{Readiness, WaitOutcome};
