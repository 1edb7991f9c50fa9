//! Shared test utilities for the audio DSP control-plane crates.
//!
//! - [`ScriptedDsp`]: the far end of the message channel, answering
//!   requests per function and pushing notifications on demand
//! - [`MockPowerController`], [`MockTransport`], [`ImmediateRepair`] and
//!   [`ManualRepair`]: recording stand-ins for the hardware collaborators
//! - [`must`] and friends: unwrap helpers that keep `unwrap()` out of tests
//!
//! This crate is a dev-dependency only.

pub mod dsp;
pub mod must;
pub mod power;
pub mod prelude;
pub mod repair;
pub mod trace;
pub mod transport;

pub use dsp::{Script, ScriptedDsp};
pub use must::{must, must_err, must_some, wait_until};
pub use power::MockPowerController;
pub use repair::{ImmediateRepair, ManualRepair};
pub use trace::init_test_tracing;
pub use transport::MockTransport;
