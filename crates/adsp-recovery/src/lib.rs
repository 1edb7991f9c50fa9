//! Crash recovery for the audio DSP.
//!
//! When the coprocessor faults, every in-flight session has to be quiesced
//! before the firmware is reloaded and resurrected afterwards. This crate
//! owns the ordered list of recovery actions, the global unreachable flag
//! and the repair handshake; it knows nothing about sessions itself.
//!
//! ```
//! use std::sync::Arc;
//! use adsp_recovery::prelude::*;
//!
//! struct Instant;
//! impl RepairService for Instant {
//!     fn request_repair(&self, ticket: RepairTicket) -> RecoveryResult<()> {
//!         ticket.confirm();
//!         Ok(())
//!     }
//! }
//!
//! let orch = RecoveryOrchestrator::new(RecoveryConfig::default(), DspReachability::new(), Arc::new(Instant));
//! orch.register(RecoveryAction::new("log").on_post(|| println!("back")));
//! assert!(orch.recover().is_ok());
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod action;
pub mod error;
pub mod orchestrator;
pub mod prelude;
pub mod reachability;

pub use action::{ActionHandle, RecoveryAction, RecoveryHook};
pub use error::{RecoveryError, RecoveryResult};
pub use orchestrator::{
    RecoveryConfig, RecoveryOrchestrator, RecoveryStats, RecoveryStatus, RepairOutcome,
    RepairService, RepairTicket,
};
pub use reachability::DspReachability;
