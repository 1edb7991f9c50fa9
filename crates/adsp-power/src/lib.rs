//! Power arbitration for the audio DSP.
//!
//! Any number of voters (stream sessions or reserved non-stream clients)
//! can ask for the DSP to stay powered. The DSP is powered on with the
//! first live vote and, unless disabled at runtime, powered off with the
//! last one.
//!
//! Over-release is tolerated: an `unregister` with nothing outstanding is
//! logged and ignored, never driving the live count below zero.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod controller;
pub mod manager;
pub mod vote;

pub use controller::{PowerController, PowerError, PowerResult};
pub use manager::{PowerStats, PowerVoteManager};
pub use vote::VoteRecord;
