//! Data block pipeline for ultra-low-latency scenes.
//!
//! Mmap-style scenes bypass per-buffer notifications: blocks of the shared
//! region are queued in a FIFO and a background worker moves them between
//! the queue and the transfer hardware while the session's work-enabled
//! flag is set.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod block;
pub mod counters;
pub mod error;
pub mod transport;
pub mod worker;

pub use block::{BlockQueue, DataBlock};
pub use counters::BlockCounters;
pub use error::{PipelineError, PipelineResult};
pub use transport::BlockTransport;
pub use worker::{BlockCallback, Pipeline, PipelineConfig, PipelineDirection, PipelineStats};
