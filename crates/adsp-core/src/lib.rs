//! Audio DSP control plane.
//!
//! [`AudioCore`] drives audio streams that run on a remote DSP: it keeps
//! the registry of stream sessions, runs each session's lifecycle state
//! machine over a request/reply message channel, moves data through a
//! shared transfer region, holds power votes while streams are active and
//! takes part in subsystem restart.
//!
//! # Architecture
//!
//! - [`config`]: timeouts and limits, serde-loadable
//! - [`state`]: the per-session transition table
//! - [`region`]: shared transfer region and its head record
//! - `registry` / `session`: session table and per-session state
//! - `lifecycle`, `control`, `data`: the operations on a session
//! - `dispatch`: inbound frames from the DSP
//! - `recovery`: fault handling and the restart hooks
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use adsp_core::{AudioCore, HeapRegion, StreamConfig};
//! use adsp_power::PowerController;
//! use adsp_protocol::{MessageChannel, RegionDescriptor, RouteId, SampleFormat, SessionId};
//! use adsp_recovery::RepairService;
//!
//! fn play(
//!     channel: Arc<dyn MessageChannel>,
//!     power: Arc<dyn PowerController>,
//!     repair: Arc<dyn RepairService>,
//! ) -> adsp_errors::Result<()> {
//!     let core = AudioCore::builder()
//!         .channel(channel)
//!         .power(power)
//!         .repair(repair)
//!         .build()?;
//!
//!     let session = core.alloc(SessionId::from_raw(0x0901))?;
//!     let region = RegionDescriptor { base: 0x8000_0000, block_size: 4096, block_count: 4 };
//!     let config = StreamConfig::new(
//!         SampleFormat::pcm(48_000, 2, 16),
//!         RouteId(1),
//!         region,
//!         Arc::new(HeapRegion::new(4096 * 4)),
//!     );
//!     core.startup(&session, config)?;
//!     core.start(&session)?;
//!     core.write(&session, &[0u8; 8192])?;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod config;
mod context;
mod control;
mod data;
mod dispatch;
mod lifecycle;
mod pending;
pub mod prelude;
mod recovery;
pub mod region;
mod registry;
mod session;
pub mod state;

pub use config::{CoreConfig, CoreConfigBuilder};
pub use context::{AudioCore, AudioCoreBuilder, CoreStats, DiagnosticHook, FaultListener};
pub use lifecycle::StreamConfig;
pub use recovery::CORE_ACTION;
pub use region::{HeapRegion, RegionHead, RegionMemory, SharedRegion};
pub use registry::{IdleReport, StreamRegistry};
pub use session::{BackEnd, FrontEnd, Session, SessionSnapshot, StreamCallback, StreamEvent};
pub use state::{StreamOp, StreamState};
