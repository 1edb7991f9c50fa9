//! Common imports for control-plane clients.

pub use crate::{
    AudioCore, AudioCoreBuilder, CoreConfig, HeapRegion, Session, StreamConfig, StreamEvent,
    StreamOp, StreamState,
};
pub use adsp_errors::prelude::*;
pub use adsp_protocol::{
    ChannelMap, RegionDescriptor, RouteId, SampleFormat, SceneType, SessionId, StreamTimestamp,
};
