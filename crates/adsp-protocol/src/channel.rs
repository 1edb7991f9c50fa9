//! Message channel collaborator.
//!
//! The transport (mailbox, ring buffer, IPC) is outside this workspace. The
//! core only needs to hand it encoded frames; inbound frames are pushed back
//! into the core by whoever drives the receive side.

use std::sync::Arc;

use crate::frame::Frame;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,

    #[error("channel full")]
    Full,

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Outbound half of the control channel.
pub trait MessageChannel: Send + Sync {
    /// Queue one frame for delivery. Must not block on the DSP's answer.
    fn send(&self, frame: &Frame) -> Result<(), ChannelError>;
}

impl<T: MessageChannel + ?Sized> MessageChannel for Arc<T> {
    fn send(&self, frame: &Frame) -> Result<(), ChannelError> {
        (**self).send(frame)
    }
}

/// Inbound half: raw frame bytes delivered by the transport's own context.
pub type FrameSink = Arc<dyn Fn(&[u8]) + Send + Sync>;

impl From<ChannelError> for adsp_errors::AdspError {
    fn from(e: ChannelError) -> Self {
        adsp_errors::AdspError::Channel(e.to_string())
    }
}
