//! Control message protocol between the application processor and the
//! audio DSP.
//!
//! Frames are fixed 64-byte buffers: an 8-byte header followed by up to 56
//! payload bytes. There is no sequence number; requests and replies are
//! correlated by `(scene_type, instance_id)` alone, so a session never has
//! more than one request outstanding.
//!
//! - [`ids`]: session ids, the scene table and voter ids
//! - [`frame`]: header layout, opcodes and the raw [`Frame`]
//! - [`message`]: the typed [`Message`] sum type
//! - [`codec`]: bounded little-endian payload reader/writer
//! - [`channel`]: the [`MessageChannel`] collaborator trait
//!
//! This crate performs no I/O.
//!
//! ```
//! use adsp_protocol::{Address, Frame, Message, Request};
//!
//! # fn main() -> Result<(), adsp_protocol::ProtocolError> {
//! let frame = Message::Request(Request::Drain { final_len: 4096 }).encode(Address::new(0x09, 1))?;
//! let bytes = frame.to_bytes();
//! let back = Message::decode(&Frame::from_bytes(&bytes)?)?;
//! assert_eq!(back, Message::Request(Request::Drain { final_len: 4096 }));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod channel;
pub mod codec;
pub mod frame;
pub mod ids;
pub mod message;
pub mod types;

pub use channel::{ChannelError, FrameSink, MessageChannel};
pub use frame::{Address, Command, Frame, FrameHeader, Function, SourceTag};
pub use ids::{ALL_SCENES, Direction, SCENE_COUNT, SceneInfo, SceneType, SessionId, VoterId};
pub use message::{
    MAX_PARAM_LEN, Message, Notification, PathConfig, Reply, ReplyBody, Request, StartupParams,
};
pub use types::{
    ChannelMap, CodecType, RegionDescriptor, RouteId, SampleFormat, StreamTimestamp,
};

use adsp_errors::{AdspError, ValidationError};
use thiserror::Error;

/// Size of every frame on the wire.
pub const FRAME_SIZE: usize = 64;
/// Size of the frame header.
pub const HEADER_SIZE: usize = 8;
/// Largest payload a frame can carry.
pub const MAX_PAYLOAD: usize = FRAME_SIZE - HEADER_SIZE;

/// Errors returned by frame and message encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    #[error("Declared payload length {declared} exceeds {max}")]
    PayloadLength { declared: usize, max: usize },

    #[error("Payload of {len} bytes exceeds {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Unknown command id {0}")]
    UnknownCommand(u8),

    #[error("Unknown function id {function} in command {command}")]
    UnknownFunction { command: u8, function: u8 },

    #[error("Unknown source tag {0:#04x}")]
    UnknownSource(u8),

    #[error("'{function}' is not valid from source {tag:#04x}")]
    UnexpectedSource { function: &'static str, tag: u8 },

    #[error("'{op}' payload truncated: need {needed} bytes, have {available}")]
    Truncated {
        op: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Invalid {field} value {value}")]
    InvalidField { field: &'static str, value: u32 },

    #[error("Unknown scene category {0:#04x}")]
    UnknownScene(u8),

    #[error("{scene} has {max} instances, selector {instance} is out of range")]
    InstanceOutOfRange {
        scene: &'static str,
        instance: u8,
        max: u8,
    },
}

/// Convenience result alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

impl From<ProtocolError> for AdspError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::PayloadTooLarge { len, max } => {
                ValidationError::PayloadTooLarge { len, max }.into()
            }
            ProtocolError::UnknownScene(_) | ProtocolError::InstanceOutOfRange { .. } => {
                AdspError::Validation(ValidationError::UnsupportedFormat {
                    field: "session_id".into(),
                    reason: e.to_string(),
                })
            }
            other => AdspError::Protocol(other.to_string()),
        }
    }
}
