//! Fixed-size control frame and opcode tables.
//!
//! Wire layout (64 bytes):
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | `scene_type` |
//! | 1 | 1 | `instance_id` |
//! | 2 | 1 | `command_id` |
//! | 3 | 1 | `function_id` |
//! | 4 | 2 | `payload_length` (LE) |
//! | 6 | 1 | `result_code` |
//! | 7 | 1 | `source_tag` |
//! | 8 | 56 | payload, zero padded |

use core::fmt;

use crate::{FRAME_SIZE, HEADER_SIZE, MAX_PAYLOAD, ProtocolError};

/// Command category, the `command_id` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Scene = 0,
    Audio = 1,
    Voice = 2,
    Param = 3,
    Kws = 4,
    HwModule = 5,
    System = 6,
}

impl Command {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Command::Scene),
            1 => Some(Command::Audio),
            2 => Some(Command::Voice),
            3 => Some(Command::Param),
            4 => Some(Command::Kws),
            5 => Some(Command::HwModule),
            6 => Some(Command::System),
            _ => None,
        }
    }
}

/// A `(command_id, function_id)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Startup,
    Shutdown,
    GetRtc,
    Start,
    Stop,
    Pause,
    Resume,
    Flush,
    Drain,
    NextTrack,
    GetTimestamp,
    DataNotify,
    BufferDone,
    LastBlockConsumed,
    StreamEvent,
    SetVolume,
    SetMute,
    SetParam,
    GetParam,
    KeywordDetected,
    RearmKeyword,
    AddPath,
    RemovePath,
    FaultReport,
    Ping,
}

impl Function {
    pub fn command(self) -> Command {
        use Function::*;
        match self {
            Startup | Shutdown | GetRtc => Command::Scene,
            Start | Stop | Pause | Resume | Flush | Drain | NextTrack | GetTimestamp
            | DataNotify | BufferDone | LastBlockConsumed | StreamEvent => Command::Audio,
            SetVolume | SetMute => Command::Voice,
            SetParam | GetParam => Command::Param,
            KeywordDetected | RearmKeyword => Command::Kws,
            AddPath | RemovePath => Command::HwModule,
            FaultReport | Ping => Command::System,
        }
    }

    /// The `function_id` byte within the command category.
    pub fn id(self) -> u8 {
        use Function::*;
        match self {
            Startup => 1,
            Shutdown => 2,
            GetRtc => 3,
            Start => 1,
            Stop => 2,
            Pause => 3,
            Resume => 4,
            Flush => 5,
            Drain => 6,
            NextTrack => 7,
            GetTimestamp => 8,
            DataNotify => 9,
            BufferDone => 10,
            LastBlockConsumed => 11,
            StreamEvent => 12,
            SetVolume => 1,
            SetMute => 2,
            SetParam => 1,
            GetParam => 2,
            KeywordDetected => 1,
            RearmKeyword => 2,
            AddPath => 1,
            RemovePath => 2,
            FaultReport => 1,
            Ping => 2,
        }
    }

    pub fn from_wire(command: u8, function: u8) -> Result<Self, ProtocolError> {
        use Function::*;
        let cmd = Command::from_u8(command).ok_or(ProtocolError::UnknownCommand(command))?;
        let func = match (cmd, function) {
            (Command::Scene, 1) => Startup,
            (Command::Scene, 2) => Shutdown,
            (Command::Scene, 3) => GetRtc,
            (Command::Audio, 1) => Start,
            (Command::Audio, 2) => Stop,
            (Command::Audio, 3) => Pause,
            (Command::Audio, 4) => Resume,
            (Command::Audio, 5) => Flush,
            (Command::Audio, 6) => Drain,
            (Command::Audio, 7) => NextTrack,
            (Command::Audio, 8) => GetTimestamp,
            (Command::Audio, 9) => DataNotify,
            (Command::Audio, 10) => BufferDone,
            (Command::Audio, 11) => LastBlockConsumed,
            (Command::Audio, 12) => StreamEvent,
            (Command::Voice, 1) => SetVolume,
            (Command::Voice, 2) => SetMute,
            (Command::Param, 1) => SetParam,
            (Command::Param, 2) => GetParam,
            (Command::Kws, 1) => KeywordDetected,
            (Command::Kws, 2) => RearmKeyword,
            (Command::HwModule, 1) => AddPath,
            (Command::HwModule, 2) => RemovePath,
            (Command::System, 1) => FaultReport,
            (Command::System, 2) => Ping,
            _ => return Err(ProtocolError::UnknownFunction { command, function }),
        };
        Ok(func)
    }

    /// Functions the DSP sends on its own initiative rather than as a reply.
    pub fn is_notification(self) -> bool {
        matches!(
            self,
            Function::BufferDone
                | Function::LastBlockConsumed
                | Function::StreamEvent
                | Function::KeywordDetected
                | Function::FaultReport
        )
    }

    pub fn as_str(self) -> &'static str {
        use Function::*;
        match self {
            Startup => "startup",
            Shutdown => "shutdown",
            GetRtc => "get_rtc",
            Start => "start",
            Stop => "stop",
            Pause => "pause",
            Resume => "resume",
            Flush => "flush",
            Drain => "drain",
            NextTrack => "next_track",
            GetTimestamp => "get_timestamp",
            DataNotify => "data_notify",
            BufferDone => "buffer_done",
            LastBlockConsumed => "last_block_consumed",
            StreamEvent => "stream_event",
            SetVolume => "set_volume",
            SetMute => "set_mute",
            SetParam => "set_param",
            GetParam => "get_param",
            KeywordDetected => "keyword_detected",
            RearmKeyword => "rearm_keyword",
            AddPath => "add_path",
            RemovePath => "remove_path",
            FaultReport => "fault_report",
            Ping => "ping",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SourceTag {
    Ap = 0x00,
    Dsp = 0x01,
}

impl SourceTag {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(SourceTag::Ap),
            0x01 => Some(SourceTag::Dsp),
            _ => None,
        }
    }
}

/// Session addressing carried in every frame. Frames not tied to a session
/// use [`Address::GLOBAL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub scene_type: u8,
    pub instance_id: u8,
}

impl Address {
    pub const GLOBAL: Address = Address {
        scene_type: 0,
        instance_id: 0,
    };

    pub const fn new(scene_type: u8, instance_id: u8) -> Self {
        Self {
            scene_type,
            instance_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub scene_type: u8,
    pub instance_id: u8,
    pub command_id: u8,
    pub function_id: u8,
    pub payload_length: u16,
    pub result_code: u8,
    pub source_tag: u8,
}

impl FrameHeader {
    pub fn address(&self) -> Address {
        Address::new(self.scene_type, self.instance_id)
    }
}

/// One control frame: header plus up to [`MAX_PAYLOAD`] payload bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    payload: [u8; MAX_PAYLOAD],
}

impl Frame {
    pub fn new(
        address: Address,
        function: Function,
        source: SourceTag,
        result_code: u8,
        payload: &[u8],
    ) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        let payload_length = u16::try_from(payload.len()).unwrap_or(u16::MAX);
        let mut buf = [0u8; MAX_PAYLOAD];
        if let Some(dst) = buf.get_mut(..payload.len()) {
            dst.copy_from_slice(payload);
        }
        Ok(Self {
            header: FrameHeader {
                scene_type: address.scene_type,
                instance_id: address.instance_id,
                command_id: function.command() as u8,
                function_id: function.id(),
                payload_length,
                result_code,
                source_tag: source as u8,
            },
            payload: buf,
        })
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn address(&self) -> Address {
        self.header.address()
    }

    pub fn result_code(&self) -> u8 {
        self.header.result_code
    }

    /// The meaningful part of the payload.
    pub fn payload(&self) -> &[u8] {
        self.payload
            .get(..usize::from(self.header.payload_length))
            .unwrap_or(&self.payload)
    }

    /// Opcode of this frame, if it is a known one.
    pub fn function(&self) -> Result<Function, ProtocolError> {
        Function::from_wire(self.header.command_id, self.header.function_id)
    }

    pub fn source(&self) -> Result<SourceTag, ProtocolError> {
        SourceTag::from_u8(self.header.source_tag)
            .ok_or(ProtocolError::UnknownSource(self.header.source_tag))
    }

    /// Serialize into the fixed 64-byte wire buffer.
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut out = [0u8; FRAME_SIZE];
        let len = self.header.payload_length.to_le_bytes();
        let head = [
            self.header.scene_type,
            self.header.instance_id,
            self.header.command_id,
            self.header.function_id,
            len[0],
            len[1],
            self.header.result_code,
            self.header.source_tag,
        ];
        let (h, p) = out.split_at_mut(HEADER_SIZE);
        h.copy_from_slice(&head);
        p.copy_from_slice(&self.payload);
        out
    }

    /// Parse a frame. Shorter buffers are accepted as long as they hold the
    /// header and the declared payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (head, rest) = bytes
            .split_first_chunk::<HEADER_SIZE>()
            .ok_or(ProtocolError::FrameTooShort { len: bytes.len() })?;
        let [scene_type, instance_id, command_id, function_id, len_lo, len_hi, result_code, source_tag] =
            *head;
        let payload_length = u16::from_le_bytes([len_lo, len_hi]);
        let declared = usize::from(payload_length);
        if declared > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadLength {
                declared,
                max: MAX_PAYLOAD,
            });
        }
        let body = rest.get(..declared).ok_or(ProtocolError::FrameTooShort { len: bytes.len() })?;
        let mut payload = [0u8; MAX_PAYLOAD];
        if let Some(dst) = payload.get_mut(..declared) {
            dst.copy_from_slice(body);
        }
        Ok(Self {
            header: FrameHeader {
                scene_type,
                instance_id,
                command_id,
                function_id,
                payload_length,
                result_code,
                source_tag,
            },
            payload,
        })
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("header", &self.header)
            .field("payload", &self.payload())
            .finish()
    }
}
