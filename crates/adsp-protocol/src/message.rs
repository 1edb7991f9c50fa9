//! Typed control messages.
//!
//! Every frame decodes into exactly one [`Message`]: requests travel AP to
//! DSP, replies echo the request opcode with a result code, notifications
//! are DSP-initiated. Encoding and decoding are per variant; an opcode that
//! does not fit the frame's direction is a [`ProtocolError`].

use crate::codec::{PayloadReader, PayloadWriter};
use crate::frame::{Address, Frame, Function, SourceTag};
use crate::ids::Direction;
use crate::types::{ChannelMap, CodecType, RegionDescriptor, RouteId, SampleFormat, StreamTimestamp};
use crate::{MAX_PAYLOAD, ProtocolError};

/// Largest parameter blob that fits next to the parameter id.
pub const MAX_PARAM_LEN: usize = MAX_PAYLOAD - 4;

/// Scene startup payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupParams {
    pub format: SampleFormat,
    pub direction: Direction,
    pub route: RouteId,
    /// Output route of a duplex scene
    pub route_out: Option<RouteId>,
    pub channel_map: ChannelMap,
    pub region: RegionDescriptor,
}

/// Secondary route configuration sent after the startup ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathConfig {
    pub route: RouteId,
    pub direction: Direction,
    pub format: SampleFormat,
    pub channel_map: ChannelMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Startup(StartupParams),
    Shutdown,
    GetRtc,
    Start,
    Stop,
    Pause,
    Resume,
    Flush,
    Drain { final_len: u32 },
    NextTrack,
    GetTimestamp,
    /// New data committed up to `write_cursor`; fire and forget
    DataNotify { write_cursor: u32, bytes: u32 },
    /// Gain in millibels
    SetVolume { gain_mb: i16 },
    SetMute { muted: bool },
    SetParam { param_id: u32, data: Vec<u8> },
    GetParam { param_id: u32 },
    RearmKeyword,
    AddPath(PathConfig),
    RemovePath { route: RouteId },
    Ping,
}

impl Request {
    pub fn function(&self) -> Function {
        match self {
            Request::Startup(_) => Function::Startup,
            Request::Shutdown => Function::Shutdown,
            Request::GetRtc => Function::GetRtc,
            Request::Start => Function::Start,
            Request::Stop => Function::Stop,
            Request::Pause => Function::Pause,
            Request::Resume => Function::Resume,
            Request::Flush => Function::Flush,
            Request::Drain { .. } => Function::Drain,
            Request::NextTrack => Function::NextTrack,
            Request::GetTimestamp => Function::GetTimestamp,
            Request::DataNotify { .. } => Function::DataNotify,
            Request::SetVolume { .. } => Function::SetVolume,
            Request::SetMute { .. } => Function::SetMute,
            Request::SetParam { .. } => Function::SetParam,
            Request::GetParam { .. } => Function::GetParam,
            Request::RearmKeyword => Function::RearmKeyword,
            Request::AddPath(_) => Function::AddPath,
            Request::RemovePath { .. } => Function::RemovePath,
            Request::Ping => Function::Ping,
        }
    }

    /// Requests the DSP does not answer.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Request::DataNotify { .. })
    }

    fn encode_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        match self {
            Request::Startup(p) => {
                w.write_u32_le(p.format.sample_rate)?
                    .write_u8(p.format.channels)?
                    .write_u8(p.format.bit_width)?
                    .write_u8(p.format.codec.as_u8())?
                    .write_u8(p.direction.as_u8())?
                    .write_u16_le(p.route.0)?
                    .write_u16_le(p.route_out.map_or(RouteId::NONE, |r| r.0))?
                    .write_u32_le(p.channel_map.0)?
                    .write_u64_le(p.region.base)?
                    .write_u32_le(p.region.block_size)?
                    .write_u32_le(p.region.block_count)?;
            }
            Request::Drain { final_len } => {
                w.write_u32_le(*final_len)?;
            }
            Request::DataNotify {
                write_cursor,
                bytes,
            } => {
                w.write_u32_le(*write_cursor)?.write_u32_le(*bytes)?;
            }
            Request::SetVolume { gain_mb } => {
                w.write_i16_le(*gain_mb)?;
            }
            Request::SetMute { muted } => {
                w.write_u8(u8::from(*muted))?;
            }
            Request::SetParam { param_id, data } => {
                w.write_u32_le(*param_id)?.write_bytes(data)?;
            }
            Request::GetParam { param_id } => {
                w.write_u32_le(*param_id)?;
            }
            Request::AddPath(p) => {
                w.write_u16_le(p.route.0)?
                    .write_u8(p.direction.as_u8())?
                    .write_u8(p.format.channels)?
                    .write_u32_le(p.format.sample_rate)?
                    .write_u8(p.format.bit_width)?
                    .write_u8(p.format.codec.as_u8())?
                    .write_u16_le(0)?
                    .write_u32_le(p.channel_map.0)?;
            }
            Request::RemovePath { route } => {
                w.write_u16_le(route.0)?;
            }
            Request::Shutdown
            | Request::GetRtc
            | Request::Start
            | Request::Stop
            | Request::Pause
            | Request::Resume
            | Request::Flush
            | Request::NextTrack
            | Request::GetTimestamp
            | Request::RearmKeyword
            | Request::Ping => {}
        }
        Ok(())
    }

    fn decode(function: Function, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = PayloadReader::new(payload, function.as_str());
        let req = match function {
            Function::Startup => {
                let sample_rate = r.read_u32_le()?;
                let channels = r.read_u8()?;
                let bit_width = r.read_u8()?;
                let codec = decode_codec(r.read_u8()?)?;
                let direction = decode_direction(r.read_u8()?)?;
                let route = RouteId(r.read_u16_le()?);
                let route_out = match r.read_u16_le()? {
                    RouteId::NONE => None,
                    raw => Some(RouteId(raw)),
                };
                let channel_map = ChannelMap(r.read_u32_le()?);
                let region = RegionDescriptor {
                    base: r.read_u64_le()?,
                    block_size: r.read_u32_le()?,
                    block_count: r.read_u32_le()?,
                };
                Request::Startup(StartupParams {
                    format: SampleFormat {
                        sample_rate,
                        channels,
                        bit_width,
                        codec,
                    },
                    direction,
                    route,
                    route_out,
                    channel_map,
                    region,
                })
            }
            Function::Shutdown => Request::Shutdown,
            Function::GetRtc => Request::GetRtc,
            Function::Start => Request::Start,
            Function::Stop => Request::Stop,
            Function::Pause => Request::Pause,
            Function::Resume => Request::Resume,
            Function::Flush => Request::Flush,
            Function::Drain => Request::Drain {
                final_len: r.read_u32_le()?,
            },
            Function::NextTrack => Request::NextTrack,
            Function::GetTimestamp => Request::GetTimestamp,
            Function::DataNotify => Request::DataNotify {
                write_cursor: r.read_u32_le()?,
                bytes: r.read_u32_le()?,
            },
            Function::SetVolume => Request::SetVolume {
                gain_mb: r.read_i16_le()?,
            },
            Function::SetMute => Request::SetMute {
                muted: r.read_u8()? != 0,
            },
            Function::SetParam => Request::SetParam {
                param_id: r.read_u32_le()?,
                data: r.read_rest().to_vec(),
            },
            Function::GetParam => Request::GetParam {
                param_id: r.read_u32_le()?,
            },
            Function::RearmKeyword => Request::RearmKeyword,
            Function::AddPath => {
                let route = RouteId(r.read_u16_le()?);
                let direction = decode_direction(r.read_u8()?)?;
                let channels = r.read_u8()?;
                let sample_rate = r.read_u32_le()?;
                let bit_width = r.read_u8()?;
                let codec = decode_codec(r.read_u8()?)?;
                r.skip(2);
                let channel_map = ChannelMap(r.read_u32_le()?);
                Request::AddPath(PathConfig {
                    route,
                    direction,
                    format: SampleFormat {
                        sample_rate,
                        channels,
                        bit_width,
                        codec,
                    },
                    channel_map,
                })
            }
            Function::RemovePath => Request::RemovePath {
                route: RouteId(r.read_u16_le()?),
            },
            Function::Ping => Request::Ping,
            Function::BufferDone
            | Function::LastBlockConsumed
            | Function::StreamEvent
            | Function::KeywordDetected
            | Function::FaultReport => {
                return Err(ProtocolError::UnexpectedSource {
                    function: function.as_str(),
                    tag: SourceTag::Ap as u8,
                });
            }
        };
        Ok(req)
    }
}

/// Data carried by a successful reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReplyBody {
    #[default]
    Empty,
    Rtc { rtc_us: u64 },
    Timestamp(StreamTimestamp),
    Param(Vec<u8>),
}

/// DSP answer to a request, echoing its opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub function: Function,
    pub result_code: u8,
    pub body: ReplyBody,
}

impl Reply {
    pub fn ack(function: Function) -> Self {
        Self {
            function,
            result_code: 0,
            body: ReplyBody::Empty,
        }
    }

    pub fn failure(function: Function, result_code: u8) -> Self {
        Self {
            function,
            result_code,
            body: ReplyBody::Empty,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    fn encode_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        match &self.body {
            ReplyBody::Empty => {}
            ReplyBody::Rtc { rtc_us } => {
                w.write_u64_le(*rtc_us)?;
            }
            ReplyBody::Timestamp(ts) => {
                w.write_u64_le(ts.frames)?.write_u64_le(ts.dsp_time_us)?;
            }
            ReplyBody::Param(data) => {
                w.write_bytes(data)?;
            }
        }
        Ok(())
    }

    fn decode(function: Function, result_code: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        if result_code != 0 {
            return Ok(Self::failure(function, result_code));
        }
        let mut r = PayloadReader::new(payload, function.as_str());
        let body = match function {
            Function::GetRtc => ReplyBody::Rtc {
                rtc_us: r.read_u64_le()?,
            },
            Function::GetTimestamp => ReplyBody::Timestamp(StreamTimestamp {
                frames: r.read_u64_le()?,
                dsp_time_us: r.read_u64_le()?,
            }),
            Function::GetParam => ReplyBody::Param(r.read_rest().to_vec()),
            _ => ReplyBody::Empty,
        };
        Ok(Self {
            function,
            result_code,
            body,
        })
    }
}

/// Unsolicited DSP events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// `bytes` of the shared region were consumed (playback) or filled
    /// (capture)
    BufferDone { bytes: u32 },
    /// The block marked final by a drain was consumed
    LastBlockConsumed,
    StreamEvent { code: u32 },
    KeywordDetected { keyword: u32 },
    /// The DSP is going down; not tied to a session
    FaultReport { reason: u32 },
}

impl Notification {
    pub fn function(&self) -> Function {
        match self {
            Notification::BufferDone { .. } => Function::BufferDone,
            Notification::LastBlockConsumed => Function::LastBlockConsumed,
            Notification::StreamEvent { .. } => Function::StreamEvent,
            Notification::KeywordDetected { .. } => Function::KeywordDetected,
            Notification::FaultReport { .. } => Function::FaultReport,
        }
    }

    fn encode_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        match *self {
            Notification::BufferDone { bytes } => {
                w.write_u32_le(bytes)?;
            }
            Notification::LastBlockConsumed => {}
            Notification::StreamEvent { code } => {
                w.write_u32_le(code)?;
            }
            Notification::KeywordDetected { keyword } => {
                w.write_u32_le(keyword)?;
            }
            Notification::FaultReport { reason } => {
                w.write_u32_le(reason)?;
            }
        }
        Ok(())
    }

    fn decode(function: Function, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = PayloadReader::new(payload, function.as_str());
        let note = match function {
            Function::BufferDone => Notification::BufferDone {
                bytes: r.read_u32_le()?,
            },
            Function::LastBlockConsumed => Notification::LastBlockConsumed,
            Function::StreamEvent => Notification::StreamEvent {
                code: r.read_u32_le()?,
            },
            Function::KeywordDetected => Notification::KeywordDetected {
                keyword: r.read_u32_le()?,
            },
            Function::FaultReport => Notification::FaultReport {
                reason: r.read_u32_le()?,
            },
            other => {
                return Err(ProtocolError::UnexpectedSource {
                    function: other.as_str(),
                    tag: SourceTag::Dsp as u8,
                });
            }
        };
        Ok(note)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(Request),
    Reply(Reply),
    Notification(Notification),
}

impl Message {
    pub fn function(&self) -> Function {
        match self {
            Message::Request(req) => req.function(),
            Message::Reply(reply) => reply.function,
            Message::Notification(note) => note.function(),
        }
    }

    pub fn source(&self) -> SourceTag {
        match self {
            Message::Request(_) => SourceTag::Ap,
            Message::Reply(_) | Message::Notification(_) => SourceTag::Dsp,
        }
    }

    /// Build the wire frame for this message.
    pub fn encode(&self, address: Address) -> Result<Frame, ProtocolError> {
        let mut w = PayloadWriter::new();
        let result_code = match self {
            Message::Request(req) => {
                req.encode_payload(&mut w)?;
                0
            }
            Message::Reply(reply) => {
                reply.encode_payload(&mut w)?;
                reply.result_code
            }
            Message::Notification(note) => {
                note.encode_payload(&mut w)?;
                0
            }
        };
        Frame::new(address, self.function(), self.source(), result_code, w.as_slice())
    }

    /// Decode a frame into its message.
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let function = frame.function()?;
        let payload = frame.payload();
        match frame.source()? {
            SourceTag::Ap => Request::decode(function, payload).map(Message::Request),
            SourceTag::Dsp if function.is_notification() => {
                Notification::decode(function, payload).map(Message::Notification)
            }
            SourceTag::Dsp => {
                Reply::decode(function, frame.result_code(), payload).map(Message::Reply)
            }
        }
    }
}

impl From<Request> for Message {
    fn from(req: Request) -> Self {
        Message::Request(req)
    }
}

impl From<Reply> for Message {
    fn from(reply: Reply) -> Self {
        Message::Reply(reply)
    }
}

impl From<Notification> for Message {
    fn from(note: Notification) -> Self {
        Message::Notification(note)
    }
}

fn decode_codec(raw: u8) -> Result<CodecType, ProtocolError> {
    CodecType::from_u8(raw).ok_or(ProtocolError::InvalidField {
        field: "codec",
        value: u32::from(raw),
    })
}

fn decode_direction(raw: u8) -> Result<Direction, ProtocolError> {
    Direction::from_u8(raw).ok_or(ProtocolError::InvalidField {
        field: "direction",
        value: u32::from(raw),
    })
}
