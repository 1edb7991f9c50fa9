//! Session, scene and voter identifiers.
//!
//! A session id is `0xCCSS`: the high byte is the scene category (which is
//! also the wire `scene_type`), the low byte selects the instance. The scene
//! table below is the only place that knows how many instances each scene
//! supports.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Data direction of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// AP produces, DSP consumes
    Playback,
    /// DSP produces, AP consumes
    Capture,
    /// Separate input and output routes
    Duplex,
}

impl Direction {
    /// Wire encoding used in startup and path payloads.
    pub fn as_u8(self) -> u8 {
        match self {
            Direction::Playback => 0,
            Direction::Capture => 1,
            Direction::Duplex => 2,
        }
    }

    /// Decode a wire direction byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Direction::Playback),
            1 => Some(Direction::Capture),
            2 => Some(Direction::Duplex),
            _ => None,
        }
    }
}

/// Every scene the DSP firmware knows. The discriminant is the wire
/// `scene_type` byte and the session id category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum SceneType {
    NormalPlay = 0x00,
    NormalCapture = 0x01,
    LowLatencyPlay = 0x02,
    MmapPlay = 0x03,
    MmapCapture = 0x04,
    VoipPlay = 0x05,
    VoipCapture = 0x06,
    VoiceCallPlay = 0x07,
    VoiceCallCapture = 0x08,
    OffloadPlay = 0x09,
    LoopbackCapture = 0x0A,
    KwsCapture = 0x0B,
    UsbMmapPlay = 0x0C,
    UsbMmapCapture = 0x0D,
    HapticPlay = 0x0E,
    FmDuplex = 0x0F,
    EcRefCapture = 0x10,
    SpatialPlay = 0x11,
    DirectPlay = 0x12,
    IncallMusicPlay = 0x13,
    CallRecordCapture = 0x14,
    UltrasoundDuplex = 0x15,
    A2dpOffloadPlay = 0x16,
    HfpDuplex = 0x17,
    ProxyCapture = 0x18,
}

/// Number of scene categories.
pub const SCENE_COUNT: usize = 25;

/// All scenes in category order.
pub const ALL_SCENES: [SceneType; SCENE_COUNT] = [
    SceneType::NormalPlay,
    SceneType::NormalCapture,
    SceneType::LowLatencyPlay,
    SceneType::MmapPlay,
    SceneType::MmapCapture,
    SceneType::VoipPlay,
    SceneType::VoipCapture,
    SceneType::VoiceCallPlay,
    SceneType::VoiceCallCapture,
    SceneType::OffloadPlay,
    SceneType::LoopbackCapture,
    SceneType::KwsCapture,
    SceneType::UsbMmapPlay,
    SceneType::UsbMmapCapture,
    SceneType::HapticPlay,
    SceneType::FmDuplex,
    SceneType::EcRefCapture,
    SceneType::SpatialPlay,
    SceneType::DirectPlay,
    SceneType::IncallMusicPlay,
    SceneType::CallRecordCapture,
    SceneType::UltrasoundDuplex,
    SceneType::A2dpOffloadPlay,
    SceneType::HfpDuplex,
    SceneType::ProxyCapture,
];

impl SceneType {
    /// Look a scene up by its category byte.
    pub fn from_category(category: u8) -> Option<Self> {
        ALL_SCENES.get(usize::from(category)).copied()
    }

    /// Category byte, identical to the wire `scene_type`.
    pub fn category(self) -> u8 {
        self as u8
    }

    pub fn direction(self) -> Direction {
        use SceneType::*;
        match self {
            NormalPlay | LowLatencyPlay | MmapPlay | VoipPlay | VoiceCallPlay | OffloadPlay
            | UsbMmapPlay | HapticPlay | SpatialPlay | DirectPlay | IncallMusicPlay
            | A2dpOffloadPlay => Direction::Playback,
            NormalCapture | MmapCapture | VoipCapture | VoiceCallCapture | LoopbackCapture
            | KwsCapture | UsbMmapCapture | EcRefCapture | CallRecordCapture | ProxyCapture => {
                Direction::Capture
            }
            FmDuplex | UltrasoundDuplex | HfpDuplex => Direction::Duplex,
        }
    }

    /// Maximum number of concurrent instances (valid selectors are `0..max`).
    pub fn max_instances(self) -> u8 {
        use SceneType::*;
        match self {
            NormalPlay | NormalCapture => 4,
            LowLatencyPlay | MmapPlay | MmapCapture | OffloadPlay | LoopbackCapture
            | DirectPlay => 2,
            _ => 1,
        }
    }

    /// Scenes whose data moves through the block pipeline instead of
    /// per-buffer notifications.
    pub fn is_ultra_fast(self) -> bool {
        matches!(
            self,
            SceneType::MmapPlay
                | SceneType::MmapCapture
                | SceneType::UsbMmapPlay
                | SceneType::UsbMmapCapture
        )
    }

    /// Real-time voice scenes stop with a single direct stop.
    pub fn is_realtime_voice(self) -> bool {
        matches!(self, SceneType::VoiceCallPlay | SceneType::VoiceCallCapture)
    }

    /// Only compressed offload playback can drain and switch tracks.
    pub fn supports_drain(self) -> bool {
        matches!(self, SceneType::OffloadPlay)
    }

    pub fn is_keyword_spotting(self) -> bool {
        matches!(self, SceneType::KwsCapture)
    }

    /// Scenes carrying compressed data; every other scene is PCM only.
    pub fn accepts_compressed(self) -> bool {
        matches!(self, SceneType::OffloadPlay | SceneType::A2dpOffloadPlay)
    }

    pub fn as_str(self) -> &'static str {
        use SceneType::*;
        match self {
            NormalPlay => "NormalPlay",
            NormalCapture => "NormalCapture",
            LowLatencyPlay => "LowLatencyPlay",
            MmapPlay => "MmapPlay",
            MmapCapture => "MmapCapture",
            VoipPlay => "VoipPlay",
            VoipCapture => "VoipCapture",
            VoiceCallPlay => "VoiceCallPlay",
            VoiceCallCapture => "VoiceCallCapture",
            OffloadPlay => "OffloadPlay",
            LoopbackCapture => "LoopbackCapture",
            KwsCapture => "KwsCapture",
            UsbMmapPlay => "UsbMmapPlay",
            UsbMmapCapture => "UsbMmapCapture",
            HapticPlay => "HapticPlay",
            FmDuplex => "FmDuplex",
            EcRefCapture => "EcRefCapture",
            SpatialPlay => "SpatialPlay",
            DirectPlay => "DirectPlay",
            IncallMusicPlay => "IncallMusicPlay",
            CallRecordCapture => "CallRecordCapture",
            UltrasoundDuplex => "UltrasoundDuplex",
            A2dpOffloadPlay => "A2dpOffloadPlay",
            HfpDuplex => "HfpDuplex",
            ProxyCapture => "ProxyCapture",
        }
    }
}

impl fmt::Display for SceneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved scene table entry for a session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneInfo {
    pub scene: SceneType,
    pub instance: u8,
    pub direction: Direction,
}

/// 16-bit session identifier, `0xCCSS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u16);

impl SessionId {
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Build a session id from a scene and an instance selector, checking
    /// the selector against the scene table.
    pub fn new(scene: SceneType, instance: u8) -> Result<Self, ProtocolError> {
        let id = Self((u16::from(scene.category()) << 8) | u16::from(instance));
        id.resolve()?;
        Ok(id)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn category(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn selector(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Map `(category, selector)` through the scene table.
    pub fn resolve(self) -> Result<SceneInfo, ProtocolError> {
        let scene = SceneType::from_category(self.category())
            .ok_or(ProtocolError::UnknownScene(self.category()))?;
        if self.selector() >= scene.max_instances() {
            return Err(ProtocolError::InstanceOutOfRange {
                scene: scene.as_str(),
                instance: self.selector(),
                max: scene.max_instances(),
            });
        }
        Ok(SceneInfo {
            scene,
            instance: self.selector(),
            direction: scene.direction(),
        })
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Power voter identity. Sessions vote with their raw id; non-stream
/// clients use the reserved range `0xFF00..=0xFFFF`, which no valid session
/// id can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterId(u16);

impl VoterId {
    /// First id of the reserved non-stream range.
    pub const RESERVED_BASE: u16 = 0xFF00;
    pub const USB_CONNECT: VoterId = VoterId(0xFF01);
    pub const DIAG_TOOL: VoterId = VoterId(0xFF02);
    pub const COMMON: VoterId = VoterId(0xFF03);

    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn is_reserved(self) -> bool {
        self.0 >= Self::RESERVED_BASE
    }
}

impl From<SessionId> for VoterId {
    fn from(id: SessionId) -> Self {
        VoterId(id.raw())
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            VoterId::USB_CONNECT => f.write_str("usb-connect"),
            VoterId::DIAG_TOOL => f.write_str("diag-tool"),
            VoterId::COMMON => f.write_str("common"),
            other => write!(f, "{:#06x}", other.0),
        }
    }
}
