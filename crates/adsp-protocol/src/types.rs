//! Format, route and shared-region descriptors carried in control frames.

use serde::{Deserialize, Serialize};

use crate::ids::SceneType;

/// Codec carried by a stream. Everything except `Pcm` is compressed and
/// only accepted by offload scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CodecType {
    #[default]
    Pcm = 0,
    Mp3 = 1,
    Aac = 2,
    Flac = 3,
    Opus = 4,
    Sbc = 5,
}

impl CodecType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CodecType::Pcm),
            1 => Some(CodecType::Mp3),
            2 => Some(CodecType::Aac),
            3 => Some(CodecType::Flac),
            4 => Some(CodecType::Opus),
            5 => Some(CodecType::Sbc),
            _ => None,
        }
    }

    pub fn is_compressed(self) -> bool {
        !matches!(self, CodecType::Pcm)
    }
}

/// Front-end sample format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleFormat {
    pub sample_rate: u32,
    pub channels: u8,
    pub bit_width: u8,
    #[serde(default)]
    pub codec: CodecType,
}

/// Rates the DSP firmware accepts.
pub const SUPPORTED_RATES: [u32; 9] = [
    8_000, 11_025, 16_000, 22_050, 32_000, 44_100, 48_000, 96_000, 192_000,
];

/// Bit widths the DSP firmware accepts for PCM.
pub const SUPPORTED_BIT_WIDTHS: [u8; 3] = [16, 24, 32];

/// Largest channel count any route carries.
pub const MAX_CHANNELS: u8 = 8;

impl SampleFormat {
    /// PCM format.
    pub const fn pcm(sample_rate: u32, channels: u8, bit_width: u8) -> Self {
        Self {
            sample_rate,
            channels,
            bit_width,
            codec: CodecType::Pcm,
        }
    }

    /// Bytes per interleaved frame. Zero for compressed codecs.
    pub fn frame_bytes(&self) -> u32 {
        if self.codec.is_compressed() {
            return 0;
        }
        u32::from(self.channels) * u32::from(self.bit_width / 8)
    }

    /// Check the format against the firmware's capabilities and the scene.
    ///
    /// Returns the offending field and a reason on rejection.
    pub fn check(&self, scene: SceneType) -> Result<(), (&'static str, String)> {
        if !SUPPORTED_RATES.contains(&self.sample_rate) {
            return Err(("sample_rate", format!("{} Hz is not supported", self.sample_rate)));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err((
                "channels",
                format!("{} channels, expected 1..={MAX_CHANNELS}", self.channels),
            ));
        }
        if self.codec.is_compressed() {
            if !scene.accepts_compressed() {
                return Err(("codec", format!("{:?} is not accepted by {scene}", self.codec)));
            }
        } else if !SUPPORTED_BIT_WIDTHS.contains(&self.bit_width) {
            return Err(("bit_width", format!("{}-bit PCM is not supported", self.bit_width)));
        }
        Ok(())
    }
}

/// Physical route (back-end) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(pub u16);

impl RouteId {
    /// Wire value meaning "no route".
    pub const NONE: u16 = 0xFFFF;
}

/// Channel map bitfield, bit `n` set when channel slot `n` is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMap(pub u32);

impl ChannelMap {
    /// The first `channels` slots.
    pub fn first(channels: u8) -> Self {
        match channels {
            0 => ChannelMap(0),
            n if n >= 32 => ChannelMap(u32::MAX),
            n => ChannelMap((1u32 << n) - 1),
        }
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }
}

/// Shared transfer region as seen by both sides. Addresses are opaque to
/// this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RegionDescriptor {
    pub base: u64,
    pub block_size: u32,
    pub block_count: u32,
}

impl RegionDescriptor {
    pub fn total_bytes(&self) -> u64 {
        u64::from(self.block_size) * u64::from(self.block_count)
    }
}

/// Rendering position reported by the DSP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamTimestamp {
    /// Frames rendered or captured since start
    pub frames: u64,
    /// DSP clock at the time of the sample
    pub dsp_time_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_48k_stereo_16_is_valid_for_offload() {
        let fmt = SampleFormat::pcm(48_000, 2, 16);
        assert_eq!(fmt.check(SceneType::OffloadPlay), Ok(()));
        assert_eq!(fmt.frame_bytes(), 4);
    }

    #[test]
    fn compressed_rejected_outside_offload() {
        let fmt = SampleFormat {
            codec: CodecType::Aac,
            ..SampleFormat::pcm(48_000, 2, 16)
        };
        assert!(fmt.check(SceneType::OffloadPlay).is_ok());
        assert!(matches!(fmt.check(SceneType::NormalPlay), Err(("codec", _))));
    }

    #[test]
    fn odd_rate_and_width_rejected() {
        assert!(matches!(
            SampleFormat::pcm(47_999, 2, 16).check(SceneType::NormalPlay),
            Err(("sample_rate", _))
        ));
        assert!(matches!(
            SampleFormat::pcm(48_000, 2, 12).check(SceneType::NormalPlay),
            Err(("bit_width", _))
        ));
        assert!(matches!(
            SampleFormat::pcm(48_000, 0, 16).check(SceneType::NormalPlay),
            Err(("channels", _))
        ));
    }

    #[test]
    fn channel_map_first_n() {
        assert_eq!(ChannelMap::first(2), ChannelMap(0b11));
        assert_eq!(ChannelMap::first(8).count(), 8);
        assert_eq!(ChannelMap::first(0).count(), 0);
    }

    #[test]
    fn sample_format_deserializes_without_codec() -> Result<(), serde_json::Error> {
        let fmt: SampleFormat =
            serde_json::from_str(r#"{"sample_rate":44100,"channels":2,"bit_width":24}"#)?;
        assert_eq!(fmt, SampleFormat::pcm(44_100, 2, 24));
        Ok(())
    }
}
