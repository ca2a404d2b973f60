//! Static catalog of output formats.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Audio codec an output format encodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    /// MPEG Audio Layer III
    Mp3,
    /// Signed 16-bit little-endian PCM
    PcmS16,
    /// Opus
    Opus,
    /// Advanced Audio Coding
    Aac,
    /// Free Lossless Audio Codec
    Flac,
}

impl AudioCodec {
    /// Codec identifier as used in plans and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::PcmS16 => "pcm-s16",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Flac => "flac",
        }
    }

    /// Returns the ffmpeg encoder name for this codec.
    pub fn ffmpeg_encoder(&self) -> &'static str {
        match self {
            Self::Mp3 => "libmp3lame",
            Self::PcmS16 => "pcm_s16le",
            Self::Opus => "libopus",
            Self::Aac => "aac",
            Self::Flac => "flac",
        }
    }

    /// Returns the ffmpeg muxer that wraps this codec.
    pub fn ffmpeg_muxer(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::PcmS16 => "wav",
            Self::Opus => "ogg",
            Self::Aac => "adts",
            Self::Flac => "flac",
        }
    }

    /// Whether this codec is lossless.
    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::PcmS16 | Self::Flac)
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoder parameters. Unset fields keep the source value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeParams {
    /// Target bitrate in bits per second (lossy codecs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_bps: Option<u32>,
    /// Target sample rate in Hz.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate_hz: Option<u32>,
    /// Number of output channels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
}

/// Description of one selectable output format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputFormatSpec {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    /// File extension without the leading dot.
    pub extension: &'static str,
    pub mime_type: &'static str,
    pub codec: AudioCodec,
    pub params: EncodeParams,
    /// Skip the runtime probe; the encoder always ships with the engine.
    pub always_available: bool,
    /// Shown when the probe says the codec cannot be encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsupported_reason: Option<&'static str>,
}

impl OutputFormatSpec {
    /// Reason reported when this format is not encodable.
    pub fn unsupported_message(&self) -> String {
        match self.unsupported_reason {
            Some(reason) => reason.to_string(),
            None => format!("{} encoding is not available in this runtime", self.label),
        }
    }
}

/// All supported output formats, in presentation order.
pub static CATALOG: [OutputFormatSpec; 5] = [
    OutputFormatSpec {
        id: "mp3",
        label: "MP3",
        description: "Lossy, plays everywhere",
        extension: "mp3",
        mime_type: "audio/mpeg",
        codec: AudioCodec::Mp3,
        params: EncodeParams {
            bitrate_bps: Some(192_000),
            sample_rate_hz: Some(44_100),
            channels: Some(2),
        },
        always_available: true,
        unsupported_reason: None,
    },
    OutputFormatSpec {
        id: "wav",
        label: "WAV",
        description: "Uncompressed PCM, large files",
        extension: "wav",
        mime_type: "audio/wav",
        codec: AudioCodec::PcmS16,
        params: EncodeParams {
            bitrate_bps: None,
            sample_rate_hz: Some(44_100),
            channels: Some(2),
        },
        always_available: true,
        unsupported_reason: None,
    },
    OutputFormatSpec {
        id: "opus",
        label: "Opus",
        description: "Modern lossy codec in an Ogg container",
        extension: "ogg",
        mime_type: "audio/ogg",
        codec: AudioCodec::Opus,
        params: EncodeParams {
            bitrate_bps: Some(128_000),
            sample_rate_hz: Some(48_000),
            channels: Some(2),
        },
        always_available: false,
        unsupported_reason: Some("Opus encoding is not supported by this runtime"),
    },
    OutputFormatSpec {
        id: "aac",
        label: "AAC",
        description: "Lossy AAC in an ADTS stream",
        extension: "aac",
        mime_type: "audio/aac",
        codec: AudioCodec::Aac,
        params: EncodeParams {
            bitrate_bps: Some(192_000),
            sample_rate_hz: Some(44_100),
            channels: Some(2),
        },
        always_available: false,
        unsupported_reason: Some("AAC encoding is not supported by this runtime"),
    },
    OutputFormatSpec {
        id: "flac",
        label: "FLAC",
        description: "Lossless compression",
        extension: "flac",
        mime_type: "audio/flac",
        codec: AudioCodec::Flac,
        params: EncodeParams {
            bitrate_bps: None,
            sample_rate_hz: None,
            channels: None,
        },
        always_available: false,
        unsupported_reason: Some("FLAC encoding is not supported by this runtime"),
    },
];

/// Returns the catalog in declaration order.
pub fn list_formats() -> &'static [OutputFormatSpec] {
    &CATALOG
}

/// Looks up a format by id.
pub fn find_format(id: &str) -> Option<&'static OutputFormatSpec> {
    CATALOG.iter().find(|spec| spec.id == id)
}
