//! Types exchanged with a media engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::formats::{AudioCodec, EncodeParams};

/// Opaque reference to a source loaded into an engine.
///
/// The engine owns whatever backs the handle (memory, temp files) until
/// [`MediaEngine::release`](super::MediaEngine::release) is called.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceHandle {
    /// Engine-assigned identifier.
    pub id: Uuid,
    /// Original file name of the source.
    pub source_name: String,
    /// Size of the loaded source in bytes.
    pub size_bytes: u64,
}

impl SourceHandle {
    /// Creates a handle with a fresh identifier.
    pub fn new(source_name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_name: source_name.into(),
            size_bytes,
        }
    }
}

/// Kind of a track inside a source container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an engine dropped a track while building a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// The plan options asked for this track to be dropped.
    DiscardedByUser,
    /// The output container cannot hold any more tracks.
    MaxTrackCountReached,
    /// The output container cannot hold any more tracks of this kind.
    MaxTrackCountOfTypeReached,
    /// The source codec could not be identified.
    UnknownSourceCodec,
    /// The source codec is known but cannot be decoded here.
    UndecodableSourceCodec,
    /// No encoder for the target codec is available.
    NoEncodableTargetCodec,
    /// A code outside the known set.
    Other(String),
}

impl DiscardReason {
    /// Human-readable phrase used in failure messages.
    pub fn phrase(&self) -> &'static str {
        match self {
            Self::DiscardedByUser => "discarded by configuration",
            Self::MaxTrackCountReached => "output format limit reached",
            Self::MaxTrackCountOfTypeReached => "too many tracks of this type for the output format",
            Self::UnknownSourceCodec => "unknown source codec",
            Self::UndecodableSourceCodec => "source codec not decodable in this runtime",
            Self::NoEncodableTargetCodec => "no compatible encoder available",
            Self::Other(_) => "unsupported track",
        }
    }
}

/// A track the engine refused to carry into the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardedTrack {
    pub kind: TrackKind,
    pub reason: DiscardReason,
}

impl DiscardedTrack {
    pub fn new(kind: TrackKind, reason: DiscardReason) -> Self {
        Self { kind, reason }
    }
}

/// Options passed to [`MediaEngine::build_plan`](super::MediaEngine::build_plan).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOptions {
    /// Drop every video track.
    pub discard_video: bool,
    /// Codec to encode the surviving audio with.
    pub audio_codec: AudioCodec,
    /// Encoder parameters for the audio codec.
    pub audio_params: EncodeParams,
}

impl PlanOptions {
    /// Audio-only plan for the given codec.
    pub fn audio_only(audio_codec: AudioCodec, audio_params: EncodeParams) -> Self {
        Self {
            discard_video: true,
            audio_codec,
            audio_params,
        }
    }
}

/// A conversion plan built by the engine for one loaded source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionPlan {
    /// Source the plan applies to.
    pub handle: SourceHandle,
    /// Options the plan was built from.
    pub options: PlanOptions,
    /// Whether the engine considers the plan executable.
    pub is_valid: bool,
    /// Number of tracks that survive into the output.
    pub kept_tracks: usize,
    /// Tracks dropped while planning.
    pub discarded_tracks: Vec<DiscardedTrack>,
}

impl ConversionPlan {
    /// A plan can run only if the engine accepted it and some track survived.
    pub fn is_executable(&self) -> bool {
        self.is_valid && self.kept_tracks > 0
    }
}

/// Payload produced by a successful engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    /// Encoded bytes, possibly empty.
    pub bytes: Vec<u8>,
    /// Location of the output when the engine stores it remotely.
    pub remote_url: Option<String>,
}

impl EngineOutput {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            remote_url: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty() && self.remote_url.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discard_reason_phrases() {
        assert_eq!(
            DiscardReason::UnknownSourceCodec.phrase(),
            "unknown source codec"
        );
        assert_eq!(
            DiscardReason::Other("weird".to_string()).phrase(),
            "unsupported track"
        );
    }

    #[test]
    fn test_plan_executable_requires_kept_track() {
        let plan = ConversionPlan {
            handle: SourceHandle::new("a.mkv", 10),
            options: PlanOptions::audio_only(AudioCodec::Mp3, EncodeParams::default()),
            is_valid: true,
            kept_tracks: 0,
            discarded_tracks: vec![],
        };
        assert!(!plan.is_executable());
    }

    #[test]
    fn test_engine_output_remote_url_is_not_empty() {
        let output = EngineOutput {
            bytes: vec![],
            remote_url: Some("https://example.com/out.mp3".to_string()),
        };
        assert!(!output.is_empty());
        assert!(EngineOutput::default().is_empty());
    }
}
