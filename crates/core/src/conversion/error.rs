//! Failure taxonomy for conversions.

use thiserror::Error;

use crate::engine::{DiscardedTrack, EngineError};

/// Message shown when the source container cannot be identified.
pub const UNRECOGNIZED_CONTAINER_MESSAGE: &str = "Unsupported or unrecognized file format. \
     Try a common video or audio container: MP4, MOV, MKV, WebM, MP3, WAV, OGG, FLAC or AAC.";

/// Rendering of a cancellation cause.
pub const CANCELLED_MESSAGE: &str = "cancelled";

/// Renders an engine-level failure cause as a human-readable message.
///
/// Priority: cancellation, discarded tracks, unrecognized container, then
/// the engine's own message.
pub fn describe_failure(cause: &EngineError) -> String {
    if matches!(cause, EngineError::Aborted) {
        return CANCELLED_MESSAGE.to_string();
    }

    if let Some(discarded) = cause.discarded_tracks() {
        if !discarded.is_empty() {
            return describe_discarded(discarded);
        }
    }

    match cause {
        EngineError::UnrecognizedContainer { .. } => UNRECOGNIZED_CONTAINER_MESSAGE.to_string(),
        other => other.to_string(),
    }
}

/// One `"<kind> track discarded (<reason>)"` clause per track, joined with `"; "`.
pub fn describe_discarded(tracks: &[DiscardedTrack]) -> String {
    tracks
        .iter()
        .map(|t| format!("{} track discarded ({})", t.kind, t.reason.phrase()))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Terminal failure of a conversion request.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Another conversion is active on the same controller.
    #[error("a conversion is already in progress")]
    Busy,

    /// The format is not in the catalog or cannot be encoded here.
    #[error("unsupported output format '{format_id}': {reason}")]
    UnsupportedFormat { format_id: String, reason: String },

    /// The source container could not be identified.
    #[error("container detection failed: {detail}")]
    DetectionFailure { detail: String },

    /// Planning left no track to convert.
    #[error("no usable audio track: {detail}")]
    PlanInvalid { detail: String },

    /// The engine reported success without producing output.
    #[error("conversion produced no output")]
    EmptyOutput,

    /// The user cancelled the conversion.
    #[error("conversion cancelled")]
    Cancelled,

    /// Anything else.
    #[error("{message}")]
    Unexpected { message: String },
}

impl ConversionError {
    /// Classifies an engine error raised outside container detection.
    pub fn from_engine(cause: EngineError) -> Self {
        let message = describe_failure(&cause);
        match cause {
            EngineError::Aborted => Self::Cancelled,
            EngineError::PlanRejected { .. } => Self::PlanInvalid { detail: message },
            EngineError::UnrecognizedContainer { .. } => Self::DetectionFailure { detail: message },
            _ => Self::Unexpected { message },
        }
    }

    /// Classifies an error raised while detecting the container.
    ///
    /// Every failure at that stage is a detection failure, except an
    /// engine-side cancellation.
    pub fn from_detection(cause: EngineError) -> Self {
        match cause {
            EngineError::Aborted => Self::Cancelled,
            EngineError::UnrecognizedContainer { reason } => Self::DetectionFailure {
                detail: if reason.is_empty() {
                    "unrecognized byte layout".to_string()
                } else {
                    reason
                },
            },
            other => Self::DetectionFailure {
                detail: describe_failure(&other),
            },
        }
    }

    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::DetectionFailure { .. } => "detection_failure",
            Self::PlanInvalid { .. } => "plan_invalid",
            Self::EmptyOutput => "empty_output",
            Self::Cancelled => "cancelled",
            Self::Unexpected { .. } => "unexpected",
        }
    }

    /// Whether this outcome is a user cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Actionable message for end users.
    ///
    /// Raw engine text is only passed through for [`Self::Unexpected`].
    pub fn user_message(&self) -> String {
        match self {
            Self::Busy => {
                "A conversion is already running. Wait for it to finish or cancel it first."
                    .to_string()
            }
            Self::UnsupportedFormat { reason, .. } => reason.clone(),
            Self::DetectionFailure { .. } => UNRECOGNIZED_CONTAINER_MESSAGE.to_string(),
            Self::PlanInvalid { detail } => {
                format!("No audio track could be converted: {}.", detail)
            }
            Self::EmptyOutput => {
                "The conversion finished but produced an empty file. Try another output format."
                    .to_string()
            }
            Self::Cancelled => "Conversion cancelled.".to_string(),
            Self::Unexpected { message } => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DiscardReason, TrackKind};

    #[test]
    fn test_cancellation_renders_as_cancelled() {
        assert_eq!(describe_failure(&EngineError::Aborted), "cancelled");
        assert!(ConversionError::from_engine(EngineError::Aborted).is_cancelled());
    }

    #[test]
    fn test_unknown_codec_mentions_kind_and_phrase() {
        for kind in [TrackKind::Audio, TrackKind::Video] {
            let cause = EngineError::PlanRejected {
                discarded: vec![DiscardedTrack::new(kind, DiscardReason::UnknownSourceCodec)],
            };
            let message = describe_failure(&cause);
            assert!(message.contains("unknown source codec"), "{}", message);
            assert!(message.contains(kind.as_str()), "{}", message);
        }
    }

    #[test]
    fn test_discarded_clauses_are_joined() {
        let cause = EngineError::PlanRejected {
            discarded: vec![
                DiscardedTrack::new(TrackKind::Video, DiscardReason::DiscardedByUser),
                DiscardedTrack::new(TrackKind::Audio, DiscardReason::NoEncodableTargetCodec),
                DiscardedTrack::new(TrackKind::Audio, DiscardReason::Other("x".into())),
            ],
        };
        assert_eq!(
            describe_failure(&cause),
            "video track discarded (discarded by configuration); \
             audio track discarded (no compatible encoder available); \
             audio track discarded (unsupported track)"
        );
    }

    #[test]
    fn test_unrecognized_container_message() {
        let message = describe_failure(&EngineError::unrecognized("Invalid data found"));
        assert_eq!(message, UNRECOGNIZED_CONTAINER_MESSAGE);
    }

    #[test]
    fn test_passthrough_and_fallback() {
        assert_eq!(describe_failure(&EngineError::failed("disk full")), "disk full");
        assert_eq!(
            describe_failure(&EngineError::Failed { message: None }),
            "conversion failed"
        );
    }

    #[test]
    fn test_classification() {
        let err = ConversionError::from_engine(EngineError::PlanRejected {
            discarded: vec![DiscardedTrack::new(
                TrackKind::Audio,
                DiscardReason::UndecodableSourceCodec,
            )],
        });
        assert_eq!(err.kind(), "plan_invalid");
        assert!(err
            .user_message()
            .contains("source codec not decodable in this runtime"));

        let err = ConversionError::from_engine(EngineError::failed("boom"));
        assert_eq!(err.kind(), "unexpected");
        assert_eq!(err.user_message(), "boom");
    }

    #[test]
    fn test_detection_errors_are_never_unexpected() {
        let err = ConversionError::from_detection(EngineError::failed("ffprobe crashed"));
        assert_eq!(err.kind(), "detection_failure");
        assert_eq!(err.user_message(), UNRECOGNIZED_CONTAINER_MESSAGE);

        let err = ConversionError::from_detection(EngineError::unrecognized(""));
        assert!(err.to_string().contains("unrecognized byte layout"));
    }
}
