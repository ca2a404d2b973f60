//! Error types for media engines.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use super::types::DiscardedTrack;

/// Errors raised by a [`MediaEngine`](super::MediaEngine).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine stopped because it was asked to abort.
    #[error("conversion aborted")]
    Aborted,

    /// The source bytes do not match any container the engine can read.
    #[error("unrecognized container: {reason}")]
    UnrecognizedContainer { reason: String },

    /// The plan left no track to convert.
    #[error("no usable track in source")]
    PlanRejected { discarded: Vec<DiscardedTrack> },

    /// The handle is not (or no longer) known to the engine.
    #[error("unknown source handle: {id}")]
    UnknownHandle { id: Uuid },

    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// FFprobe binary not found.
    #[error("FFprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    /// The engine failed for any other reason.
    #[error("{}", .message.as_deref().unwrap_or("conversion failed"))]
    Failed { message: Option<String> },

    /// I/O error while talking to the engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Creates a generic failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: Some(message.into()),
        }
    }

    /// Creates an unrecognized container error.
    pub fn unrecognized(reason: impl Into<String>) -> Self {
        Self::UnrecognizedContainer {
            reason: reason.into(),
        }
    }

    /// Tracks the engine discarded, if this error carries any.
    pub fn discarded_tracks(&self) -> Option<&[DiscardedTrack]> {
        match self {
            Self::PlanRejected { discarded } => Some(discarded),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_without_message_has_fallback() {
        let err = EngineError::Failed { message: None };
        assert_eq!(err.to_string(), "conversion failed");
        assert_eq!(EngineError::failed("boom").to_string(), "boom");
    }
}
