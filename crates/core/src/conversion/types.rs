//! Types for the conversion controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::observer::ConversionObserver;
use crate::engine::EngineOutput;

/// Lifecycle of the conversion a controller is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Idle,
    Loading,
    FormatDetecting,
    PlanValidating,
    Executing,
    Completed,
    Cancelled,
    Failed,
}

impl LifecycleState {
    /// Whether a new request may start from this state.
    pub fn accepts_requests(&self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Completed | Self::Cancelled | Self::Failed
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::FormatDetecting => "format_detecting",
            Self::PlanValidating => "plan_validating",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to convert one source into one output format.
pub struct ConversionRequest {
    /// File name of the source, used for the output name.
    pub source_name: String,
    /// The complete source file.
    pub source_bytes: Vec<u8>,
    /// Catalog id of the target format.
    pub format_id: String,
    /// Receives progress and log lines.
    pub observer: Arc<dyn ConversionObserver>,
}

impl ConversionRequest {
    pub fn new(
        source_name: impl Into<String>,
        source_bytes: Vec<u8>,
        format_id: impl Into<String>,
        observer: Arc<dyn ConversionObserver>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            source_bytes,
            format_id: format_id.into(),
            observer,
        }
    }

    /// Reads a whole file into a request.
    pub async fn from_path(
        path: &Path,
        format_id: impl Into<String>,
        observer: Arc<dyn ConversionObserver>,
    ) -> std::io::Result<Self> {
        let source_bytes = tokio::fs::read(path).await?;
        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self::new(source_name, source_bytes, format_id, observer))
    }
}

impl fmt::Debug for ConversionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRequest")
            .field("source_name", &self.source_name)
            .field("source_len", &self.source_bytes.len())
            .field("format_id", &self.format_id)
            .finish_non_exhaustive()
    }
}

/// Where the converted audio lives.
#[derive(Clone, PartialEq, Eq)]
pub enum OutputPayload {
    Bytes(Vec<u8>),
    RemoteUrl(String),
}

impl From<EngineOutput> for OutputPayload {
    fn from(output: EngineOutput) -> Self {
        match output.remote_url {
            Some(url) => Self::RemoteUrl(url),
            None => Self::Bytes(output.bytes),
        }
    }
}

impl fmt::Debug for OutputPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::RemoteUrl(url) => f.debug_tuple("RemoteUrl").field(url).finish(),
        }
    }
}

/// A finished conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    /// Sanitized output file name including extension.
    pub file_name: String,
    pub mime_type: &'static str,
    /// Catalog id of the produced format.
    pub format_id: &'static str,
    pub payload: OutputPayload,
    /// Wall time from load to finalize.
    pub duration_ms: u64,
}

impl ConversionResult {
    /// Payload bytes, if the output is held in memory.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            OutputPayload::Bytes(bytes) => Some(bytes),
            OutputPayload::RemoteUrl(_) => None,
        }
    }

    /// Remote location, if the engine stored the output elsewhere.
    pub fn remote_url(&self) -> Option<&str> {
        match &self.payload {
            OutputPayload::RemoteUrl(url) => Some(url),
            OutputPayload::Bytes(_) => None,
        }
    }
}

/// Snapshot of a controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub state: LifecycleState,
    /// Id of the active conversion, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_conversion_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_since: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepting_states() {
        assert!(LifecycleState::Idle.accepts_requests());
        assert!(LifecycleState::Failed.accepts_requests());
        assert!(!LifecycleState::Executing.accepts_requests());
        assert!(!LifecycleState::Idle.is_terminal());
    }

    #[test]
    fn test_remote_url_takes_precedence() {
        let payload = OutputPayload::from(EngineOutput {
            bytes: vec![1, 2, 3],
            remote_url: Some("https://cdn.example/out.mp3".to_string()),
        });
        assert_eq!(
            payload,
            OutputPayload::RemoteUrl("https://cdn.example/out.mp3".to_string())
        );
    }

    #[test]
    fn test_status_serialization() {
        let status = ControllerStatus::default();
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#"{"state":"idle"}"#);
    }

    #[tokio::test]
    async fn test_from_path_reads_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Song.wav");
        tokio::fs::write(&path, b"RIFF....WAVE").await.unwrap();

        let request = ConversionRequest::from_path(
            &path,
            "mp3",
            Arc::new(crate::conversion::NoopObserver),
        )
        .await
        .unwrap();
        assert_eq!(request.source_name, "Song.wav");
        assert_eq!(request.source_bytes.len(), 12);
    }
}
