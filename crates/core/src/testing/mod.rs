//! Testing utilities and a scripted media engine.
//!
//! [`MockEngine`] implements both [`MediaEngine`](crate::engine::MediaEngine)
//! and [`EncoderProbe`](crate::formats::EncoderProbe), so a controller and its
//! registry can be built without FFmpeg installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use audiograb_core::testing::{fixtures, MockEngine};
//!
//! let engine = Arc::new(MockEngine::new());
//! let controller = fixtures::controller(engine.clone());
//!
//! let (request, events) = fixtures::request("clip.mkv", "mp3");
//! let result = controller.convert(request).await?;
//! ```

mod mock_engine;

pub use mock_engine::{MockEngine, MockTrack};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use super::MockEngine;
    use crate::conversion::{
        ChannelObserver, ConversionController, ConversionEvent, ConversionRequest,
    };
    use crate::formats::FormatRegistry;

    /// First bytes of a Matroska file.
    pub const MATROSKA_HEADER: [u8; 8] = [0x1a, 0x45, 0xdf, 0xa3, 0x9f, 0x42, 0x86, 0x81];

    /// A small source that starts like a Matroska file.
    pub fn matroska_source() -> Vec<u8> {
        let mut bytes = MATROSKA_HEADER.to_vec();
        bytes.extend(std::iter::repeat(0u8).take(120));
        bytes
    }

    /// Controller and registry both backed by `engine`.
    pub fn controller(engine: Arc<MockEngine>) -> ConversionController {
        let registry = Arc::new(FormatRegistry::new(engine.clone()));
        ConversionController::new(engine, registry)
    }

    /// A request with a channel observer attached.
    pub fn request(
        source_name: &str,
        format_id: &str,
    ) -> (ConversionRequest, mpsc::UnboundedReceiver<ConversionEvent>) {
        let (observer, events) = ChannelObserver::new();
        let request = ConversionRequest::new(
            source_name,
            matroska_source(),
            format_id,
            Arc::new(observer),
        );
        (request, events)
    }

    /// Everything buffered on `events`, without waiting.
    pub fn drain(events: &mut mpsc::UnboundedReceiver<ConversionEvent>) -> Vec<ConversionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Progress values among `events`.
    pub fn progress_values(events: &[ConversionEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                ConversionEvent::Progress(ratio) => Some(*ratio),
                ConversionEvent::Log(_) => None,
            })
            .collect()
    }

    /// Log lines among `events`.
    pub fn log_lines(events: &[ConversionEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                ConversionEvent::Log(line) => Some(line.clone()),
                ConversionEvent::Progress(_) => None,
            })
            .collect()
    }
}
