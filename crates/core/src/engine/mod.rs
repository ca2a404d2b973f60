//! Media engine contract and the FFmpeg-backed implementation.
//!
//! The conversion controller never touches container or codec details
//! itself. It drives a [`MediaEngine`] through `load`, `detect_container`,
//! `build_plan`, `execute` and `release`, and may call `abort` while an
//! execution is in flight.
//!
//! # Example
//!
//! ```ignore
//! use audiograb_core::engine::{FfmpegEngine, MediaEngine, PlanOptions};
//! use audiograb_core::formats::find_format;
//!
//! let engine = FfmpegEngine::with_defaults();
//! engine.validate().await?;
//!
//! let handle = engine.load("clip.mov", &bytes).await?;
//! let container = engine.detect_container(&handle).await?;
//!
//! let spec = find_format("mp3").unwrap();
//! let plan = engine
//!     .build_plan(&handle, &PlanOptions::audio_only(spec.codec, spec.params))
//!     .await?;
//! let output = engine.execute(&plan, &|ratio| println!("{:.0}%", ratio * 100.0)).await?;
//! engine.release(&handle).await?;
//! ```

mod capabilities;
mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use capabilities::EncoderCapabilities;
pub use config::EngineConfig;
pub use error::EngineError;
pub use ffmpeg::FfmpegEngine;
pub use traits::{MediaEngine, ProgressSink};
pub use types::{
    ConversionPlan, DiscardReason, DiscardedTrack, EngineOutput, PlanOptions, SourceHandle,
    TrackKind,
};
