//! Conversion orchestration.
//!
//! [`ConversionController`] accepts one [`ConversionRequest`] at a time,
//! checks the target format against the [`FormatRegistry`], drives the
//! engine through the conversion stages and returns either a
//! [`ConversionResult`] or a classified [`ConversionError`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use audiograb_core::conversion::{ChannelObserver, ConversionController, ConversionRequest};
//! use audiograb_core::engine::FfmpegEngine;
//! use audiograb_core::formats::FormatRegistry;
//!
//! let engine = Arc::new(FfmpegEngine::with_defaults());
//! let registry = Arc::new(FormatRegistry::new(engine.clone()));
//! let controller = ConversionController::new(engine, registry);
//!
//! let (observer, mut events) = ChannelObserver::new();
//! let request = ConversionRequest::from_path(path, "mp3", Arc::new(observer)).await?;
//! let result = controller.convert(request).await?;
//! println!("{} ({})", result.file_name, result.mime_type);
//! ```
//!
//! [`FormatRegistry`]: crate::formats::FormatRegistry

mod cancel;
mod controller;
mod error;
mod naming;
mod observer;
mod types;

pub use cancel::{CancellationCoordinator, RaceOutcome};
pub use controller::ConversionController;
pub use error::{
    describe_discarded, describe_failure, ConversionError, CANCELLED_MESSAGE,
    UNRECOGNIZED_CONTAINER_MESSAGE,
};
pub use naming::output_file_name;
pub use observer::{ChannelObserver, ConversionEvent, ConversionObserver, NoopObserver};
pub use types::{
    ControllerStatus, ConversionRequest, ConversionResult, LifecycleState, OutputPayload,
};
