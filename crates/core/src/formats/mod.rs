//! Output format catalog and runtime capability registry.
//!
//! The catalog is fixed at compile time. Whether a format can actually be
//! produced depends on the engine, so [`FormatRegistry`] asks an
//! [`EncoderProbe`] once per format and remembers the answer for the
//! lifetime of the registry.

mod catalog;
mod registry;

pub use catalog::{find_format, list_formats, AudioCodec, EncodeParams, OutputFormatSpec, CATALOG};
pub use registry::{EncoderProbe, FormatAvailability, FormatRegistry, FormatSupport};
