pub mod config;
pub mod conversion;
pub mod engine;
pub mod formats;
pub mod metrics;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError, OutputConfig,
};
pub use conversion::{
    CancellationCoordinator, ChannelObserver, ControllerStatus, ConversionController,
    ConversionError, ConversionEvent, ConversionObserver, ConversionRequest, ConversionResult,
    LifecycleState, NoopObserver, OutputPayload,
};
pub use engine::{EngineConfig, EngineError, FfmpegEngine, MediaEngine};
pub use formats::{
    find_format, list_formats, AudioCodec, EncoderProbe, FormatAvailability, FormatRegistry,
    OutputFormatSpec,
};
