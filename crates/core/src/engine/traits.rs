//! Trait definitions for media engines.

use async_trait::async_trait;

use super::error::EngineError;
use super::types::{ConversionPlan, EngineOutput, PlanOptions, SourceHandle};

/// Callback receiving raw progress ratios from an engine run.
///
/// Values are nominally in `[0, 1]` but engines may overshoot or go backwards.
pub type ProgressSink<'a> = &'a (dyn Fn(f64) + Send + Sync);

/// A media engine that can demux a source and re-encode its audio.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Takes ownership of the source bytes and returns a handle to them.
    async fn load(&self, source_name: &str, bytes: &[u8]) -> Result<SourceHandle, EngineError>;

    /// Identifies the container format of a loaded source.
    async fn detect_container(&self, handle: &SourceHandle) -> Result<String, EngineError>;

    /// Builds a conversion plan for a loaded source.
    ///
    /// An invalid plan is returned as `Ok` with `is_valid == false`.
    async fn build_plan(
        &self,
        handle: &SourceHandle,
        options: &PlanOptions,
    ) -> Result<ConversionPlan, EngineError>;

    /// Runs a plan to completion, reporting progress through `progress`.
    async fn execute(
        &self,
        plan: &ConversionPlan,
        progress: ProgressSink<'_>,
    ) -> Result<EngineOutput, EngineError>;

    /// Asks a running [`execute`](Self::execute) on `handle` to stop.
    ///
    /// Best-effort: the caller does not wait for the run to wind down.
    async fn abort(&self, handle: &SourceHandle) -> Result<(), EngineError>;

    /// Frees everything the engine holds for `handle`.
    async fn release(&self, handle: &SourceHandle) -> Result<(), EngineError>;
}
