//! Single-flight conversion controller.
//!
//! Drives one request at a time through load, container detection, plan
//! validation, execution and finalization:
//! - A second request while one is active fails with `Busy`; nothing queues.
//! - Only execution can be cancelled. A cancel that arrives earlier is
//!   remembered and stops the request before the engine runs.
//! - The engine handle is released on every exit after a successful load.

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::cancel::{CancellationCoordinator, RaceOutcome};
use super::error::ConversionError;
use super::naming::output_file_name;
use super::observer::ConversionObserver;
use super::types::{
    ControllerStatus, ConversionRequest, ConversionResult, LifecycleState, OutputPayload,
};
use crate::engine::{EngineError, MediaEngine, PlanOptions, SourceHandle};
use crate::formats::{find_format, FormatAvailability, FormatRegistry, OutputFormatSpec};
use crate::metrics;

/// Bytes of the source shown when the container cannot be detected.
const HEX_DUMP_LEN: usize = 32;

struct ActiveConversion {
    id: Uuid,
    started_at: chrono::DateTime<Utc>,
    coordinator: CancellationCoordinator,
    /// Engine handle between a successful load and its release.
    loaded: Option<SourceHandle>,
}

/// Clears the active marker and publishes the terminal state on drop.
///
/// A handle still recorded at that point belongs to a dropped `convert`
/// future, so its release is spawned onto the runtime.
struct ActiveGuard<'a> {
    controller: &'a ConversionController,
    terminal: LifecycleState,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.controller.lock_active();
        let orphaned = active.take().and_then(|a| a.loaded);
        // Published under the lock so a new request cannot be overwritten.
        self.controller.state_tx.send_replace(self.terminal);
        drop(active);

        if let Some(handle) = orphaned {
            self.controller.release_detached(handle);
        }
    }
}

/// Orchestrates conversions against a [`MediaEngine`].
pub struct ConversionController {
    engine: Arc<dyn MediaEngine>,
    registry: Arc<FormatRegistry>,
    active: Mutex<Option<ActiveConversion>>,
    state_tx: watch::Sender<LifecycleState>,
}

impl ConversionController {
    pub fn new(engine: Arc<dyn MediaEngine>, registry: Arc<FormatRegistry>) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Idle);
        Self {
            engine,
            registry,
            active: Mutex::new(None),
            state_tx,
        }
    }

    /// The registry used for support checks.
    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Every catalog format with its runtime support, in catalog order.
    pub async fn list_formats_with_support(&self) -> Vec<FormatAvailability> {
        self.registry.list_formats_with_support().await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    /// Receives every lifecycle transition.
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    /// Snapshot of the controller.
    pub fn status(&self) -> ControllerStatus {
        let active = self.lock_active();
        ControllerStatus {
            state: self.state(),
            active_conversion_id: active.as_ref().map(|a| a.id),
            active_since: active.as_ref().map(|a| a.started_at),
        }
    }

    /// Requests cancellation of the active conversion.
    ///
    /// Returns `true` if this call was the one that requested it. Calling it
    /// again, or with nothing running, does nothing.
    pub fn request_cancel(&self) -> bool {
        match self.lock_active().as_ref() {
            Some(active) => active.coordinator.request_cancel(),
            None => {
                debug!("Cancel requested with no active conversion");
                false
            }
        }
    }

    /// Converts one source.
    pub async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionResult, ConversionError> {
        let Some((mut guard, id, coordinator)) = self.claim() else {
            warn!(format = %request.format_id, "Rejecting conversion, another one is active");
            metrics::CONVERSIONS.with_label_values(&["busy"]).inc();
            return Err(ConversionError::Busy);
        };

        let observer = Arc::clone(&request.observer);
        let span = info_span!(
            "conversion",
            id = %id,
            format = %request.format_id,
            engine = self.engine.name()
        );
        let started = Instant::now();

        let result = self
            .run(request, &coordinator, started)
            .instrument(span.clone())
            .await;

        let (terminal, outcome) = match &result {
            Ok(_) => (LifecycleState::Completed, "completed"),
            Err(ConversionError::Cancelled) => (LifecycleState::Cancelled, "cancelled"),
            Err(_) => (LifecycleState::Failed, "failed"),
        };

        span.in_scope(|| match &result {
            Ok(done) => info!(
                file = %done.file_name,
                duration_ms = done.duration_ms,
                "Conversion completed"
            ),
            Err(ConversionError::Cancelled) => info!("Conversion cancelled"),
            Err(e) => warn!(kind = e.kind(), error = %e, "Conversion failed"),
        });
        if let Err(e) = &result {
            if !e.is_cancelled() {
                observer.on_log(&format!("Conversion failed: {}", e.user_message()));
            }
        }

        metrics::CONVERSIONS.with_label_values(&[outcome]).inc();
        metrics::CONVERSION_DURATION
            .with_label_values(&[outcome])
            .observe(started.elapsed().as_secs_f64());

        guard.terminal = terminal;
        drop(guard);
        result
    }

    /// Marks a conversion active, unless one already is.
    fn claim(&self) -> Option<(ActiveGuard<'_>, Uuid, CancellationCoordinator)> {
        let mut active = self.lock_active();
        if active.is_some() {
            return None;
        }

        let id = Uuid::new_v4();
        let coordinator = CancellationCoordinator::new();
        *active = Some(ActiveConversion {
            id,
            started_at: Utc::now(),
            coordinator: coordinator.clone(),
            loaded: None,
        });
        // Leaves the request-accepting state while the slot is held.
        self.set_state(LifecycleState::Loading);

        let guard = ActiveGuard {
            controller: self,
            // A dropped convert future counts as cancelled.
            terminal: LifecycleState::Cancelled,
        };
        Some((guard, id, coordinator))
    }

    async fn run(
        &self,
        request: ConversionRequest,
        coordinator: &CancellationCoordinator,
        started: Instant,
    ) -> Result<ConversionResult, ConversionError> {
        let ConversionRequest {
            source_name,
            source_bytes,
            format_id,
            observer,
        } = request;

        let spec = self.supported_format(&format_id).await?;

        // Loading, published when the slot was claimed
        observer.on_log(&format!(
            "Loading {} ({} bytes)",
            source_name,
            source_bytes.len()
        ));
        observer.on_progress(0.0);

        let handle = self
            .engine
            .load(&source_name, &source_bytes)
            .await
            .map_err(ConversionError::from_engine)?;
        self.record_loaded(Some(handle.clone()));
        let head = hex_dump(&source_bytes[..source_bytes.len().min(HEX_DUMP_LEN)]);
        drop(source_bytes);

        let result = self
            .run_loaded(&handle, spec, &source_name, &head, &*observer, coordinator, started)
            .await;

        if let Err(e) = self.engine.release(&handle).await {
            warn!(handle = %handle.id, error = %e, "Failed to release engine handle");
        }
        self.record_loaded(None);

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_loaded(
        &self,
        handle: &SourceHandle,
        spec: &'static OutputFormatSpec,
        source_name: &str,
        head: &str,
        observer: &dyn ConversionObserver,
        coordinator: &CancellationCoordinator,
        started: Instant,
    ) -> Result<ConversionResult, ConversionError> {
        // Format detection
        self.set_state(LifecycleState::FormatDetecting);
        let container = match self.engine.detect_container(handle).await {
            Ok(container) => container,
            Err(e) => {
                observer.on_log(&format!(
                    "Could not detect container; first {} bytes: {}",
                    HEX_DUMP_LEN, head
                ));
                return Err(ConversionError::from_detection(e));
            }
        };
        observer.on_log(&format!("Detected container: {}", container));

        // Plan validation
        self.set_state(LifecycleState::PlanValidating);
        let options = PlanOptions::audio_only(spec.codec, spec.params);
        let plan = self
            .engine
            .build_plan(handle, &options)
            .await
            .map_err(ConversionError::from_engine)?;

        if !plan.is_executable() {
            return Err(ConversionError::from_engine(EngineError::PlanRejected {
                discarded: plan.discarded_tracks,
            }));
        }
        for track in &plan.discarded_tracks {
            debug!(kind = %track.kind, reason = track.reason.phrase(), "Track discarded");
        }

        // Execution
        self.set_state(LifecycleState::Executing);
        observer.on_log(&format!("Encoding audio to {}", spec.label));

        let relay = |ratio: f64| observer.on_progress(clamp_progress(ratio));
        let outcome = coordinator
            .race(
                self.engine.execute(&plan, &relay),
                self.engine.abort(handle),
            )
            .await;

        let output = match outcome {
            RaceOutcome::Completed(output) => output,
            RaceOutcome::Cancelled => {
                observer.on_log("Conversion cancelled");
                return Err(ConversionError::Cancelled);
            }
            RaceOutcome::Failed(e) => return Err(ConversionError::from_engine(e)),
        };

        // Finalization
        if output.is_empty() {
            return Err(ConversionError::EmptyOutput);
        }

        let file_name = output_file_name(source_name, spec.extension);
        let payload = OutputPayload::from(output);
        if let OutputPayload::Bytes(bytes) = &payload {
            metrics::OUTPUT_BYTES
                .with_label_values(&[spec.id])
                .observe(bytes.len() as f64);
        }

        observer.on_progress(1.0);
        observer.on_log(&format!("Conversion complete: {}", file_name));

        Ok(ConversionResult {
            file_name,
            mime_type: spec.mime_type,
            format_id: spec.id,
            payload,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Resolves `format_id` to a catalog entry the runtime can encode.
    async fn supported_format(
        &self,
        format_id: &str,
    ) -> Result<&'static OutputFormatSpec, ConversionError> {
        let support = self.registry.support(format_id).await;
        match find_format(format_id) {
            Some(spec) if support.supported => Ok(spec),
            _ => Err(ConversionError::UnsupportedFormat {
                format_id: format_id.to_string(),
                reason: support
                    .reason
                    .unwrap_or_else(|| format!("unknown output format '{}'", format_id)),
            }),
        }
    }

    fn record_loaded(&self, handle: Option<SourceHandle>) {
        if let Some(active) = self.lock_active().as_mut() {
            active.loaded = handle;
        }
    }

    /// Releases `handle` on a background task.
    fn release_detached(&self, handle: SourceHandle) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(handle = %handle.id, "No runtime to release engine handle on");
            return;
        };

        debug!(handle = %handle.id, "Releasing engine handle of abandoned conversion");
        let engine = Arc::clone(&self.engine);
        runtime.spawn(async move {
            if let Err(e) = engine.release(&handle).await {
                warn!(handle = %handle.id, error = %e, "Failed to release engine handle");
            }
        });
    }

    fn set_state(&self, state: LifecycleState) {
        debug!(state = %state, "Lifecycle transition");
        self.state_tx.send_replace(state);
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveConversion>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clamps an engine progress value into `[0, 1]`. NaN becomes 0.
pub(crate) fn clamp_progress(ratio: f64) -> f64 {
    if ratio.is_nan() {
        0.0
    } else {
        ratio.clamp(0.0, 1.0)
    }
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
