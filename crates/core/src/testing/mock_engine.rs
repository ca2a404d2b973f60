//! Mock media engine for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};

use crate::engine::{
    ConversionPlan, DiscardReason, DiscardedTrack, EngineError, EngineOutput, MediaEngine,
    PlanOptions, ProgressSink, SourceHandle, TrackKind,
};
use crate::formats::{AudioCodec, EncodeParams, EncoderProbe};

/// A track inside the mock source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTrack {
    pub kind: TrackKind,
    /// `None` means the codec could not be identified.
    pub codec: Option<String>,
}

impl MockTrack {
    pub fn audio(codec: &str) -> Self {
        Self {
            kind: TrackKind::Audio,
            codec: Some(codec.to_string()),
        }
    }

    pub fn video(codec: &str) -> Self {
        Self {
            kind: TrackKind::Video,
            codec: Some(codec.to_string()),
        }
    }

    pub fn unknown(kind: TrackKind) -> Self {
        Self { kind, codec: None }
    }
}

#[derive(Debug, Default)]
struct CallCounts {
    loads: AtomicUsize,
    detects: AtomicUsize,
    plans: AtomicUsize,
    executes: AtomicUsize,
    aborts: AtomicUsize,
    releases: AtomicUsize,
    probes: AtomicUsize,
}

/// Mock implementation of [`MediaEngine`] and [`EncoderProbe`].
///
/// Provides controllable behavior for testing:
/// - Scripted tracks, container name and detection failure
/// - Scripted progress values, including out-of-range ones
/// - Runs that hang until aborted
/// - Call counters for every engine operation
///
/// # Example
///
/// ```rust,ignore
/// use audiograb_core::testing::{MockEngine, MockTrack};
///
/// let engine = MockEngine::new();
/// engine.set_tracks(vec![MockTrack::video("h264"), MockTrack::audio("aac")]).await;
/// engine.set_progress_script(vec![-0.2, 1.4, 0.5]).await;
///
/// // Drive a controller with it...
///
/// assert_eq!(engine.release_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockEngine {
    container: Arc<RwLock<String>>,
    detect_error: Arc<RwLock<Option<String>>>,
    tracks: Arc<RwLock<Vec<MockTrack>>>,
    undecodable: Arc<RwLock<HashSet<String>>>,
    encoders: Arc<RwLock<HashSet<AudioCodec>>>,
    failing_probes: Arc<AtomicBool>,
    probe_delay: Arc<RwLock<Duration>>,
    progress_script: Arc<RwLock<Vec<f64>>>,
    step_delay: Arc<RwLock<Duration>>,
    hang_until_aborted: Arc<AtomicBool>,
    output: Arc<RwLock<EngineOutput>>,
    next_execute_error: Arc<RwLock<Option<EngineError>>>,
    failing_abort: Arc<AtomicBool>,
    aborted: Arc<AtomicBool>,
    abort_notify: Arc<Notify>,
    recorded_plans: Arc<RwLock<Vec<PlanOptions>>>,
    calls: Arc<CallCounts>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a mock engine holding one video and one audio track.
    pub fn new() -> Self {
        Self {
            container: Arc::new(RwLock::new("matroska".to_string())),
            detect_error: Arc::new(RwLock::new(None)),
            tracks: Arc::new(RwLock::new(vec![
                MockTrack::video("h264"),
                MockTrack::audio("aac"),
            ])),
            undecodable: Arc::new(RwLock::new(HashSet::new())),
            encoders: Arc::new(RwLock::new(
                [
                    AudioCodec::Mp3,
                    AudioCodec::PcmS16,
                    AudioCodec::Opus,
                    AudioCodec::Aac,
                    AudioCodec::Flac,
                ]
                .into_iter()
                .collect(),
            )),
            failing_probes: Arc::new(AtomicBool::new(false)),
            probe_delay: Arc::new(RwLock::new(Duration::ZERO)),
            progress_script: Arc::new(RwLock::new(vec![0.25, 0.5, 0.75, 1.0])),
            step_delay: Arc::new(RwLock::new(Duration::from_millis(5))),
            hang_until_aborted: Arc::new(AtomicBool::new(false)),
            output: Arc::new(RwLock::new(EngineOutput::from_bytes(
                b"ID3\x04\x00mock-audio".to_vec(),
            ))),
            next_execute_error: Arc::new(RwLock::new(None)),
            failing_abort: Arc::new(AtomicBool::new(false)),
            aborted: Arc::new(AtomicBool::new(false)),
            abort_notify: Arc::new(Notify::new()),
            recorded_plans: Arc::new(RwLock::new(Vec::new())),
            calls: Arc::new(CallCounts::default()),
        }
    }

    /// Set the container name returned by detection.
    pub async fn set_container(&self, name: &str) {
        *self.container.write().await = name.to_string();
    }

    /// Make detection fail as an unrecognized container.
    pub async fn fail_detection(&self, reason: &str) {
        *self.detect_error.write().await = Some(reason.to_string());
    }

    /// Replace the tracks of the source.
    pub async fn set_tracks(&self, tracks: Vec<MockTrack>) {
        *self.tracks.write().await = tracks;
    }

    /// Mark a source codec as undecodable.
    pub async fn set_undecodable(&self, codec: &str) {
        self.undecodable.write().await.insert(codec.to_string());
    }

    /// Restrict the encoders the engine has.
    pub async fn set_encoders(&self, codecs: &[AudioCodec]) {
        *self.encoders.write().await = codecs.iter().copied().collect();
    }

    /// Make every capability probe return an error.
    pub fn set_failing_probes(&self, fail: bool) {
        self.failing_probes.store(fail, Ordering::SeqCst);
    }

    /// Delay each capability probe.
    pub async fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.write().await = delay;
    }

    /// Progress values reported by `execute`, in order.
    pub async fn set_progress_script(&self, script: Vec<f64>) {
        *self.progress_script.write().await = script;
    }

    /// Pause between progress values.
    pub async fn set_step_delay(&self, delay: Duration) {
        *self.step_delay.write().await = delay;
    }

    /// After the script, keep running until `abort` is called.
    pub fn set_hang_until_aborted(&self, hang: bool) {
        self.hang_until_aborted.store(hang, Ordering::SeqCst);
    }

    /// Output returned by a successful `execute`.
    pub async fn set_output(&self, output: EngineOutput) {
        *self.output.write().await = output;
    }

    /// Make the next `execute` fail with `error`.
    pub async fn set_next_execute_error(&self, error: EngineError) {
        *self.next_execute_error.write().await = Some(error);
    }

    /// Make `abort` itself return an error (after taking effect).
    pub fn set_failing_abort(&self, fail: bool) {
        self.failing_abort.store(fail, Ordering::SeqCst);
    }

    /// Plan options received by `build_plan`.
    pub async fn recorded_plans(&self) -> Vec<PlanOptions> {
        self.recorded_plans.read().await.clone()
    }

    pub fn load_count(&self) -> usize {
        self.calls.loads.load(Ordering::SeqCst)
    }

    pub fn detect_count(&self) -> usize {
        self.calls.detects.load(Ordering::SeqCst)
    }

    pub fn plan_count(&self) -> usize {
        self.calls.plans.load(Ordering::SeqCst)
    }

    pub fn execute_count(&self) -> usize {
        self.calls.executes.load(Ordering::SeqCst)
    }

    pub fn abort_count(&self) -> usize {
        self.calls.aborts.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.calls.releases.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.calls.probes.load(Ordering::SeqCst)
    }

    fn discard_reason(
        &self,
        track: &MockTrack,
        options: &PlanOptions,
        undecodable: &HashSet<String>,
        can_encode: bool,
        kept_audio: bool,
    ) -> Option<DiscardReason> {
        match track.kind {
            TrackKind::Video if options.discard_video => Some(DiscardReason::DiscardedByUser),
            TrackKind::Video => Some(DiscardReason::MaxTrackCountReached),
            TrackKind::Audio => match track.codec.as_deref() {
                None => Some(DiscardReason::UnknownSourceCodec),
                Some(codec) if undecodable.contains(codec) => {
                    Some(DiscardReason::UndecodableSourceCodec)
                }
                Some(_) if !can_encode => Some(DiscardReason::NoEncodableTargetCodec),
                Some(_) if kept_audio => Some(DiscardReason::MaxTrackCountOfTypeReached),
                Some(_) => None,
            },
        }
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load(&self, source_name: &str, bytes: &[u8]) -> Result<SourceHandle, EngineError> {
        self.calls.loads.fetch_add(1, Ordering::SeqCst);
        self.aborted.store(false, Ordering::SeqCst);
        Ok(SourceHandle::new(source_name, bytes.len() as u64))
    }

    async fn detect_container(&self, _handle: &SourceHandle) -> Result<String, EngineError> {
        self.calls.detects.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.detect_error.read().await.as_ref() {
            return Err(EngineError::unrecognized(reason.clone()));
        }
        Ok(self.container.read().await.clone())
    }

    async fn build_plan(
        &self,
        handle: &SourceHandle,
        options: &PlanOptions,
    ) -> Result<ConversionPlan, EngineError> {
        self.calls.plans.fetch_add(1, Ordering::SeqCst);
        self.recorded_plans.write().await.push(options.clone());

        let tracks = self.tracks.read().await.clone();
        let undecodable = self.undecodable.read().await.clone();
        let can_encode = self.encoders.read().await.contains(&options.audio_codec);

        let mut kept_tracks = 0;
        let mut discarded_tracks = Vec::new();
        for track in &tracks {
            match self.discard_reason(track, options, &undecodable, can_encode, kept_tracks > 0) {
                Some(reason) => discarded_tracks.push(DiscardedTrack::new(track.kind, reason)),
                None => kept_tracks += 1,
            }
        }

        Ok(ConversionPlan {
            handle: handle.clone(),
            options: options.clone(),
            is_valid: kept_tracks > 0,
            kept_tracks,
            discarded_tracks,
        })
    }

    async fn execute(
        &self,
        _plan: &ConversionPlan,
        progress: ProgressSink<'_>,
    ) -> Result<EngineOutput, EngineError> {
        self.calls.executes.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.next_execute_error.write().await.take() {
            return Err(err);
        }

        let script = self.progress_script.read().await.clone();
        let step_delay = *self.step_delay.read().await;

        for ratio in script {
            if self.aborted.load(Ordering::SeqCst) {
                return Err(EngineError::Aborted);
            }
            progress(ratio);
            tokio::time::sleep(step_delay).await;
        }

        if self.hang_until_aborted.load(Ordering::SeqCst) {
            while !self.aborted.load(Ordering::SeqCst) {
                self.abort_notify.notified().await;
            }
            return Err(EngineError::Aborted);
        }

        Ok(self.output.read().await.clone())
    }

    async fn abort(&self, _handle: &SourceHandle) -> Result<(), EngineError> {
        self.calls.aborts.fetch_add(1, Ordering::SeqCst);
        self.aborted.store(true, Ordering::SeqCst);
        self.abort_notify.notify_one();
        if self.failing_abort.load(Ordering::SeqCst) {
            return Err(EngineError::failed("mock abort failure"));
        }
        Ok(())
    }

    async fn release(&self, _handle: &SourceHandle) -> Result<(), EngineError> {
        self.calls.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl EncoderProbe for MockEngine {
    async fn can_encode(
        &self,
        codec: AudioCodec,
        _params: &EncodeParams,
    ) -> Result<bool, EngineError> {
        self.calls.probes.fetch_add(1, Ordering::SeqCst);

        let delay = *self.probe_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing_probes.load(Ordering::SeqCst) {
            return Err(EngineError::failed("mock probe failure"));
        }
        Ok(self.encoders.read().await.contains(&codec))
    }
}
