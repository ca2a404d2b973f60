//! FFmpeg-based engine implementation.
//!
//! Each loaded source gets its own temporary directory holding the input
//! bytes and, once executed, the encoded output. Container detection and
//! track listing come from `ffprobe`; encoding runs `ffmpeg` with
//! `-progress pipe:2` so progress can be read from stderr.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{OnceCell, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::capabilities::EncoderCapabilities;
use super::config::EngineConfig;
use super::error::EngineError;
use super::traits::{MediaEngine, ProgressSink};
use super::types::{
    ConversionPlan, DiscardReason, DiscardedTrack, EngineOutput, PlanOptions, SourceHandle,
    TrackKind,
};
use crate::formats::{AudioCodec, EncodeParams, EncoderProbe};

/// Container and stream listing reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
struct ProbeReport {
    format_name: String,
    duration_secs: Option<f64>,
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct ProbeStream {
    index: u32,
    #[serde(default)]
    codec_type: String,
    codec_name: Option<String>,
}

/// Everything the engine keeps for one loaded source.
struct LoadedSource {
    // Removed from disk when dropped.
    _dir: TempDir,
    input_path: PathBuf,
    output_dir: PathBuf,
    report: Option<ProbeReport>,
    selected_stream: Option<u32>,
    abort: CancellationToken,
}

/// FFmpeg-based engine implementation.
pub struct FfmpegEngine {
    config: EngineConfig,
    sources: RwLock<HashMap<Uuid, LoadedSource>>,
    capabilities: OnceCell<EncoderCapabilities>,
}

impl FfmpegEngine {
    /// Creates a new FFmpeg engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            sources: RwLock::new(HashMap::new()),
            capabilities: OnceCell::new(),
        }
    }

    /// Creates an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Audio encoders of the configured ffmpeg, detected once.
    pub async fn capabilities(&self) -> &EncoderCapabilities {
        self.capabilities
            .get_or_init(|| EncoderCapabilities::detect(&self.config))
            .await
    }

    /// Validates that ffmpeg and ffprobe can be launched and the temp dir exists.
    pub async fn validate(&self) -> Result<(), EngineError> {
        let ffmpeg_result = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffmpeg_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(EngineError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                });
            }
            return Err(EngineError::Io(e));
        }

        let ffprobe_result = Command::new(&self.config.ffprobe_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffprobe_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(EngineError::FfprobeNotFound {
                    path: self.config.ffprobe_path.clone(),
                });
            }
            return Err(EngineError::Io(e));
        }

        tokio::fs::create_dir_all(&self.config.temp_dir).await?;

        Ok(())
    }

    /// Builds ffmpeg arguments for extracting one audio stream.
    fn build_args(
        &self,
        input_path: &Path,
        output_path: &Path,
        stream_index: u32,
        codec: AudioCodec,
        params: &EncodeParams,
    ) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
            "-map".to_string(),
            format!("0:{}", stream_index),
            "-vn".to_string(),
            "-sn".to_string(),
            "-dn".to_string(),
            "-c:a".to_string(),
            codec.ffmpeg_encoder().to_string(),
        ];

        // Bitrate (for lossy codecs)
        if !codec.is_lossless() {
            if let Some(bitrate) = params.bitrate_bps {
                args.extend(["-b:a".to_string(), format!("{}k", bitrate / 1000)]);
            }
        }

        if let Some(rate) = params.sample_rate_hz {
            args.extend(["-ar".to_string(), rate.to_string()]);
        }

        if let Some(channels) = params.channels {
            args.extend(["-ac".to_string(), channels.to_string()]);
        }

        args.extend([
            "-f".to_string(),
            codec.ffmpeg_muxer().to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
            "-nostats".to_string(),
        ]);

        args.extend(self.config.extra_ffmpeg_args.iter().cloned());

        args.push(output_path.to_string_lossy().to_string());

        args
    }

    /// Parses ffprobe JSON output.
    fn parse_probe_output(output: &str) -> Result<ProbeReport, EngineError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: Option<ProbeFormat>,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            duration: Option<String>,
        }

        let probe: ProbeOutput = serde_json::from_str(output)
            .map_err(|e| EngineError::failed(format!("Failed to parse ffprobe output: {}", e)))?;

        let format = probe
            .format
            .ok_or_else(|| EngineError::unrecognized("ffprobe reported no container format"))?;

        let format_name = format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown")
            .to_string();

        Ok(ProbeReport {
            format_name,
            duration_secs: format.duration.as_ref().and_then(|d| d.parse::<f64>().ok()),
            streams: probe.streams,
        })
    }

    /// Decides which streams survive into the output.
    ///
    /// Audio-only outputs hold exactly one audio track; the first decodable
    /// audio stream wins.
    fn plan_tracks(
        streams: &[ProbeStream],
        options: &PlanOptions,
        encoder_available: bool,
    ) -> (Option<u32>, Vec<DiscardedTrack>) {
        let mut selected = None;
        let mut discarded = Vec::new();

        for stream in streams {
            match stream.codec_type.as_str() {
                "video" => {
                    let reason = if options.discard_video {
                        DiscardReason::DiscardedByUser
                    } else {
                        DiscardReason::MaxTrackCountReached
                    };
                    discarded.push(DiscardedTrack::new(TrackKind::Video, reason));
                }
                "audio" => {
                    let known_codec = stream
                        .codec_name
                        .as_deref()
                        .is_some_and(|name| !name.is_empty() && name != "unknown");

                    let reason = if !known_codec {
                        Some(DiscardReason::UnknownSourceCodec)
                    } else if !encoder_available {
                        Some(DiscardReason::NoEncodableTargetCodec)
                    } else if selected.is_some() {
                        Some(DiscardReason::MaxTrackCountOfTypeReached)
                    } else {
                        None
                    };

                    match reason {
                        Some(reason) => {
                            discarded.push(DiscardedTrack::new(TrackKind::Audio, reason))
                        }
                        None => selected = Some(stream.index),
                    }
                }
                // Subtitles, data and attachments are not tracks we report on.
                _ => {}
            }
        }

        (selected, discarded)
    }

    fn missing(handle: &SourceHandle) -> EngineError {
        EngineError::UnknownHandle { id: handle.id }
    }
}

/// Turns `-progress` key/value lines into completion ratios.
struct ProgressParser {
    time_regex: Option<Regex>,
    duration_secs: Option<f64>,
}

impl ProgressParser {
    fn new(duration_secs: Option<f64>) -> Self {
        Self {
            time_regex: Regex::new(r"^out_time_ms=(\d+)").ok(),
            duration_secs,
        }
    }

    /// Ratio for a progress line, if the line carries a position.
    fn ratio(&self, line: &str) -> Option<f64> {
        if line.trim() == "progress=end" {
            return Some(1.0);
        }

        let caps = self.time_regex.as_ref()?.captures(line)?;
        // out_time_ms is in microseconds despite its name.
        let secs = caps.get(1)?.as_str().parse::<f64>().ok()? / 1_000_000.0;
        match self.duration_secs {
            Some(dur) if dur > 0.0 => Some(secs / dur),
            _ => None,
        }
    }
}

/// Reads ffmpeg's stderr to the end, relaying progress and collecting
/// diagnostics.
///
/// Lines are decoded lossily. The pipe must be drained until EOF or ffmpeg
/// blocks on a full pipe.
async fn drain_stderr<R>(
    mut reader: R,
    parser: &ProgressParser,
    progress: ProgressSink<'_>,
) -> std::io::Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut error_output = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let decoded = String::from_utf8_lossy(&buf);
        let line = decoded.trim_end_matches(['\r', '\n']);
        if let Some(ratio) = parser.ratio(line) {
            progress(ratio);
        } else if !line.contains('=') {
            // Anything that is not a progress key is a diagnostic.
            error_output.push_str(line);
            error_output.push('\n');
        }
    }

    Ok(error_output)
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn load(&self, source_name: &str, bytes: &[u8]) -> Result<SourceHandle, EngineError> {
        tokio::fs::create_dir_all(&self.config.temp_dir).await?;

        let dir = tempfile::Builder::new()
            .prefix("source-")
            .tempdir_in(&self.config.temp_dir)?;

        // Keep the extension so ffprobe gets a format hint.
        let extension = Path::new(source_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        let input_path = dir.path().join(format!("input{}", extension));
        tokio::fs::write(&input_path, bytes).await?;

        let handle = SourceHandle::new(source_name, bytes.len() as u64);
        debug!(handle = %handle.id, path = ?input_path, "Loaded source");

        let output_dir = dir.path().to_path_buf();
        self.sources.write().await.insert(
            handle.id,
            LoadedSource {
                _dir: dir,
                input_path,
                output_dir,
                report: None,
                selected_stream: None,
                abort: CancellationToken::new(),
            },
        );

        Ok(handle)
    }

    async fn detect_container(&self, handle: &SourceHandle) -> Result<String, EngineError> {
        let input_path = self
            .sources
            .read()
            .await
            .get(&handle.id)
            .map(|s| s.input_path.clone())
            .ok_or_else(|| Self::missing(handle))?;

        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(&input_path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::FfprobeNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    EngineError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(EngineError::unrecognized(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let report = Self::parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
        let format_name = report.format_name.clone();

        let mut sources = self.sources.write().await;
        let source = sources.get_mut(&handle.id).ok_or_else(|| Self::missing(handle))?;
        source.report = Some(report);

        Ok(format_name)
    }

    async fn build_plan(
        &self,
        handle: &SourceHandle,
        options: &PlanOptions,
    ) -> Result<ConversionPlan, EngineError> {
        let has_report = self
            .sources
            .read()
            .await
            .get(&handle.id)
            .ok_or_else(|| Self::missing(handle))?
            .report
            .is_some();
        if !has_report {
            self.detect_container(handle).await?;
        }

        let encoder_available = self.capabilities().await.supports(options.audio_codec);

        let mut sources = self.sources.write().await;
        let source = sources.get_mut(&handle.id).ok_or_else(|| Self::missing(handle))?;
        let streams = source
            .report
            .as_ref()
            .map(|r| r.streams.as_slice())
            .unwrap_or_default();

        let (selected, discarded_tracks) =
            Self::plan_tracks(streams, options, encoder_available);
        source.selected_stream = selected;

        Ok(ConversionPlan {
            handle: handle.clone(),
            options: options.clone(),
            is_valid: selected.is_some(),
            kept_tracks: usize::from(selected.is_some()),
            discarded_tracks,
        })
    }

    async fn execute(
        &self,
        plan: &ConversionPlan,
        progress: ProgressSink<'_>,
    ) -> Result<EngineOutput, EngineError> {
        let (input_path, output_dir, stream_index, duration_secs, abort) = {
            let sources = self.sources.read().await;
            let source = sources
                .get(&plan.handle.id)
                .ok_or_else(|| Self::missing(&plan.handle))?;
            let stream_index = source.selected_stream.ok_or(EngineError::PlanRejected {
                discarded: plan.discarded_tracks.clone(),
            })?;
            (
                source.input_path.clone(),
                source.output_dir.clone(),
                stream_index,
                source.report.as_ref().and_then(|r| r.duration_secs),
                source.abort.clone(),
            )
        };

        let codec = plan.options.audio_codec;
        let output_path = output_dir.join(format!("output.{}", codec.ffmpeg_muxer()));
        let args = self.build_args(
            &input_path,
            &output_path,
            stream_index,
            codec,
            &plan.options.audio_params,
        );
        debug!(args = ?args, "Spawning ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    EngineError::Io(e)
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::failed("ffmpeg stderr was not captured"))?;
        let parser = ProgressParser::new(duration_secs);

        let run = async {
            let error_output = drain_stderr(BufReader::new(stderr), &parser, progress).await?;
            let status = child.wait().await?;
            Ok::<(std::process::ExitStatus, String), std::io::Error>((status, error_output))
        };

        let result = tokio::select! {
            _ = abort.cancelled() => None,
            result = run => Some(result),
        };

        let (status, error_output) = match result {
            Some(Ok(done)) => done,
            Some(Err(e)) => return Err(EngineError::Io(e)),
            None => {
                let _ = child.kill().await;
                return Err(EngineError::Aborted);
            }
        };

        if !status.success() {
            let stderr = error_output.trim();
            return Err(EngineError::failed(if stderr.is_empty() {
                format!("FFmpeg exited with code: {:?}", status.code())
            } else {
                format!("FFmpeg exited with code {:?}: {}", status.code(), stderr)
            }));
        }

        let bytes = tokio::fs::read(&output_path).await?;
        Ok(EngineOutput::from_bytes(bytes))
    }

    async fn abort(&self, handle: &SourceHandle) -> Result<(), EngineError> {
        let sources = self.sources.read().await;
        let source = sources.get(&handle.id).ok_or_else(|| Self::missing(handle))?;
        source.abort.cancel();
        Ok(())
    }

    async fn release(&self, handle: &SourceHandle) -> Result<(), EngineError> {
        match self.sources.write().await.remove(&handle.id) {
            Some(source) => {
                debug!(handle = %handle.id, path = ?source.input_path, "Released source");
                Ok(())
            }
            None => {
                warn!(handle = %handle.id, "Release of unknown source handle");
                Err(Self::missing(handle))
            }
        }
    }
}

#[async_trait]
impl EncoderProbe for FfmpegEngine {
    async fn can_encode(
        &self,
        codec: AudioCodec,
        _params: &EncodeParams,
    ) -> Result<bool, EngineError> {
        let caps = self.capabilities().await;
        if caps.is_empty() {
            return Err(EngineError::FfmpegNotFound {
                path: self.config.ffmpeg_path.clone(),
            });
        }
        Ok(caps.supports(codec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_stderr_drain_survives_invalid_utf8() {
        let parser = ProgressParser::new(Some(10.0));
        let stderr: &[u8] =
            b"out_time_ms=2000000\n[mov] bad name \xff\xfe\nout_time_ms=5000000\nprogress=end\n";

        let seen = Mutex::new(Vec::new());
        let diagnostics = drain_stderr(stderr, &parser, &|r| seen.lock().unwrap().push(r))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0.2, 0.5, 1.0]);
        assert!(diagnostics.starts_with("[mov] bad name"));
        assert_eq!(diagnostics.lines().count(), 1);
    }

    fn stream(index: u32, codec_type: &str, codec_name: Option<&str>) -> ProbeStream {
        ProbeStream {
            index,
            codec_type: codec_type.to_string(),
            codec_name: codec_name.map(str::to_string),
        }
    }

    fn mp3_options() -> PlanOptions {
        let spec = crate::formats::find_format("mp3").unwrap();
        PlanOptions::audio_only(spec.codec, spec.params)
    }

    #[test]
    fn test_build_args_mp3() {
        let engine = FfmpegEngine::with_defaults();
        let spec = crate::formats::find_format("mp3").unwrap();

        let args = engine.build_args(
            Path::new("/work/input.mkv"),
            Path::new("/work/output.mp3"),
            1,
            spec.codec,
            &spec.params,
        );

        assert!(args.contains(&"0:1".to_string()));
        assert!(args.contains(&"-vn".to_string()));
        assert!(args.contains(&"libmp3lame".to_string()));
        assert!(args.contains(&"192k".to_string()));
        assert!(args.contains(&"44100".to_string()));
        assert_eq!(args.last().unwrap(), "/work/output.mp3");
    }

    #[test]
    fn test_build_args_flac_has_no_bitrate() {
        let engine = FfmpegEngine::with_defaults();
        let spec = crate::formats::find_format("flac").unwrap();

        let args = engine.build_args(
            Path::new("/in.wav"),
            Path::new("/out.flac"),
            0,
            spec.codec,
            &spec.params,
        );

        assert!(args.contains(&"flac".to_string()));
        assert!(!args.contains(&"-b:a".to_string()));
        assert!(!args.contains(&"-ar".to_string()));
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "format": {
                "filename": "clip.mov",
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                "duration": "12.5"
            },
            "streams": [
                { "index": 0, "codec_type": "video", "codec_name": "h264" },
                { "index": 1, "codec_type": "audio", "codec_name": "aac" }
            ]
        }"#;

        let report = FfmpegEngine::parse_probe_output(json).unwrap();
        assert_eq!(report.format_name, "mov");
        assert_eq!(report.duration_secs, Some(12.5));
        assert_eq!(report.streams.len(), 2);
    }

    #[test]
    fn test_parse_probe_output_without_format() {
        let err = FfmpegEngine::parse_probe_output(r#"{"streams": []}"#).unwrap_err();
        assert!(matches!(err, EngineError::UnrecognizedContainer { .. }));
    }

    #[test]
    fn test_plan_discards_video_and_keeps_first_audio() {
        let streams = vec![
            stream(0, "video", Some("h264")),
            stream(1, "audio", Some("aac")),
            stream(2, "audio", Some("ac3")),
            stream(3, "subtitle", Some("mov_text")),
        ];

        let (selected, discarded) = FfmpegEngine::plan_tracks(&streams, &mp3_options(), true);
        assert_eq!(selected, Some(1));
        assert_eq!(
            discarded,
            vec![
                DiscardedTrack::new(TrackKind::Video, DiscardReason::DiscardedByUser),
                DiscardedTrack::new(TrackKind::Audio, DiscardReason::MaxTrackCountOfTypeReached),
            ]
        );
    }

    #[test]
    fn test_plan_without_encoder() {
        let streams = vec![stream(0, "audio", Some("aac"))];
        let (selected, discarded) = FfmpegEngine::plan_tracks(&streams, &mp3_options(), false);
        assert_eq!(selected, None);
        assert_eq!(discarded[0].reason, DiscardReason::NoEncodableTargetCodec);
    }

    #[test]
    fn test_plan_unknown_codec() {
        let streams = vec![stream(0, "audio", None), stream(1, "audio", Some("unknown"))];
        let (selected, discarded) = FfmpegEngine::plan_tracks(&streams, &mp3_options(), true);
        assert_eq!(selected, None);
        assert!(discarded
            .iter()
            .all(|t| t.reason == DiscardReason::UnknownSourceCodec));
    }

    #[test]
    fn test_progress_parser() {
        let parser = ProgressParser::new(Some(10.0));
        assert_eq!(parser.ratio("out_time_ms=5000000"), Some(0.5));
        assert_eq!(parser.ratio("progress=end"), Some(1.0));
        assert_eq!(parser.ratio("bitrate=128.0kbits/s"), None);

        let unknown_duration = ProgressParser::new(None);
        assert_eq!(unknown_duration.ratio("out_time_ms=5000000"), None);
    }

    #[tokio::test]
    async fn test_load_and_release() {
        let temp = tempfile::tempdir().unwrap();
        let engine =
            FfmpegEngine::new(EngineConfig::default().with_temp_dir(temp.path().to_path_buf()));

        let handle = engine.load("Clip.MKV", b"not really a video").await.unwrap();
        assert_eq!(handle.size_bytes, 18);

        let input = engine.sources.read().await[&handle.id].input_path.clone();
        assert!(input.exists());
        assert_eq!(input.extension().unwrap(), "mkv");

        engine.abort(&handle).await.unwrap();
        engine.release(&handle).await.unwrap();
        assert!(!input.exists());
        assert!(matches!(
            engine.release(&handle).await,
            Err(EngineError::UnknownHandle { .. })
        ));
    }
}
