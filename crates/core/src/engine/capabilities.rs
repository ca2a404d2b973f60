//! Audio encoder capability detection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::process::Stdio;
use tokio::process::Command;

use super::config::EngineConfig;
use crate::formats::AudioCodec;

/// Audio encoders the local ffmpeg build reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderCapabilities {
    encoders: BTreeSet<String>,
}

impl EncoderCapabilities {
    /// Detect available audio encoders by probing ffmpeg.
    ///
    /// A missing or failing binary yields an empty set.
    pub async fn detect(config: &EngineConfig) -> Self {
        let output = Command::new(&config.ffmpeg_path)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;

        match output {
            Ok(o) if o.status.success() => Self::parse(&String::from_utf8_lossy(&o.stdout)),
            _ => Self::default(),
        }
    }

    /// Parses the table printed by `ffmpeg -encoders`.
    ///
    /// Rows look like ` A....D libmp3lame  libmp3lame MP3 ...`; only audio
    /// rows (flags starting with `A`) are kept.
    pub fn parse(listing: &str) -> Self {
        let encoders = listing
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let flags = parts.next()?;
                let name = parts.next()?;
                // Legend rows (" A..... = Audio") share the flag shape.
                (flags.len() == 6 && flags.starts_with('A') && name != "=")
                    .then(|| name.to_string())
            })
            .collect();
        Self { encoders }
    }

    /// Whether the encoder backing `codec` is present.
    pub fn supports(&self, codec: AudioCodec) -> bool {
        self.encoders.contains(codec.ffmpeg_encoder())
    }

    /// Number of audio encoders found.
    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC
 A....D aac                  AAC (Advanced Audio Coding)
 A....D flac                 FLAC (Free Lossless Audio Codec)
 A....D libmp3lame           libmp3lame MP3 (MPEG audio layer 3)
 A..... pcm_s16le            PCM signed 16-bit little-endian
";

    #[test]
    fn test_default_capabilities() {
        let caps = EncoderCapabilities::default();
        assert!(caps.is_empty());
        assert!(!caps.supports(AudioCodec::Mp3));
    }

    #[test]
    fn test_parse_listing() {
        let caps = EncoderCapabilities::parse(LISTING);
        assert_eq!(caps.len(), 4);
        assert!(caps.supports(AudioCodec::Aac));
        assert!(caps.supports(AudioCodec::Flac));
        assert!(caps.supports(AudioCodec::Mp3));
        assert!(caps.supports(AudioCodec::PcmS16));
        assert!(!caps.supports(AudioCodec::Opus));
    }

    #[test]
    fn test_video_rows_ignored() {
        let caps = EncoderCapabilities::parse(LISTING);
        assert!(!caps.encoders.contains("libx264"));
    }
}
