//! Output file naming.

use once_cell::sync::Lazy;
use regex_lite::Regex;

const MAX_BASE_LEN: usize = 64;
const FALLBACK_BASE: &str = "audio";

static EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^./\\]+$").unwrap());
static DISALLOWED_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]+").unwrap());

/// Builds `<sanitized-base>.<extension>` from a source file name.
///
/// The source extension is dropped, runs of characters outside
/// `[A-Za-z0-9_-]` collapse to one underscore, edge underscores are
/// trimmed, the result is lower-cased and cut to 64 characters. An empty
/// base becomes `audio`.
pub fn output_file_name(source_name: &str, extension: &str) -> String {
    let file_name = source_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source_name);

    let stem = EXTENSION.replace(file_name, "");
    let replaced = DISALLOWED_RUN.replace_all(&stem, "_");
    let mut base = replaced.trim_matches('_').to_ascii_lowercase();
    // Only ASCII survives the replacement, so byte truncation is safe.
    base.truncate(MAX_BASE_LEN);
    if base.is_empty() {
        base = FALLBACK_BASE.to_string();
    }

    format!("{}.{}", base, extension.trim_start_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitizes_punctuation_and_case() {
        assert_eq!(
            output_file_name("My Clip (Final)!!.mov", ".mp3"),
            "my_clip_final.mp3"
        );
    }

    #[test]
    fn test_all_symbols_fall_back() {
        assert_eq!(output_file_name("!!! ???.mov", "mp3"), "audio.mp3");
        assert_eq!(output_file_name("", "wav"), "audio.wav");
    }

    #[test]
    fn test_keeps_dash_and_underscore() {
        assert_eq!(
            output_file_name("live-set_2024.final.mkv", "flac"),
            "live-set_2024_final.flac"
        );
    }

    #[test]
    fn test_non_ascii_collapses() {
        assert_eq!(output_file_name("Café déjà vu.mp4", "ogg"), "caf_d_j_vu.ogg");
    }

    #[test]
    fn test_truncates_long_names() {
        let long = format!("{}.mp4", "a".repeat(100));
        let name = output_file_name(&long, "aac");
        assert_eq!(name, format!("{}.aac", "a".repeat(64)));
    }

    #[test]
    fn test_strips_directories() {
        assert_eq!(output_file_name("/home/me/Videos/Talk.webm", "mp3"), "talk.mp3");
    }

    #[test]
    fn test_name_without_extension() {
        assert_eq!(output_file_name("recording", "wav"), "recording.wav");
    }
}
