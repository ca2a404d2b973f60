//! Saving results and keeping recent log lines.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use audiograb_core::{ConversionResult, OutputPayload};
use tracing::info;

/// Log lines kept for the failure report.
pub const LOG_TAIL_LINES: usize = 40;

/// The most recent log lines of a conversion.
#[derive(Debug)]
pub struct LogTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}

impl Default for LogTail {
    fn default() -> Self {
        Self::new(LOG_TAIL_LINES)
    }
}

/// Writes a finished conversion into `dir` and returns the file path.
///
/// Remote outputs are downloaded first.
pub async fn save_result(result: &ConversionResult, dir: &Path, overwrite: bool) -> Result<PathBuf> {
    let bytes = match &result.payload {
        OutputPayload::Bytes(bytes) => bytes.clone(),
        OutputPayload::RemoteUrl(url) => download(url).await?,
    };
    write_output(dir, &result.file_name, &bytes, overwrite).await
}

async fn download(url: &str) -> Result<Vec<u8>> {
    info!(url = %url, "Downloading converted file");
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("Failed to fetch {}", url))?
        .error_for_status()
        .with_context(|| format!("Download of {} failed", url))?;
    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read body of {}", url))?;
    Ok(bytes.to_vec())
}

async fn write_output(dir: &Path, file_name: &str, bytes: &[u8], overwrite: bool) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory {:?}", dir))?;

    let path = dir.join(file_name);
    if !overwrite && tokio::fs::try_exists(&path).await.unwrap_or(false) {
        bail!("Output file already exists: {:?} (use --overwrite)", path);
    }

    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}
