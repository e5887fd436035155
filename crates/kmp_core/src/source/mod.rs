//! Source resolution.
//!
//! A source reference is either an `http`/`https` URL, which is downloaded,
//! or a local media file, which is checked and used in place.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use url::Url;

use crate::config::DownloadSettings;
use crate::error::{StageError, StageResult};
use crate::logging::JobLogger;
use crate::tools::Downloader;

/// What a source reference points at.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    Url(Url),
    Path(PathBuf),
}

/// Classify a source reference without touching the network.
pub fn classify(source: &str) -> SourceKind {
    let trimmed = source.trim();
    match Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {
            SourceKind::Url(url)
        }
        _ => SourceKind::Path(PathBuf::from(trimmed)),
    }
}

/// A source materialized on the local filesystem.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    /// File holding the source audio.
    pub media_path: PathBuf,
    /// Separate video file, when the downloader fetched one.
    pub video_path: Option<PathBuf>,
    /// Sanitized title used in artifact names.
    pub title: String,
    pub is_remote: bool,
}

/// Bounded retry for downloads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DownloadSettings::default())
    }
}

impl From<&DownloadSettings> for RetryPolicy {
    fn from(settings: &DownloadSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            delay: Duration::from_millis(settings.retry_delay_ms),
        }
    }
}

/// Materialize `source` as a local media file.
///
/// URLs are downloaded into `dest_dir`; local paths must exist and be
/// readable.
pub fn resolve(
    source: &str,
    dest_dir: &Path,
    downloader: &dyn Downloader,
    retry: &RetryPolicy,
    logger: &JobLogger,
) -> StageResult<ResolvedSource> {
    match classify(source) {
        SourceKind::Url(url) => download_with_retry(url.as_str(), dest_dir, downloader, retry, logger),
        SourceKind::Path(path) => resolve_local(source, &path),
    }
}

fn resolve_local(source: &str, path: &Path) -> StageResult<ResolvedSource> {
    if source.trim().is_empty() {
        return Err(StageError::invalid_source(source, "source reference is empty"));
    }
    if !path.exists() {
        return Err(StageError::invalid_source(
            source,
            "not a URL and no such file exists",
        ));
    }
    if !path.is_file() {
        return Err(StageError::invalid_source(source, "path is not a file"));
    }
    File::open(path)
        .map_err(|e| StageError::invalid_source(source, format!("file is not readable: {}", e)))?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(ResolvedSource {
        media_path: path.to_path_buf(),
        video_path: None,
        title: sanitize_title(&stem),
        is_remote: false,
    })
}

fn download_with_retry(
    url: &str,
    dest_dir: &Path,
    downloader: &dyn Downloader,
    retry: &RetryPolicy,
    logger: &JobLogger,
) -> StageResult<ResolvedSource> {
    let attempts = retry.attempts();
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        logger.info(&format!("Downloading {} (attempt {}/{})", url, attempt, attempts));
        match downloader.download(url, dest_dir, logger) {
            Ok(media) => {
                return Ok(ResolvedSource {
                    media_path: media.audio,
                    video_path: media.video,
                    title: sanitize_title(&media.title),
                    is_remote: true,
                });
            }
            Err(e) => {
                logger.warn(&format!("Download attempt {} failed: {}", attempt, e));
                last_error = e.to_string();
                if attempt < attempts && !retry.delay.is_zero() {
                    thread::sleep(retry.delay);
                }
            }
        }
    }

    Err(StageError::download(url, attempts, last_error))
}

/// Strip characters that are not allowed in file names.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .filter(|c| !c.is_control())
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.').trim();
    if cleaned.is_empty() {
        "media".to_string()
    } else {
        cleaned.to_string()
    }
}
