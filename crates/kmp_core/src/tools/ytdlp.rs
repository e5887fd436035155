//! yt-dlp downloader.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::error::{ToolError, ToolResult};
use super::process;
use super::{DownloadedMedia, Downloader};
use crate::logging::JobLogger;

const AUDIO_FORMAT: &str = "bestaudio/best";
const VIDEO_FORMAT: &str = "bestvideo[ext=mp4]/best[ext=mp4]";

/// Downloader backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    bin: String,
}

impl YtDlp {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.args(["--no-playlist", "--no-progress", "--newline"]);
        cmd
    }

    fn fetch_title(&self, url: &str, logger: &JobLogger) -> ToolResult<String> {
        let mut cmd = self.command();
        cmd.args(["--skip-download", "--print", "title"]).arg(url);
        let output = process::run("yt-dlp", &mut cmd, logger)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or("").trim().to_string())
    }

    fn fetch_stream(
        &self,
        url: &str,
        format: &str,
        dest_dir: &Path,
        stem: &str,
        logger: &JobLogger,
    ) -> ToolResult<PathBuf> {
        let mut cmd = self.command();
        cmd.args(["-f", format, "-o"])
            .arg(dest_dir.join(format!("{}.%(ext)s", stem)))
            .arg(url);
        process::run("yt-dlp", &mut cmd, logger)?;

        find_download(dest_dir, stem)?
            .ok_or_else(|| ToolError::output("yt-dlp", format!("no {} file was written", stem)))
    }
}

impl Downloader for YtDlp {
    fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        logger: &JobLogger,
    ) -> ToolResult<DownloadedMedia> {
        let title = self.fetch_title(url, logger)?;
        let audio = self.fetch_stream(url, AUDIO_FORMAT, dest_dir, "audio", logger)?;

        // Audio-only sources have no mp4 video stream.
        let video = match self.fetch_stream(url, VIDEO_FORMAT, dest_dir, "video", logger) {
            Ok(path) => Some(path),
            Err(e) => {
                logger.info(&format!("No video stream downloaded: {}", e));
                logger.clear_tail();
                None
            }
        };

        Ok(DownloadedMedia {
            audio,
            video,
            title,
        })
    }
}

/// Find `<stem>.<ext>` written by yt-dlp, ignoring partial downloads.
fn find_download(dir: &Path, stem: &str) -> ToolResult<Option<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| ToolError::io("listing download directory", e))?;
    let prefix = format!("{}.", stem);

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            name.starts_with(&prefix) && !name.ends_with(".part") && !name.ends_with(".ytdl")
        })
        .collect();
    found.sort();
    Ok(found.into_iter().next())
}
