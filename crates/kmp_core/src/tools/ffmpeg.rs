//! ffmpeg / ffprobe media toolkit.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

use super::error::{ToolError, ToolResult};
use super::process;
use super::{MediaInfo, MediaToolkit, VideoMux};
use crate::logging::JobLogger;

/// Media toolkit backed by the ffmpeg command-line tools.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: String,
    ffprobe: String,
}

impl Ffmpeg {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Base ffmpeg command: overwrite, errors only, no stdin.
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-y", "-v", "error"]);
        cmd
    }

    fn video_mux_command(&self, request: &VideoMux<'_>) -> Command {
        let mut cmd = self.command();
        cmd.arg("-i")
            .arg(request.video)
            .arg("-i")
            .arg(request.audio)
            .args(["-map", "0:v:0", "-map", "1:a:0"]);

        let mut video_filters = Vec::new();
        if request.tempo != 1.0 {
            video_filters.push(format!("setpts=PTS/{}", request.tempo));
        }
        if let Some(subtitles) = request.subtitles {
            video_filters.push(format!("ass={}", escape_filter_path(subtitles)));
        }

        if video_filters.is_empty() {
            cmd.args(["-c:v", "copy"]);
        } else {
            cmd.arg("-vf")
                .arg(video_filters.join(","))
                .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"]);
        }

        cmd.args(["-c:a", "aac", "-b:a", "320k", "-shortest", "-f", "mp4"])
            .arg(request.output);
        cmd
    }
}

impl MediaToolkit for Ffmpeg {
    fn probe(&self, media: &Path, logger: &JobLogger) -> ToolResult<MediaInfo> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration:stream=codec_type:stream_disposition=attached_pic",
            "-of",
            "json",
        ])
        .arg(media);

        let output = process::run("ffprobe", &mut cmd, logger)?;
        let json: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| ToolError::output("ffprobe", e.to_string()))?;
        parse_probe_json(&json).map_err(|message| ToolError::output("ffprobe", message))
    }

    fn extract_audio(
        &self,
        input: &Path,
        output: &Path,
        sample_rate: u32,
        logger: &JobLogger,
    ) -> ToolResult<()> {
        let mut cmd = self.command();
        cmd.arg("-i")
            .arg(input)
            .args(["-vn", "-ac", "2", "-ar"])
            .arg(sample_rate.to_string())
            .args(["-c:a", "pcm_s16le"])
            .arg(output);
        process::run("ffmpeg", &mut cmd, logger)?;
        Ok(())
    }

    fn split_segment(
        &self,
        input: &Path,
        output: &Path,
        start_secs: f64,
        duration_secs: f64,
        logger: &JobLogger,
    ) -> ToolResult<()> {
        let mut cmd = self.command();
        cmd.arg("-ss")
            .arg(format!("{:.3}", start_secs))
            .arg("-t")
            .arg(format!("{:.3}", duration_secs))
            .arg("-i")
            .arg(input)
            .args(["-c:a", "pcm_s16le"])
            .arg(output);
        process::run("ffmpeg", &mut cmd, logger)?;
        Ok(())
    }

    fn concat(&self, inputs: &[PathBuf], output: &Path, logger: &JobLogger) -> ToolResult<()> {
        if inputs.len() == 1 {
            fs::copy(&inputs[0], output)
                .map_err(|e| ToolError::io("copying single segment", e))?;
            return Ok(());
        }

        let list_path = output.with_extension("concat.txt");
        let list: String = inputs
            .iter()
            .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
            .collect();
        fs::write(&list_path, list).map_err(|e| ToolError::io("writing concat list", e))?;

        let mut cmd = self.command();
        cmd.args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-c", "copy"])
            .arg(output);
        let result = process::run("ffmpeg", &mut cmd, logger);
        let _ = fs::remove_file(&list_path);
        result.map(|_| ())
    }

    fn apply_audio_filters(
        &self,
        input: &Path,
        output: &Path,
        filters: &[String],
        logger: &JobLogger,
    ) -> ToolResult<()> {
        let mut cmd = self.command();
        cmd.arg("-i").arg(input).arg("-vn");
        if !filters.is_empty() {
            cmd.arg("-af").arg(filters.join(","));
        }
        cmd.args(["-c:a", "pcm_f32le", "-f", "wav"]).arg(output);
        process::run("ffmpeg", &mut cmd, logger)?;
        Ok(())
    }

    fn encode_audio(
        &self,
        input: &Path,
        output: &Path,
        codec: &str,
        logger: &JobLogger,
    ) -> ToolResult<()> {
        let mut cmd = self.command();
        cmd.arg("-i").arg(input).arg("-vn").args(["-c:a", codec]);
        if codec == "libmp3lame" {
            cmd.args(["-b:a", "320k"]);
        }
        cmd.arg(output);
        process::run("ffmpeg", &mut cmd, logger)?;
        Ok(())
    }

    fn mux_video(&self, request: &VideoMux<'_>, logger: &JobLogger) -> ToolResult<()> {
        let mut cmd = self.video_mux_command(request);
        process::run("ffmpeg", &mut cmd, logger)?;
        Ok(())
    }
}

/// Read duration and video presence from `ffprobe -of json` output.
fn parse_probe_json(json: &Value) -> Result<MediaInfo, String> {
    let duration_secs = json
        .get("format")
        .and_then(|f| f.get("duration"))
        .and_then(|d| match d {
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        })
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| "no usable format duration".to_string())?;

    let has_video = json
        .get("streams")
        .and_then(|s| s.as_array())
        .map(|streams| {
            streams.iter().any(|stream| {
                let is_video = stream.get("codec_type").and_then(|t| t.as_str()) == Some("video");
                let is_cover_art = stream
                    .get("disposition")
                    .and_then(|d| d.get("attached_pic"))
                    .and_then(|a| a.as_i64())
                    == Some(1);
                is_video && !is_cover_art
            })
        })
        .unwrap_or(false);

    Ok(MediaInfo {
        duration_secs,
        has_video,
    })
}

/// Escape a path for use as a filter option value.
fn escape_filter_path(path: &Path) -> String {
    let mut escaped = String::new();
    for c in path.to_string_lossy().chars() {
        if matches!(c, '\\' | '\'' | ':' | ',' | '[' | ']' | ';') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
