//! External collaborators.
//!
//! Each collaborator is a trait so stages can run against fakes in tests.
//! The production implementations drive command-line tools:
//!
//! | Trait          | Tool                         |
//! |----------------|------------------------------|
//! | `Downloader`   | yt-dlp                       |
//! | `Separator`    | demucs (`python -m demucs`)  |
//! | `Transcriber`  | configurable command (stable-ts) |
//! | `MediaToolkit` | ffmpeg / ffprobe             |

mod demucs;
mod error;
mod ffmpeg;
pub mod process;
mod transcriber;
mod ytdlp;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use demucs::{DemucsProgress, DemucsSeparator};
pub use error::{ToolError, ToolResult};
pub use ffmpeg::Ffmpeg;
pub use transcriber::{parse_transcript_json, CommandTranscriber, RawWord};
pub use ytdlp::YtDlp;

use crate::config::ToolSettings;
use crate::logging::JobLogger;
use crate::models::{Backend, ModelSize, Stem};

/// Files fetched for a remote source.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedMedia {
    /// Best-quality audio stream.
    pub audio: PathBuf,
    /// Video stream, when the source has one.
    pub video: Option<PathBuf>,
    /// Title reported by the source.
    pub title: String,
}

/// Fetches remote media into a local directory.
pub trait Downloader: Send + Sync {
    fn download(&self, url: &str, dest_dir: &Path, logger: &JobLogger)
        -> ToolResult<DownloadedMedia>;
}

/// Stem files produced for one input chunk.
pub type ChunkStems = BTreeMap<Stem, PathBuf>;

/// Splits audio into stems.
pub trait Separator: Send + Sync {
    /// Separate each chunk; the result has one entry per chunk, in order.
    ///
    /// `progress` receives stage-local percent (0..=100).
    fn separate(
        &self,
        chunks: &[PathBuf],
        out_dir: &Path,
        backend: Backend,
        logger: &JobLogger,
        progress: &mut dyn FnMut(u32),
    ) -> ToolResult<Vec<ChunkStems>>;
}

/// Produces word-level timestamps for an audio file.
pub trait Transcriber: Send + Sync {
    fn transcribe(
        &self,
        audio: &Path,
        model: ModelSize,
        backend: Backend,
        work_dir: &Path,
        logger: &JobLogger,
    ) -> ToolResult<Vec<RawWord>>;
}

/// Probe results for a media file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub has_video: bool,
}

/// Inputs of a video mux.
#[derive(Debug, Clone)]
pub struct VideoMux<'a> {
    pub video: &'a Path,
    pub audio: &'a Path,
    /// ASS file burned into the picture.
    pub subtitles: Option<&'a Path>,
    /// Tempo factor applied to the audio; the picture is retimed to match.
    pub tempo: f64,
    pub output: &'a Path,
}

/// Audio/video processing primitives.
pub trait MediaToolkit: Send + Sync {
    fn probe(&self, media: &Path, logger: &JobLogger) -> ToolResult<MediaInfo>;

    /// Decode the first audio stream to PCM s16le stereo WAV.
    fn extract_audio(
        &self,
        input: &Path,
        output: &Path,
        sample_rate: u32,
        logger: &JobLogger,
    ) -> ToolResult<()>;

    fn split_segment(
        &self,
        input: &Path,
        output: &Path,
        start_secs: f64,
        duration_secs: f64,
        logger: &JobLogger,
    ) -> ToolResult<()>;

    fn concat(&self, inputs: &[PathBuf], output: &Path, logger: &JobLogger) -> ToolResult<()>;

    /// Run one audio filter chain, writing `output` (WAV).
    fn apply_audio_filters(
        &self,
        input: &Path,
        output: &Path,
        filters: &[String],
        logger: &JobLogger,
    ) -> ToolResult<()>;

    fn encode_audio(
        &self,
        input: &Path,
        output: &Path,
        codec: &str,
        logger: &JobLogger,
    ) -> ToolResult<()>;

    fn mux_video(&self, request: &VideoMux<'_>, logger: &JobLogger) -> ToolResult<()>;
}

/// The set of collaborators a pipeline runs with.
#[derive(Clone)]
pub struct Toolbox {
    pub downloader: Arc<dyn Downloader>,
    pub separator: Arc<dyn Separator>,
    pub transcriber: Arc<dyn Transcriber>,
    pub media: Arc<dyn MediaToolkit>,
}

impl Toolbox {
    /// Production collaborators configured from `[tools]`.
    pub fn from_settings(tools: &ToolSettings) -> Self {
        Self {
            downloader: Arc::new(YtDlp::new(&tools.yt_dlp)),
            separator: Arc::new(DemucsSeparator::new(&tools.python, &tools.demucs_model)),
            transcriber: Arc::new(CommandTranscriber::new(&tools.transcriber_command)),
            media: Arc::new(Ffmpeg::new(&tools.ffmpeg, &tools.ffprobe)),
        }
    }
}
