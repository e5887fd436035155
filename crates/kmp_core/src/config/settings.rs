//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;
use crate::models::DevicePreference;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Output, temp and log directories.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// External tool locations and command templates.
    #[serde(default)]
    pub tools: ToolSettings,

    /// Audio processing parameters.
    #[serde(default)]
    pub processing: ProcessingSettings,

    /// Download retry policy.
    #[serde(default)]
    pub download: DownloadSettings,

    /// Karaoke line layout.
    #[serde(default)]
    pub subtitles: SubtitleSettings,
}

/// Path configuration for output, temp, and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Default output folder for jobs that don't name one.
    #[serde(default = "default_output_folder")]
    pub output_folder: String,

    /// Root folder for job work directories and the persisted queue.
    #[serde(default = "default_temp_root")]
    pub temp_root: String,

    /// Folder for per-job log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,
}

fn default_output_folder() -> String {
    "karaoke_output".to_string()
}

fn default_temp_root() -> String {
    ".temp".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            output_folder: default_output_folder(),
            temp_root: default_temp_root(),
            logs_folder: default_logs_folder(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level written to job logs.
    #[serde(default)]
    pub level: LogLevel,

    /// Use compact log format.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    /// Number of tool output lines to show on failure.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Log every external command line.
    #[serde(default = "default_true")]
    pub show_commands: bool,
}

fn default_true() -> bool {
    true
}

fn default_progress_step() -> u32 {
    20
}

fn default_error_tail() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            compact: true,
            progress_step: default_progress_step(),
            error_tail: default_error_tail(),
            show_commands: true,
        }
    }
}

/// External tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,

    #[serde(default = "default_yt_dlp")]
    pub yt_dlp: String,

    /// Python interpreter used to run `-m demucs`.
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_demucs_model")]
    pub demucs_model: String,

    /// Transcriber command template.
    ///
    /// Placeholders: `{input}`, `{model}`, `{device}`, `{output}`.
    #[serde(default = "default_transcriber_command")]
    pub transcriber_command: String,

    /// Command whose success means an accelerator is present.
    #[serde(default = "default_device_probe_command")]
    pub device_probe_command: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_yt_dlp() -> String {
    "yt-dlp".to_string()
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_demucs_model() -> String {
    "htdemucs".to_string()
}

fn default_transcriber_command() -> String {
    "stable-ts {input} --model {model} --device {device} --output_format json -o {output}"
        .to_string()
}

fn default_device_probe_command() -> String {
    "nvidia-smi -L".to_string()
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            yt_dlp: default_yt_dlp(),
            python: default_python(),
            demucs_model: default_demucs_model(),
            transcriber_command: default_transcriber_command(),
            device_probe_command: default_device_probe_command(),
        }
    }
}

/// Audio processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// Compute backend preference.
    #[serde(default)]
    pub device: DevicePreference,

    /// Separation chunk length in seconds.
    #[serde(default = "default_chunk_duration")]
    pub chunk_duration_secs: u32,

    /// Peak above which the stem mix is scaled down.
    #[serde(default = "default_safe_peak")]
    pub safe_peak: f32,

    /// Integrated loudness target for normalization.
    #[serde(default = "default_loudness_target")]
    pub loudness_target_lufs: f64,

    /// Sample rate of the normalized working audio.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_chunk_duration() -> u32 {
    300
}

fn default_safe_peak() -> f32 {
    1.0
}

fn default_loudness_target() -> f64 {
    -16.0
}

fn default_sample_rate() -> u32 {
    44_100
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            device: DevicePreference::default(),
            chunk_duration_secs: default_chunk_duration(),
            safe_peak: default_safe_peak(),
            loudness_target_lufs: default_loudness_target(),
            sample_rate: default_sample_rate(),
        }
    }
}

/// Download retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Retries after the first failed attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    1000
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

/// Karaoke line layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleSettings {
    /// Seconds a line (and each word's highlight) is shown early.
    #[serde(default = "default_pre_roll")]
    pub pre_roll_secs: f64,

    /// Seconds a line stays up after its last word.
    #[serde(default = "default_trailing_hold")]
    pub trailing_hold_secs: f64,

    #[serde(default = "default_max_words")]
    pub max_words_per_line: usize,

    #[serde(default = "default_max_line_duration")]
    pub max_line_duration_secs: f64,

    /// Break lines at transcriber segment boundaries.
    #[serde(default = "default_true")]
    pub respect_segments: bool,
}

fn default_pre_roll() -> f64 {
    0.5
}

fn default_trailing_hold() -> f64 {
    0.5
}

fn default_max_words() -> usize {
    8
}

fn default_max_line_duration() -> f64 {
    6.0
}

impl Default for SubtitleSettings {
    fn default() -> Self {
        Self {
            pre_roll_secs: default_pre_roll(),
            trailing_hold_secs: default_trailing_hold(),
            max_words_per_line: default_max_words(),
            max_line_duration_secs: default_max_line_duration(),
            respect_segments: true,
        }
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Logging,
    Tools,
    Processing,
    Download,
    Subtitles,
}

impl ConfigSection {
    /// All sections, in file order.
    pub const ALL: [ConfigSection; 6] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Tools,
        ConfigSection::Processing,
        ConfigSection::Download,
        ConfigSection::Subtitles,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Tools => "tools",
            ConfigSection::Processing => "processing",
            ConfigSection::Download => "download",
            ConfigSection::Subtitles => "subtitles",
        }
    }

    /// Comment written above the section in generated files.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Output and working directories",
            ConfigSection::Logging => "Logging configuration",
            ConfigSection::Tools => "External tools",
            ConfigSection::Processing => "Audio processing",
            ConfigSection::Download => "Download retry policy",
            ConfigSection::Subtitles => "Karaoke line layout",
        }
    }
}
