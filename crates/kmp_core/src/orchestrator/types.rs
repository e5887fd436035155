//! Core types for the orchestrator pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::config::Settings;
use crate::device::DeviceContext;
use crate::jobs::StageRecord;
use crate::logging::JobLogger;
use crate::models::{JobConfig, WordToken};
use crate::mux::ArtifactKind;
use crate::separation::StemPaths;
use crate::tools::Toolbox;

/// Progress callback type for reporting pipeline progress.
///
/// Arguments: (step_name, step_percent, message)
pub type ProgressCallback = Box<dyn Fn(&str, u32, &str) + Send + Sync>;

/// Warning callback for non-fatal conditions.
///
/// Arguments: (step_name, message)
pub type WarningCallback = Box<dyn Fn(&str, &str) + Send + Sync>;

/// Read-only context passed to pipeline steps.
///
/// Contains job configuration and shared resources that steps can read
/// but not modify. Mutable state goes in `JobState`.
pub struct Context {
    /// Validated job configuration.
    pub config: JobConfig,
    /// Application settings.
    pub settings: Settings,
    /// Job identifier.
    pub job_name: String,
    /// Job-scoped working directory; removed when the job ends.
    pub work_dir: PathBuf,
    /// Where the final artifact goes.
    pub output_dir: PathBuf,
    /// Per-job logger.
    pub logger: Arc<JobLogger>,
    /// External collaborators.
    pub toolbox: Toolbox,
    /// Compute backend selected for the process.
    pub device: DeviceContext,
    progress_callback: Option<ProgressCallback>,
    warning_callback: Option<WarningCallback>,
}

impl Context {
    pub fn new(
        config: JobConfig,
        settings: Settings,
        job_name: impl Into<String>,
        work_dir: PathBuf,
        logger: Arc<JobLogger>,
        toolbox: Toolbox,
        device: DeviceContext,
    ) -> Self {
        let output_dir = config.output_dir.clone();
        Self {
            config,
            settings,
            job_name: job_name.into(),
            work_dir,
            output_dir,
            logger,
            toolbox,
            device,
            progress_callback: None,
            warning_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn with_warning_callback(mut self, callback: WarningCallback) -> Self {
        self.warning_callback = Some(callback);
        self
    }

    /// Report progress to callback (if set).
    pub fn report_progress(&self, step_name: &str, percent: u32, message: &str) {
        if let Some(ref callback) = self.progress_callback {
            callback(step_name, percent.min(100), message);
        }
    }

    /// Log a warning and forward it to the warning callback.
    pub fn warn(&self, step_name: &str, message: &str) {
        self.logger.warn(message);
        if let Some(ref callback) = self.warning_callback {
            callback(step_name, message);
        }
    }
}

/// Mutable job state that accumulates results from pipeline steps.
///
/// Each step's output is stored in its own section and never overwritten.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobState {
    pub job_id: String,
    pub started_at: Option<String>,
    /// Outcome of every step that ran, in order.
    pub records: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquire: Option<AcquireOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub separate: Option<SeparateOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effects: Option<EffectsOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcribe: Option<TranscribeOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<SubtitlesOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mux: Option<MuxOutput>,
}

impl JobState {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            started_at: Some(chrono::Local::now().to_rfc3339()),
            ..Default::default()
        }
    }

    /// Latest version of the job audio: effects output, else stem mix,
    /// else the extracted source audio.
    pub fn processed_audio(&self) -> Option<&PathBuf> {
        self.effects
            .as_ref()
            .map(|e| &e.audio_path)
            .or_else(|| self.separate.as_ref().and_then(|s| s.mix_path.as_ref()))
            .or_else(|| self.acquire.as_ref().map(|a| &a.audio_path))
    }

    /// Tempo applied to the processed audio.
    pub fn applied_tempo(&self) -> f64 {
        self.effects.as_ref().map_or(1.0, |e| e.tempo_factor)
    }

    pub fn has_video(&self) -> bool {
        self.acquire
            .as_ref()
            .is_some_and(|a| a.video_path.is_some())
    }

    pub fn artifact(&self) -> Option<&PathBuf> {
        self.mux.as_ref().map(|m| &m.artifact)
    }
}

/// Output from the Acquire step.
#[derive(Debug, Clone, Serialize)]
pub struct AcquireOutput {
    /// Sanitized title for artifact names.
    pub title: String,
    /// Downloaded or local source file.
    pub media_path: PathBuf,
    /// Video stream, when the source has one.
    pub video_path: Option<PathBuf>,
    /// Source audio decoded to WAV in the work directory.
    pub audio_path: PathBuf,
    pub duration_secs: f64,
}

/// Output from the Separate step.
#[derive(Debug, Clone, Serialize)]
pub struct SeparateOutput {
    pub stems: StemPaths,
    /// Gain-weighted stem mix; absent for stems exports.
    pub mix_path: Option<PathBuf>,
}

/// Output from the Effects step.
#[derive(Debug, Clone, Serialize)]
pub struct EffectsOutput {
    pub audio_path: PathBuf,
    pub tempo_factor: f64,
}

/// Output from the Transcribe step.
#[derive(Debug, Clone, Serialize)]
pub struct TranscribeOutput {
    /// Word tokens on the output timeline.
    pub words: Vec<WordToken>,
}

/// Output from the Subtitles step.
#[derive(Debug, Clone, Serialize)]
pub struct SubtitlesOutput {
    pub ass_path: PathBuf,
    pub cue_count: usize,
}

/// Output from the Mux step.
#[derive(Debug, Clone, Serialize)]
pub struct MuxOutput {
    /// Final file (or stems directory) in the output directory.
    pub artifact: PathBuf,
    #[serde(skip)]
    pub kind: ArtifactKind,
}

/// Result of executing a pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    /// Step did not apply to this job (not an error).
    Skipped(String),
}
