//! Job submission records.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::effects::EffectChain;
use super::enums::{AudioFormat, ExportMode, ModelSize, Stem};
use super::stems::StemMix;
use super::style::SubtitleStyle;
use crate::error::{StageError, StageResult};

/// A job as submitted (job file, UI form).
///
/// Loosely typed: stem names are plain strings. Convert with
/// [`JobRequest::into_config`], which rejects bad values before anything runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// URL or local file path.
    pub source: String,

    /// Output directory; falls back to the configured default.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub stem_gains: HashMap<String, f32>,

    /// `pitch_semitones`, `tempo_factor` and `normalize` at the top level.
    #[serde(flatten)]
    pub effects: EffectChain,

    #[serde(default)]
    pub model_size: ModelSize,

    #[serde(default)]
    pub style: SubtitleStyle,

    /// Burn karaoke subtitles into video exports.
    #[serde(default = "default_true")]
    pub subtitles: bool,

    #[serde(default)]
    pub export_mode: ExportMode,

    #[serde(default)]
    pub audio_format: AudioFormat,

    /// Stems written by `stems_only` exports (all when empty).
    #[serde(default)]
    pub stems_to_export: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl JobRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            output_dir: None,
            stem_gains: HashMap::new(),
            effects: EffectChain::default(),
            model_size: ModelSize::default(),
            style: SubtitleStyle::default(),
            subtitles: true,
            export_mode: ExportMode::default(),
            audio_format: AudioFormat::default(),
            stems_to_export: Vec::new(),
        }
    }

    /// Validate the request and produce a job configuration.
    pub fn into_config(self, default_output_dir: &Path) -> StageResult<JobConfig> {
        let source = self.source.trim().to_string();
        if source.is_empty() {
            return Err(StageError::invalid_source("", "source reference is empty"));
        }

        let stem_mix = StemMix::from_names(&self.stem_gains)?;

        let mut stems_to_export = Vec::new();
        for name in &self.stems_to_export {
            let stem: Stem = name.parse().map_err(|_| {
                StageError::stem_mix(format!("unrecognized stem '{}' in stems_to_export", name))
            })?;
            if !stems_to_export.contains(&stem) {
                stems_to_export.push(stem);
            }
        }
        if stems_to_export.is_empty() {
            stems_to_export = Stem::ALL.to_vec();
        }

        let output_dir = self
            .output_dir
            .unwrap_or_else(|| default_output_dir.to_path_buf());

        let config = JobConfig {
            source,
            output_dir,
            stem_mix,
            effects: self.effects,
            model_size: self.model_size,
            style: self.style,
            subtitles_enabled: self.subtitles,
            export_mode: self.export_mode,
            audio_format: self.audio_format,
            stems_to_export,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Validated configuration of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub source: String,
    pub output_dir: PathBuf,
    pub stem_mix: StemMix,
    pub effects: EffectChain,
    pub model_size: ModelSize,
    pub style: SubtitleStyle,
    pub subtitles_enabled: bool,
    pub export_mode: ExportMode,
    pub audio_format: AudioFormat,
    pub stems_to_export: Vec<Stem>,
}

impl JobConfig {
    /// Check every parameter that can be checked without external tools.
    pub fn validate(&self) -> StageResult<()> {
        self.effects.validate()?;
        if self.wants_subtitles() {
            self.style.resolve()?;
        }
        check_output_dir(&self.output_dir)
    }

    /// Whether karaoke subtitles are produced.
    pub fn wants_subtitles(&self) -> bool {
        self.subtitles_enabled && self.export_mode == ExportMode::Video
    }

    /// Whether the effect chain applies to this job.
    pub fn applies_effects(&self) -> bool {
        self.export_mode != ExportMode::StemsOnly && !self.effects.is_identity()
    }
}

/// The output directory must be a writable directory, or not exist yet.
///
/// Writability is checked by creating (and dropping) a temporary file.
fn check_output_dir(dir: &Path) -> StageResult<()> {
    match fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => Err(StageError::invalid_parameter(format!(
            "output path '{}' is not a directory",
            dir.display()
        ))),
        Ok(_) => tempfile::NamedTempFile::new_in(dir).map(drop).map_err(|e| {
            StageError::invalid_parameter(format!(
                "output directory '{}' is not writable: {}",
                dir.display(),
                e
            ))
        }),
        Err(_) => Ok(()),
    }
}
