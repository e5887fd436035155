//! Deterministic artifact names.
//!
//! Names look like `<title>_<tag>_<hash>.<ext>`. The tag is a readable
//! summary of the options; the hash is the first 8 hex digits of an md5
//! over the source reference and the canonical option set, so the same
//! job always lands on the same file and different jobs never collide.

use serde::Serialize;

use crate::models::{
    AudioFormat, EffectChain, ExportMode, JobConfig, ModelSize, Stem, StemMix, SubtitleStyle,
};

/// Options that affect the artifact's content.
#[derive(Serialize)]
struct CanonicalOptions<'a> {
    source: &'a str,
    export_mode: ExportMode,
    audio_format: AudioFormat,
    stem_mix: &'a StemMix,
    effects: &'a EffectChain,
    model_size: ModelSize,
    subtitles: bool,
    style: Option<&'a SubtitleStyle>,
    stems_to_export: &'a [Stem],
}

/// First 8 hex digits of the md5 over source and options.
pub fn options_hash(config: &JobConfig) -> String {
    let wants_subtitles = config.wants_subtitles();
    let canonical = CanonicalOptions {
        source: &config.source,
        export_mode: config.export_mode,
        audio_format: config.audio_format,
        stem_mix: &config.stem_mix,
        effects: &config.effects,
        model_size: config.model_size,
        subtitles: wants_subtitles,
        style: wants_subtitles.then_some(&config.style),
        stems_to_export: &config.stems_to_export,
    };
    // Plain data; serialization only fails on non-string map keys.
    let payload = serde_json::to_string(&canonical).unwrap_or_else(|_| config.source.clone());
    let digest = md5::compute(payload.as_bytes());
    format!("{:x}", digest)[..8].to_string()
}

/// Shape of the final artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// mp4 with the processed audio, burned subtitles when enabled.
    Video,
    /// Encoded audio file.
    Audio(AudioFormat),
    /// Directory of exported stems.
    Stems(AudioFormat),
}

impl ArtifactKind {
    /// Artifact shape for a job; video exports of audio-only sources
    /// become audio files.
    pub fn for_job(config: &JobConfig, has_video: bool) -> Self {
        match config.export_mode {
            ExportMode::Video if has_video => ArtifactKind::Video,
            ExportMode::Video | ExportMode::AudioOnly => ArtifactKind::Audio(config.audio_format),
            ExportMode::StemsOnly => ArtifactKind::Stems(config.audio_format),
        }
    }

    /// File extension; `None` for a stems directory.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ArtifactKind::Video => Some("mp4"),
            ArtifactKind::Audio(format) => Some(format.extension()),
            ArtifactKind::Stems(_) => None,
        }
    }
}

/// Readable summary of mode, mix, effects and karaoke.
pub fn artifact_tag(config: &JobConfig, kind: ArtifactKind) -> String {
    let mut parts = vec![match kind {
        ArtifactKind::Video => "video".to_string(),
        ArtifactKind::Audio(_) => "audio".to_string(),
        ArtifactKind::Stems(_) => "stems".to_string(),
    }];
    if !matches!(kind, ArtifactKind::Stems(_)) {
        if !config.stem_mix.is_unity() {
            parts.push(config.stem_mix.tag());
        }
        if let Some(fx) = config.effects.tag() {
            parts.push(fx);
        }
    }
    if kind == ArtifactKind::Video && config.wants_subtitles() {
        parts.push("karaoke".to_string());
    }
    parts.join("_")
}

/// Artifact file or directory name for a job.
pub fn artifact_name(title: &str, config: &JobConfig, kind: ArtifactKind) -> String {
    let hash = options_hash(config);
    match kind.extension() {
        Some(ext) => format!("{}_{}_{}.{}", title, artifact_tag(config, kind), hash, ext),
        None => format!("{}_stems_{}", title, hash),
    }
}

/// File name of one exported stem.
pub fn stem_file_name(title: &str, stem: Stem, format: AudioFormat) -> String {
    format!("{}_{}.{}", title, stem.name(), format.extension())
}
