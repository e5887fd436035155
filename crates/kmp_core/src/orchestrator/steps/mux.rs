//! Mux step - assembles the final artifact in the output directory.

use std::fs;

use crate::error::StageError;
use crate::mux::{artifact_name, export_stems, mux, ArtifactKind, MuxRequest};
use crate::orchestrator::errors::StepResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, JobState, MuxOutput, StepOutcome};

use super::acquired;

/// Builds the artifact in the work directory and moves it into the output
/// directory under its deterministic name.
pub struct MuxStep;

impl MuxStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MuxStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for MuxStep {
    fn name(&self) -> &str {
        "Mux"
    }

    fn description(&self) -> &str {
        "Assemble final artifact"
    }

    fn validate_input(&self, ctx: &Context, state: &JobState) -> StepResult<()> {
        acquired(state, self.name())?;
        fs::create_dir_all(&ctx.output_dir).map_err(|e| {
            StageError::mux(format!(
                "cannot create output directory {}: {}",
                ctx.output_dir.display(),
                e
            ))
        })
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StepResult<StepOutcome> {
        let acquire = acquired(state, self.name())?;
        let media = ctx.toolbox.media.as_ref();
        let kind = ArtifactKind::for_job(&ctx.config, state.has_video());
        let file_name = artifact_name(&acquire.title, &ctx.config, kind);

        let artifact = match kind {
            ArtifactKind::Stems(format) => {
                let stems = state
                    .separate
                    .as_ref()
                    .map(|s| &s.stems)
                    .ok_or_else(|| StageError::mux("no separated stems to export"))?;
                export_stems(
                    media,
                    stems,
                    &ctx.config.stems_to_export,
                    format,
                    &acquire.title,
                    &ctx.work_dir,
                    &ctx.output_dir,
                    &file_name,
                    &ctx.logger,
                )?
            }
            ArtifactKind::Video | ArtifactKind::Audio(_) => {
                let audio = state
                    .processed_audio()
                    .ok_or_else(|| StageError::mux("no processed audio"))?;
                let video = match kind {
                    ArtifactKind::Video => acquire.video_path.as_deref(),
                    _ => None,
                };
                let request = MuxRequest {
                    video,
                    audio,
                    subtitles: state.subtitles.as_ref().map(|s| s.ass_path.as_path()),
                    tempo: state.applied_tempo(),
                    audio_format: ctx.config.audio_format,
                    work_dir: &ctx.work_dir,
                    output_dir: &ctx.output_dir,
                    file_name: &file_name,
                };
                mux(media, &request, &ctx.logger)?
            }
        };

        ctx.logger
            .info(&format!("Output written to: {}", artifact.display()));
        state.mux = Some(MuxOutput { artifact, kind });
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StepResult<()> {
        let output = state
            .mux
            .as_ref()
            .ok_or_else(|| StageError::mux("mux output not recorded"))?;
        if !output.artifact.exists() {
            return Err(StageError::mux(format!(
                "artifact missing after mux: {}",
                output.artifact.display()
            )));
        }
        Ok(())
    }
}
