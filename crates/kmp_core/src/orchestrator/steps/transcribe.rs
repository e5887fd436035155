//! Transcribe step - word timestamps from the vocals stem.

use crate::error::StageError;
use crate::models::Stem;
use crate::orchestrator::errors::StepResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, JobState, StepOutcome, TranscribeOutput};
use crate::transcription::transcribe;

use super::wants_karaoke;

pub struct TranscribeStep;

impl TranscribeStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TranscribeStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for TranscribeStep {
    fn name(&self) -> &str {
        "Transcribe"
    }

    fn description(&self) -> &str {
        "Transcribe vocals into timed words"
    }

    fn validate_input(&self, _ctx: &Context, _state: &JobState) -> StepResult<()> {
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StepResult<StepOutcome> {
        if !ctx.config.wants_subtitles() {
            return Ok(StepOutcome::Skipped(
                "karaoke subtitles not requested".to_string(),
            ));
        }
        if !wants_karaoke(ctx, state) {
            return Ok(StepOutcome::Skipped("source has no video stream".to_string()));
        }

        let vocals = state
            .separate
            .as_ref()
            .and_then(|s| s.stems.get(&Stem::Vocals))
            .cloned()
            .ok_or_else(|| StageError::transcription("vocals stem is not available"))?;

        let name = self.name();
        let words = transcribe(
            ctx.toolbox.transcriber.as_ref(),
            &vocals,
            ctx.config.model_size,
            ctx.device,
            &ctx.work_dir,
            state.applied_tempo(),
            &ctx.logger,
            |e| {
                ctx.warn(
                    name,
                    &format!(
                        "Accelerated transcription failed, retrying on general processor: {}",
                        e
                    ),
                )
            },
        )?;

        state.transcribe = Some(TranscribeOutput { words });
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StepResult<()> {
        match &state.transcribe {
            Some(output) if !output.words.is_empty() => Ok(()),
            _ => Err(StageError::transcription("no words recorded")),
        }
    }
}
