//! Subtitles step - karaoke cue timeline written as ASS.

use crate::error::StageError;
use crate::orchestrator::errors::StepResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, JobState, StepOutcome, SubtitlesOutput};
use crate::subtitles::{synthesize, write_ass_file, SynthesisOptions};

pub struct SubtitlesStep;

impl SubtitlesStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SubtitlesStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for SubtitlesStep {
    fn name(&self) -> &str {
        "Subtitles"
    }

    fn description(&self) -> &str {
        "Synthesize karaoke subtitles"
    }

    fn validate_input(&self, _ctx: &Context, _state: &JobState) -> StepResult<()> {
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StepResult<StepOutcome> {
        let Some(transcript) = state.transcribe.as_ref() else {
            return Ok(StepOutcome::Skipped("no transcript".to_string()));
        };

        let options = SynthesisOptions::from(&ctx.settings.subtitles);
        let cues = synthesize(&transcript.words, &ctx.config.style, &options)?;
        ctx.logger.info(&format!(
            "{} word(s) grouped into {} line(s)",
            transcript.words.len(),
            cues.len()
        ));

        let title = state.acquire.as_ref().map(|a| a.title.as_str());
        let ass_path = ctx.work_dir.join("karaoke.ass");
        write_ass_file(&ass_path, &cues, &ctx.config.style, title)?;

        state.subtitles = Some(SubtitlesOutput {
            ass_path,
            cue_count: cues.len(),
        });
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StepResult<()> {
        match &state.subtitles {
            Some(output) if output.cue_count > 0 && output.ass_path.is_file() => Ok(()),
            _ => Err(StageError::synthesis("subtitle file was not written")),
        }
    }
}
