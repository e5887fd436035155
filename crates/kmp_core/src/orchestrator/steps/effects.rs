//! Effects step - pitch, tempo and loudness.

use crate::effects::apply_effects;
use crate::error::StageError;
use crate::models::ExportMode;
use crate::orchestrator::errors::StepResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, EffectsOutput, JobState, StepOutcome};

pub struct EffectsStep;

impl EffectsStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EffectsStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for EffectsStep {
    fn name(&self) -> &str {
        "Effects"
    }

    fn description(&self) -> &str {
        "Apply pitch, tempo and loudness"
    }

    fn validate_input(&self, ctx: &Context, state: &JobState) -> StepResult<()> {
        ctx.config.effects.validate()?;
        if state.processed_audio().is_none() {
            return Err(StageError::effect("no audio to process"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StepResult<StepOutcome> {
        if ctx.config.export_mode == ExportMode::StemsOnly {
            return Ok(StepOutcome::Skipped(
                "stems are exported unprocessed".to_string(),
            ));
        }
        if !ctx.config.applies_effects() {
            return Ok(StepOutcome::Skipped("no effects requested".to_string()));
        }

        let input = state
            .processed_audio()
            .cloned()
            .ok_or_else(|| StageError::effect("no audio to process"))?;
        let output = ctx.work_dir.join("processed.wav");

        apply_effects(
            ctx.toolbox.media.as_ref(),
            &input,
            &output,
            &ctx.config.effects,
            ctx.settings.processing.loudness_target_lufs,
            &ctx.logger,
        )?;

        state.effects = Some(EffectsOutput {
            audio_path: output,
            tempo_factor: ctx.config.effects.tempo_factor,
        });
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StepResult<()> {
        match &state.effects {
            Some(output) if output.audio_path.is_file() => Ok(()),
            _ => Err(StageError::effect("processed audio was not written")),
        }
    }
}
