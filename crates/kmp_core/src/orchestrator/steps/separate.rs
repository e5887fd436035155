//! Separate step - splits the source into stems and mixes them.

use crate::error::StageError;
use crate::models::ExportMode;
use crate::orchestrator::errors::StepResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, JobState, SeparateOutput, StepOutcome};
use crate::separation::{mix_stems, separate, split_into_chunks};

use super::{acquired, wants_karaoke};

/// Share of the step's progress spent in the separation model.
const MODEL_SHARE: u32 = 90;

/// Runs the separation model chunk by chunk and mixes the stems with the
/// job's gains.
///
/// Skipped when the mix is unity and no vocals are needed for karaoke.
pub struct SeparateStep;

impl SeparateStep {
    pub fn new() -> Self {
        Self
    }

    pub(super) fn needed(ctx: &Context, state: &JobState) -> bool {
        match ctx.config.export_mode {
            ExportMode::StemsOnly => true,
            _ => !ctx.config.stem_mix.is_unity() || wants_karaoke(ctx, state),
        }
    }
}

impl Default for SeparateStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for SeparateStep {
    fn name(&self) -> &str {
        "Separate"
    }

    fn description(&self) -> &str {
        "Separate stems and apply mix gains"
    }

    fn validate_input(&self, _ctx: &Context, state: &JobState) -> StepResult<()> {
        acquired(state, self.name()).map(|_| ())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StepResult<StepOutcome> {
        if !Self::needed(ctx, state) {
            return Ok(StepOutcome::Skipped(
                "unity stem mix and no karaoke vocals needed".to_string(),
            ));
        }

        let name = self.name();
        let acquire = acquired(state, name)?;
        let media = ctx.toolbox.media.as_ref();
        let separation_dir = ctx.work_dir.join("separation");

        let chunks = split_into_chunks(
            media,
            &acquire.audio_path,
            acquire.duration_secs,
            ctx.settings.processing.chunk_duration_secs,
            &separation_dir.join("chunks"),
            &ctx.logger,
        )?;

        let stems = separate(
            ctx.toolbox.separator.as_ref(),
            media,
            &chunks,
            ctx.device,
            &separation_dir,
            &ctx.logger,
            &mut |percent| {
                ctx.logger.progress(percent);
                ctx.report_progress(name, percent * MODEL_SHARE / 100, "Separating stems");
            },
            |e| {
                ctx.warn(
                    name,
                    &format!(
                        "Accelerated separation failed, retrying on general processor: {}",
                        e
                    ),
                )
            },
        )?;

        let mix_path = if ctx.config.export_mode == ExportMode::StemsOnly
            || ctx.config.stem_mix.is_unity()
        {
            None
        } else {
            let mix_path = ctx.work_dir.join("mix.wav");
            let safe_peak = ctx.settings.processing.safe_peak;
            ctx.logger
                .info(&format!("Mixing stems ({})", ctx.config.stem_mix.tag()));
            let summary = mix_stems(&stems, &ctx.config.stem_mix, safe_peak, &mix_path)?;
            if summary.normalized {
                ctx.logger.info(&format!(
                    "Mix peaked at {:.3}, scaled down to {:.3}",
                    summary.peak, safe_peak
                ));
            }
            Some(mix_path)
        };

        state.separate = Some(SeparateOutput {
            stems,
            mix_path,
        });
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StepResult<()> {
        let output = state
            .separate
            .as_ref()
            .ok_or_else(|| StageError::separation("separation output not recorded"))?;
        if let Some(missing) = output.stems.values().find(|p| !p.is_file()) {
            return Err(StageError::separation(format!(
                "stem file missing: {}",
                missing.display()
            )));
        }
        if let Some(mix) = output.mix_path.as_ref().filter(|p| !p.is_file()) {
            return Err(StageError::stem_mix(format!(
                "mix was not written: {}",
                mix.display()
            )));
        }
        Ok(())
    }
}
