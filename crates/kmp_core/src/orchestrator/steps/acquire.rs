//! Acquire step - resolves the source and decodes its audio.

use std::fs;

use crate::error::StageError;
use crate::orchestrator::errors::StepResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{AcquireOutput, Context, JobState, StepOutcome};
use crate::source::{self, RetryPolicy};

/// Downloads or checks the source, probes it, and decodes the audio to a
/// work-directory WAV at the configured sample rate.
pub struct AcquireStep;

impl AcquireStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AcquireStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for AcquireStep {
    fn name(&self) -> &str {
        "Acquire"
    }

    fn description(&self) -> &str {
        "Resolve source and decode audio"
    }

    fn validate_input(&self, ctx: &Context, _state: &JobState) -> StepResult<()> {
        // Every job parameter is checked before the first external tool runs
        ctx.config.validate()
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StepResult<StepOutcome> {
        let source_ref = &ctx.config.source;
        let download_dir = ctx.work_dir.join("download");
        fs::create_dir_all(&download_dir)
            .map_err(|e| StageError::io("creating download directory", e))?;

        let retry = RetryPolicy::from(&ctx.settings.download);
        let resolved = source::resolve(
            source_ref,
            &download_dir,
            ctx.toolbox.downloader.as_ref(),
            &retry,
            &ctx.logger,
        )?;
        ctx.report_progress(self.name(), 40, "Source ready");

        let media = ctx.toolbox.media.as_ref();
        let info = media
            .probe(&resolved.media_path, &ctx.logger)
            .map_err(|e| {
                StageError::invalid_source(source_ref, format!("not a readable media file: {}", e))
            })?;

        let video_path = match resolved.video_path {
            Some(video) => Some(video),
            None if info.has_video => Some(resolved.media_path.clone()),
            None => None,
        };

        let audio_path = ctx.work_dir.join("full_audio.wav");
        media
            .extract_audio(
                &resolved.media_path,
                &audio_path,
                ctx.settings.processing.sample_rate,
                &ctx.logger,
            )
            .map_err(|e| {
                StageError::invalid_source(source_ref, format!("no decodable audio: {}", e))
            })?;

        ctx.logger.info(&format!(
            "Source '{}' ({}): {:.1}s, {}",
            resolved.title,
            if resolved.is_remote {
                "downloaded"
            } else {
                "local file"
            },
            info.duration_secs,
            if video_path.is_some() {
                "with video"
            } else {
                "audio only"
            }
        ));

        state.acquire = Some(AcquireOutput {
            title: resolved.title,
            media_path: resolved.media_path,
            video_path,
            audio_path,
            duration_secs: info.duration_secs,
        });
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, ctx: &Context, state: &JobState) -> StepResult<()> {
        match &state.acquire {
            Some(output) if output.audio_path.is_file() => Ok(()),
            _ => Err(StageError::invalid_source(
                &ctx.config.source,
                "decoded audio was not written",
            )),
        }
    }
}
