//! Pipeline step implementations.
//!
//! Each step handles one phase of a karaoke job, in this order:
//! Acquire → Separate → Effects → Transcribe → Subtitles → Mux.

mod acquire;
mod effects;
mod mux;
mod separate;
mod subtitles;
mod transcribe;

pub use acquire::AcquireStep;
pub use effects::EffectsStep;
pub use mux::MuxStep;
pub use separate::SeparateStep;
pub use subtitles::SubtitlesStep;
pub use transcribe::TranscribeStep;

use crate::error::{StageError, StageResult};
use crate::orchestrator::types::{AcquireOutput, Context, JobState};

/// Whether this job burns karaoke subtitles.
///
/// Needs both the option and a picture to burn them into.
fn wants_karaoke(ctx: &Context, state: &JobState) -> bool {
    ctx.config.wants_subtitles() && state.has_video()
}

/// Acquire output, or an error naming the step that needs it.
fn acquired<'a>(state: &'a JobState, step: &str) -> StageResult<&'a AcquireOutput> {
    state.acquire.as_ref().ok_or_else(|| {
        StageError::invalid_parameter(format!("{} needs the acquired source audio", step))
    })
}

#[cfg(test)]
mod tests;
