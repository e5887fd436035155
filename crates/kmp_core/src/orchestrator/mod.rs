//! Pipeline orchestrator for coordinating job execution.
//!
//! Each job runs through a fixed sequence of steps that validate, execute,
//! and record their results. The [`QueueScheduler`] runs queued jobs one at
//! a time on a worker thread.
//!
//! # Architecture
//!
//! ```text
//! QueueScheduler (worker thread)
//!     └── Pipeline (per job)
//!         ├── Step: Acquire
//!         ├── Step: Separate
//!         ├── Step: Effects
//!         ├── Step: Transcribe
//!         ├── Step: Subtitles
//!         └── Step: Mux
//! ```
//!
//! # Example
//!
//! ```ignore
//! use kmp_core::orchestrator::{create_standard_pipeline, Context, JobState};
//!
//! let ctx = Context::new(config, settings, "job-0001", work_dir, logger, toolbox, device);
//! let mut state = JobState::new("job-0001");
//!
//! let result = create_standard_pipeline().run(&ctx, &mut state)?;
//! println!("Completed: {:?}", result.steps_completed);
//! ```

mod errors;
mod pipeline;
mod scheduler;
mod step;
pub mod steps;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{PipelineError, PipelineResult, StepResult};
pub use pipeline::{CancelHandle, Pipeline, PipelineRunResult};
pub use scheduler::{PipelineFactory, QueueScheduler, SchedulerHandle};
pub use step::PipelineStep;
pub use steps::{AcquireStep, EffectsStep, MuxStep, SeparateStep, SubtitlesStep, TranscribeStep};
pub use types::{
    AcquireOutput, Context, EffectsOutput, JobState, MuxOutput, ProgressCallback, SeparateOutput,
    StepOutcome, SubtitlesOutput, TranscribeOutput, WarningCallback,
};

/// Create a standard pipeline with all steps in the correct order.
///
/// 1. Acquire - download or open the source, decode its audio
/// 2. Separate - split into stems and apply the stem mix
/// 3. Effects - pitch, tempo and loudness
/// 4. Transcribe - word timestamps from the vocals
/// 5. Subtitles - karaoke cue timeline as ASS
/// 6. Mux - assemble the artifact in the output directory
pub fn create_standard_pipeline() -> Pipeline {
    Pipeline::new()
        .with_step(AcquireStep::new())
        .with_step(SeparateStep::new())
        .with_step(EffectsStep::new())
        .with_step(TranscribeStep::new())
        .with_step(SubtitlesStep::new())
        .with_step(MuxStep::new())
}
