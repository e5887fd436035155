//! Pipeline runner that executes steps in sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::errors::{PipelineError, PipelineResult};
use super::step::PipelineStep;
use super::types::{Context, JobState, StepOutcome};
use crate::jobs::StageRecord;

/// Pipeline that runs a sequence of steps.
///
/// The pipeline executes steps in order, running validation before
/// and after each step. Cancellation is checked at step boundaries.
pub struct Pipeline {
    steps: Vec<Box<dyn PipelineStep>>,
    cancelled: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn add_step<S: PipelineStep + 'static>(&mut self, step: S) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Add a step (builder pattern).
    pub fn with_step<S: PipelineStep + 'static>(mut self, step: S) -> Self {
        self.add_step(step);
        self
    }

    /// Run with an externally owned cancellation flag.
    pub fn with_cancel_handle(mut self, handle: &CancelHandle) -> Self {
        self.cancelled = Arc::clone(&handle.flag);
        self
    }

    /// Get a cancellation handle.
    ///
    /// Call `cancel()` on the returned handle to stop the pipeline
    /// at the next step boundary.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run the pipeline with the given context and state.
    ///
    /// Executes each step in order:
    /// 1. Check for cancellation
    /// 2. Run `validate_input`
    /// 3. Run `execute`
    /// 4. Run `validate_output` (if execute returned Success)
    ///
    /// Every step outcome, including the failing one, is appended to
    /// `state.records`.
    pub fn run(&self, ctx: &Context, state: &mut JobState) -> PipelineResult<PipelineRunResult> {
        let mut result = PipelineRunResult {
            steps_completed: Vec::new(),
            steps_skipped: Vec::new(),
        };

        for step in &self.steps {
            let step_name = step.name();

            if self.is_cancelled() {
                ctx.logger
                    .warn(&format!("Pipeline cancelled before step '{}'", step_name));
                return Err(PipelineError::cancelled(&ctx.job_name));
            }

            ctx.logger.phase(step_name);
            ctx.report_progress(step_name, 0, &format!("Starting {}", step.description()));

            ctx.logger
                .debug(&format!("Validating input for '{}'", step_name));
            if let Err(e) = step.validate_input(ctx, state) {
                ctx.logger.error(&format!("Input validation failed: {}", e));
                return Err(self.fail(ctx, state, step_name, e));
            }

            ctx.logger.debug(&format!("Executing '{}'", step_name));
            let outcome = match step.execute(ctx, state) {
                Ok(outcome) => outcome,
                Err(e) => {
                    ctx.logger.error(&format!("Execution failed: {}", e));
                    ctx.logger.show_tail(step_name);
                    return Err(self.fail(ctx, state, step_name, e));
                }
            };

            match outcome {
                StepOutcome::Success => {
                    ctx.logger
                        .debug(&format!("Validating output for '{}'", step_name));
                    if let Err(e) = step.validate_output(ctx, state) {
                        ctx.logger
                            .error(&format!("Output validation failed: {}", e));
                        return Err(self.fail(ctx, state, step_name, e));
                    }

                    ctx.logger.success(&format!("{} completed", step_name));
                    state.records.push(StageRecord::completed(step_name));
                    result.steps_completed.push(step_name.to_string());
                }
                StepOutcome::Skipped(reason) => {
                    ctx.logger.info(&format!("{} skipped: {}", step_name, reason));
                    state.records.push(StageRecord::skipped(step_name, reason));
                    result.steps_skipped.push(step_name.to_string());
                }
            }

            ctx.report_progress(step_name, 100, &format!("{} finished", step_name));
        }

        ctx.logger.success("Pipeline completed successfully");
        Ok(result)
    }

    fn fail(
        &self,
        ctx: &Context,
        state: &mut JobState,
        step_name: &str,
        error: crate::error::StageError,
    ) -> PipelineError {
        state.records.push(StageRecord::failed(
            step_name,
            error.kind(),
            error.to_string(),
        ));
        PipelineError::step_failed(&ctx.job_name, step_name, error)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Step names in run order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for cancelling a running pipeline.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the pipeline.
    ///
    /// The pipeline will stop at the next step boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag so the handle can be reused for the next job.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRunResult {
    pub steps_completed: Vec<String>,
    pub steps_skipped: Vec<String>,
}
