//! Pipeline step trait definition.

use super::errors::StepResult;
use super::types::{Context, JobState, StepOutcome};

/// Trait for pipeline steps.
///
/// The pipeline runner calls these methods in order:
///
/// 1. `validate_input` - Check preconditions before execution
/// 2. `execute` - Perform the step's work
/// 3. `validate_output` - Verify the step produced valid output
///
/// Parameter checks belong in `validate_input` so a bad job fails before
/// any external tool is started.
pub trait PipelineStep: Send + Sync {
    /// Step name, used in logs, progress and error events.
    fn name(&self) -> &str;

    /// Validate inputs before execution.
    ///
    /// `state` holds the outputs of the steps that already ran.
    fn validate_input(&self, ctx: &Context, state: &JobState) -> StepResult<()>;

    /// Execute the step's main work and record results in `state`.
    ///
    /// Returns `StepOutcome::Skipped` when the step does not apply to this
    /// job.
    fn execute(&self, ctx: &Context, state: &mut JobState) -> StepResult<StepOutcome>;

    /// Validate outputs after `execute` returned `Success`.
    fn validate_output(&self, ctx: &Context, state: &JobState) -> StepResult<()>;

    /// Human-readable description of what this step does.
    fn description(&self) -> &str {
        self.name()
    }
}
