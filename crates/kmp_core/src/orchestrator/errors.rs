//! Error types for the orchestrator pipeline.
//!
//! Errors carry context that chains through layers:
//! Job → Step → Stage error → Tool detail

use thiserror::Error;

use crate::error::{ErrorKind, StageError};

/// Top-level pipeline error with job context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A step failed during validation or execution.
    #[error("Job '{job_name}' failed at step '{step_name}': {source}")]
    StepFailed {
        job_name: String,
        step_name: String,
        #[source]
        source: StageError,
    },

    /// Pipeline was cancelled between steps.
    #[error("Job '{job_name}' was cancelled")]
    Cancelled { job_name: String },

    /// Failed to set up the job (work directory, logger).
    #[error("Job '{job_name}' setup failed: {message}")]
    SetupFailed { job_name: String, message: String },
}

impl PipelineError {
    pub fn step_failed(
        job_name: impl Into<String>,
        step_name: impl Into<String>,
        source: StageError,
    ) -> Self {
        Self::StepFailed {
            job_name: job_name.into(),
            step_name: step_name.into(),
            source,
        }
    }

    pub fn setup_failed(job_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            job_name: job_name.into(),
            message: message.into(),
        }
    }

    pub fn cancelled(job_name: impl Into<String>) -> Self {
        Self::Cancelled {
            job_name: job_name.into(),
        }
    }

    /// Error channel category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StepFailed { source, .. } => source.kind(),
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::SetupFailed { .. } => ErrorKind::Setup,
        }
    }

    /// Step the error is attributed to.
    pub fn step_name(&self) -> &str {
        match self {
            Self::StepFailed { step_name, .. } => step_name,
            Self::Cancelled { .. } => "Cancelled",
            Self::SetupFailed { .. } => "Setup",
        }
    }

    /// Message without the job/step prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::StepFailed { source, .. } => source.to_string(),
            Self::Cancelled { .. } => "cancelled by request".to_string(),
            Self::SetupFailed { message, .. } => message.clone(),
        }
    }
}

/// Result type for step operations.
pub type StepResult<T> = Result<T, StageError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
