//! Job record and lifecycle.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::models::{JobConfig, JobStatus};

/// Refused job mutation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobStateError {
    #[error("Job '{job_id}' cannot go from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job '{job_id}' is {status} and can no longer change")]
    Terminal { job_id: String, status: JobStatus },

    #[error("Job '{job_id}' is not running")]
    NotRunning { job_id: String },
}

/// How a stage ended for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    Skipped { reason: String },
    Failed { kind: ErrorKind, message: String },
}

/// Result of one stage of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: String,
    #[serde(flatten)]
    pub outcome: StageOutcome,
}

impl StageRecord {
    pub fn completed(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            outcome: StageOutcome::Completed,
        }
    }

    pub fn skipped(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            outcome: StageOutcome::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn failed(stage: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            outcome: StageOutcome::Failed {
                kind,
                message: message.into(),
            },
        }
    }
}

/// Error attached to a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub stage: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// A queued unit of work.
///
/// Status only moves forward: Queued → Running → Succeeded | Failed |
/// Cancelled (a queued job may also be cancelled directly). Once terminal,
/// every mutation is refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub config: JobConfig,
    status: JobStatus,
    #[serde(default)]
    stages: Vec<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    artifact: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<JobFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<String>,
}

impl Job {
    pub fn new(id: impl Into<String>, config: JobConfig) -> Self {
        Self {
            id: id.into(),
            config,
            status: JobStatus::Queued,
            stages: Vec::new(),
            artifact: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    pub fn error(&self) -> Option<&JobFailure> {
        self.error.as_ref()
    }

    pub fn started_at(&self) -> Option<&str> {
        self.started_at.as_deref()
    }

    pub fn finished_at(&self) -> Option<&str> {
        self.finished_at.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Queued → Running.
    pub fn start(&mut self) -> Result<(), JobStateError> {
        self.transition(JobStatus::Queued, JobStatus::Running)?;
        self.started_at = Some(now());
        Ok(())
    }

    /// Record a stage result while running.
    pub fn record_stage(&mut self, record: StageRecord) -> Result<(), JobStateError> {
        self.ensure_running()?;
        self.stages.push(record);
        Ok(())
    }

    /// Running → Succeeded.
    pub fn succeed(&mut self, artifact: PathBuf) -> Result<(), JobStateError> {
        self.transition(JobStatus::Running, JobStatus::Succeeded)?;
        self.artifact = Some(artifact);
        self.finished_at = Some(now());
        Ok(())
    }

    /// Running → Failed, attaching the error.
    pub fn fail(
        &mut self,
        stage: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Result<(), JobStateError> {
        self.transition(JobStatus::Running, JobStatus::Failed)?;
        self.error = Some(JobFailure {
            stage: stage.into(),
            kind,
            message: message.into(),
        });
        self.finished_at = Some(now());
        Ok(())
    }

    /// Queued or Running → Cancelled.
    pub fn cancel(&mut self) -> Result<(), JobStateError> {
        self.ensure_not_terminal()?;
        self.status = JobStatus::Cancelled;
        self.finished_at = Some(now());
        Ok(())
    }

    /// Put a job that was running when the queue was last saved back in line.
    pub(crate) fn requeue_interrupted(&mut self) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.status = JobStatus::Queued;
        self.stages.clear();
        self.started_at = None;
        true
    }

    fn transition(&mut self, from: JobStatus, to: JobStatus) -> Result<(), JobStateError> {
        self.ensure_not_terminal()?;
        if self.status != from {
            return Err(JobStateError::InvalidTransition {
                job_id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    fn ensure_not_terminal(&self) -> Result<(), JobStateError> {
        if self.status.is_terminal() {
            return Err(JobStateError::Terminal {
                job_id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), JobStateError> {
        self.ensure_not_terminal()?;
        if self.status != JobStatus::Running {
            return Err(JobStateError::NotRunning {
                job_id: self.id.clone(),
            });
        }
        Ok(())
    }
}

fn now() -> String {
    chrono::Local::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobRequest;

    fn job() -> Job {
        let config = JobRequest::new("song.mp4")
            .into_config(Path::new("."))
            .unwrap();
        Job::new("job-0001", config)
    }

    #[test]
    fn happy_path() {
        let mut job = job();
        assert_eq!(job.status(), JobStatus::Queued);
        job.start().unwrap();
        assert!(job.started_at().is_some());
        job.record_stage(StageRecord::completed("Acquire")).unwrap();
        job.record_stage(StageRecord::skipped("Effects", "no effects"))
            .unwrap();
        job.succeed("out/song.mp4".into()).unwrap();

        assert_eq!(job.status(), JobStatus::Succeeded);
        assert_eq!(job.stages().len(), 2);
        assert_eq!(job.artifact(), Some(Path::new("out/song.mp4")));
        assert!(job.finished_at().is_some());
    }

    #[test]
    fn terminal_job_refuses_mutation() {
        let mut job = job();
        job.start().unwrap();
        job.fail("Separate", ErrorKind::Separation, "model crashed")
            .unwrap();

        assert!(matches!(
            job.record_stage(StageRecord::completed("Mux")),
            Err(JobStateError::Terminal { .. })
        ));
        assert!(job.succeed("x".into()).is_err());
        assert!(job.cancel().is_err());
        assert_eq!(job.error().map(|e| e.kind), Some(ErrorKind::Separation));
    }

    #[test]
    fn stages_only_recorded_while_running() {
        let mut job = job();
        assert!(matches!(
            job.record_stage(StageRecord::completed("Acquire")),
            Err(JobStateError::NotRunning { .. })
        ));
        assert!(matches!(
            job.succeed("x".into()),
            Err(JobStateError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn queued_job_can_be_cancelled() {
        let mut job = job();
        job.cancel().unwrap();
        assert_eq!(job.status(), JobStatus::Cancelled);
        assert!(job.start().is_err());
    }

    #[test]
    fn interrupted_job_requeues() {
        let mut job = job();
        job.start().unwrap();
        job.record_stage(StageRecord::completed("Acquire")).unwrap();
        assert!(job.requeue_interrupted());
        assert_eq!(job.status(), JobStatus::Queued);
        assert!(job.stages().is_empty());
    }

    #[test]
    fn serializes_stage_outcomes() {
        let record = StageRecord::failed("Mux", ErrorKind::Mux, "disk full");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"outcome\":\"failed\""));
        assert!(json.contains("\"kind\":\"MuxError\""));
        let back: StageRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
