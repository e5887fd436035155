//! Scheduler event stream.
//!
//! The worker thread is the only producer; observers (CLI, UI) consume the
//! events from an `mpsc` receiver and never touch job state directly.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::ErrorKind;
use crate::models::JobStatus;

/// One progress tick, at step and queue level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub job_id: String,
    pub stage: String,
    /// Progress inside the current stage (0..=100).
    pub stage_percent: u32,
    /// Progress of the whole job (0..=100).
    pub job_percent: u32,
    /// Jobs that reached a terminal state.
    pub jobs_completed: usize,
    pub jobs_total: usize,
}

impl ProgressUpdate {
    /// Queue-level progress (0..=100), counting the running job's share.
    pub fn overall_percent(&self) -> f64 {
        if self.jobs_total == 0 {
            return 100.0;
        }
        let done = self.jobs_completed as f64 + f64::from(self.job_percent.min(100)) / 100.0;
        (done / self.jobs_total as f64 * 100.0).min(100.0)
    }
}

/// A job-fatal error, with the stage it happened in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub job_id: String,
    pub stage: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Final outcome of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    /// Final artifact, on success.
    pub artifact: Option<PathBuf>,
    pub error: Option<ErrorReport>,
    pub steps_completed: Vec<String>,
    pub steps_skipped: Vec<String>,
}

impl JobResult {
    pub fn succeeded(
        job_id: impl Into<String>,
        artifact: PathBuf,
        steps_completed: Vec<String>,
        steps_skipped: Vec<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Succeeded,
            artifact: Some(artifact),
            error: None,
            steps_completed,
            steps_skipped,
        }
    }

    pub fn failed(report: ErrorReport) -> Self {
        Self {
            job_id: report.job_id.clone(),
            status: JobStatus::Failed,
            artifact: None,
            error: Some(report),
            steps_completed: Vec::new(),
            steps_skipped: Vec::new(),
        }
    }

    pub fn cancelled(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Cancelled,
            artifact: None,
            error: None,
            steps_completed: Vec::new(),
            steps_skipped: Vec::new(),
        }
    }
}

/// Totals of a scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueSummary {
    /// Jobs that reached a terminal state during this run.
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Jobs that were queued when the run started.
    pub total: usize,
    /// Per-job outcomes, in run order.
    pub results: Vec<JobResult>,
}

impl QueueSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn record(&mut self, result: JobResult) {
        self.processed += 1;
        match result.status {
            JobStatus::Succeeded => self.succeeded += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
            JobStatus::Queued | JobStatus::Running => {}
        }
        self.results.push(result);
    }

    /// Jobs that were left queued (e.g. after a stop request).
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }

    pub fn result(&self, job_id: &str) -> Option<&JobResult> {
        self.results.iter().find(|r| r.job_id == job_id)
    }
}

/// Event emitted by the queue scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    JobStarted {
        job_id: String,
        source: String,
        position: usize,
        jobs_total: usize,
    },
    Progress(ProgressUpdate),
    /// Non-fatal condition (device fallback, probe downgrade).
    Warning {
        job_id: String,
        stage: String,
        message: String,
    },
    Error(ErrorReport),
    /// One formatted line of the job log.
    Log { job_id: String, line: String },
    JobFinished(JobResult),
    QueueFinished(QueueSummary),
}
