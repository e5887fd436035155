//! Jobs and the job queue.
//!
//! This module provides:
//! - `Job`: one submission with enforced status transitions
//! - `StageRecord`: per-stage outcome kept on the job
//! - `JobQueue`: FIFO queue with persistence to the temp folder

mod queue;
mod types;

pub use queue::JobQueue;
pub use types::{Job, JobFailure, JobStateError, StageOutcome, StageRecord};
