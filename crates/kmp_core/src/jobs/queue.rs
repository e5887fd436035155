//! FIFO job queue with persistence.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::types::Job;
use crate::error::StageResult;
use crate::models::{JobConfig, JobRequest, JobStatus};

/// Persistent queue state (saved to queue.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueState {
    /// Queue format version.
    version: u32,
    /// Jobs in queue order.
    jobs: Vec<Job>,
    /// Next id number; ids are not reused after finished jobs are cleared.
    #[serde(default)]
    next_id: u32,
}

impl Default for QueueState {
    fn default() -> Self {
        Self {
            version: 1,
            jobs: Vec::new(),
            next_id: 1,
        }
    }
}

/// Jobs in enqueue order.
///
/// Order never changes once a job is enqueued; jobs can only be removed.
#[derive(Debug)]
pub struct JobQueue {
    jobs: Vec<Job>,
    /// Path to queue.json; empty for an in-memory queue.
    queue_file: PathBuf,
    next_id: u32,
}

impl JobQueue {
    /// Open the queue persisted in `temp_root`, or start an empty one.
    ///
    /// Jobs that were running when the queue was saved are queued again.
    pub fn new(temp_root: &Path) -> Self {
        let queue_file = temp_root.join("queue.json");

        let state = if queue_file.exists() {
            match fs::read_to_string(&queue_file) {
                Ok(content) => match serde_json::from_str::<QueueState>(&content) {
                    Ok(state) => {
                        tracing::info!("Loaded {} jobs from queue.json", state.jobs.len());
                        state
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse queue.json: {}", e);
                        QueueState::default()
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read queue.json: {}", e);
                    QueueState::default()
                }
            }
        } else {
            QueueState::default()
        };
        let mut jobs = state.jobs;

        for job in &mut jobs {
            if job.requeue_interrupted() {
                tracing::info!("Requeued interrupted job {}", job.id);
            }
        }

        let next_id = jobs
            .iter()
            .filter_map(|j| j.id.strip_prefix("job-")?.parse::<u32>().ok())
            .max()
            .map_or(1, |n| n + 1)
            .max(state.next_id);

        Self {
            jobs,
            queue_file,
            next_id,
        }
    }

    /// Create a queue without persistence (for testing).
    pub fn in_memory() -> Self {
        Self {
            jobs: Vec::new(),
            queue_file: PathBuf::new(),
            next_id: 1,
        }
    }

    /// Persist queue to disk.
    pub fn save(&self) -> std::io::Result<()> {
        if self.queue_file.as_os_str().is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.queue_file.parent() {
            fs::create_dir_all(parent)?;
        }

        let state = QueueState {
            jobs: self.jobs.clone(),
            next_id: self.next_id,
            ..QueueState::default()
        };
        let json = serde_json::to_string_pretty(&state).map_err(std::io::Error::other)?;

        // Write atomically via temp file
        let temp_file = self.queue_file.with_extension("json.tmp");
        fs::write(&temp_file, &json)?;
        fs::rename(&temp_file, &self.queue_file)?;

        tracing::debug!("Saved {} jobs to queue.json", self.jobs.len());
        Ok(())
    }

    /// Add a validated job; returns its id (`job-0001`, `job-0002`, ...).
    pub fn enqueue(&mut self, config: JobConfig) -> String {
        let id = format!("job-{:04}", self.next_id);
        self.next_id += 1;
        tracing::debug!(job = %id, source = %config.source, "Enqueued job");
        self.jobs.push(Job::new(id.clone(), config));
        id
    }

    /// Validate a submission and enqueue it.
    ///
    /// Bad stem names and out-of-range parameters are rejected here, before
    /// anything runs.
    pub fn submit(&mut self, request: JobRequest, default_output_dir: &Path) -> StageResult<String> {
        let config = request.into_config(default_output_dir)?;
        Ok(self.enqueue(config))
    }

    /// Remove a job that is not running.
    pub fn remove(&mut self, id: &str) -> Option<Job> {
        let index = self.jobs.iter().position(|j| j.id == id)?;
        if self.jobs[index].status() == JobStatus::Running {
            tracing::warn!("Refusing to remove running job {}", id);
            return None;
        }
        Some(self.jobs.remove(index))
    }

    /// Drop every job in a terminal state.
    pub fn clear_finished(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|j| !j.is_terminal());
        before - self.jobs.len()
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    /// First queued job in enqueue order.
    pub fn next_queued(&self) -> Option<&Job> {
        self.jobs.iter().find(|j| j.status() == JobStatus::Queued)
    }

    pub fn count_with(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status() == status).count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    fn config(source: &str) -> JobConfig {
        JobRequest::new(source).into_config(Path::new(".")).unwrap()
    }

    #[test]
    fn ids_are_sequential() {
        let mut queue = JobQueue::in_memory();
        assert_eq!(queue.enqueue(config("a.mp4")), "job-0001");
        assert_eq!(queue.enqueue(config("b.mp4")), "job-0002");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn next_queued_is_fifo() {
        let mut queue = JobQueue::in_memory();
        let first = queue.enqueue(config("a.mp4"));
        let second = queue.enqueue(config("b.mp4"));
        assert_eq!(queue.next_queued().map(|j| j.id.as_str()), Some(first.as_str()));

        queue.get_mut(&first).unwrap().start().unwrap();
        assert_eq!(queue.next_queued().map(|j| j.id.as_str()), Some(second.as_str()));
    }

    #[test]
    fn running_job_cannot_be_removed() {
        let mut queue = JobQueue::in_memory();
        let id = queue.enqueue(config("a.mp4"));
        queue.get_mut(&id).unwrap().start().unwrap();
        assert!(queue.remove(&id).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn removal_keeps_order() {
        let mut queue = JobQueue::in_memory();
        let a = queue.enqueue(config("a.mp4"));
        let b = queue.enqueue(config("b.mp4"));
        let c = queue.enqueue(config("c.mp4"));
        queue.remove(&b).unwrap();
        let ids: Vec<_> = queue.jobs().iter().map(|j| j.id.clone()).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn submit_rejects_unknown_stem() {
        let mut queue = JobQueue::in_memory();
        let mut request = JobRequest::new("a.mp4");
        request.stem_gains.insert("echo".into(), 1.0);
        let err = queue.submit(request, Path::new(".")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StemMix);
        assert!(queue.is_empty());
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempdir().unwrap();
        {
            let mut queue = JobQueue::new(dir.path());
            let a = queue.enqueue(config("a.mp4"));
            queue.enqueue(config("b.mp4"));
            queue.get_mut(&a).unwrap().start().unwrap();
            queue.save().unwrap();
        }
        assert!(dir.path().join("queue.json").exists());
        assert!(!dir.path().join("queue.json.tmp").exists());

        let mut queue = JobQueue::new(dir.path());
        assert_eq!(queue.len(), 2);
        // Interrupted job is queued again
        assert_eq!(queue.count_with(JobStatus::Queued), 2);
        assert_eq!(queue.enqueue(config("c.mp4")), "job-0003");
    }

    #[test]
    fn clear_finished_drops_terminal_jobs() {
        let mut queue = JobQueue::in_memory();
        let a = queue.enqueue(config("a.mp4"));
        queue.enqueue(config("b.mp4"));
        queue.get_mut(&a).unwrap().cancel().unwrap();
        assert_eq!(queue.clear_finished(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn ids_continue_after_clearing() {
        let dir = tempdir().unwrap();
        {
            let mut queue = JobQueue::new(dir.path());
            let a = queue.enqueue(config("a.mp4"));
            let b = queue.enqueue(config("b.mp4"));
            queue.get_mut(&a).unwrap().cancel().unwrap();
            queue.get_mut(&b).unwrap().cancel().unwrap();
            assert_eq!(queue.clear_finished(), 2);
            queue.save().unwrap();
        }

        let mut queue = JobQueue::new(dir.path());
        assert!(queue.is_empty());
        assert_eq!(queue.enqueue(config("c.mp4")), "job-0003");
    }
}
