//! Queue scheduler: runs queued jobs one at a time on a worker thread.
//!
//! The worker owns the [`JobQueue`] for the whole run and is the only code
//! that changes job status. Observers get a [`QueueEvent`] stream and can
//! cancel the running job or stop the queue through the [`SchedulerHandle`].

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::Settings;
use crate::device::DeviceSelector;
use crate::error::ErrorKind;
use crate::events::{ErrorReport, JobResult, ProgressUpdate, QueueEvent, QueueSummary};
use crate::jobs::JobQueue;
use crate::logging::{JobLogger, LogCallback, LogConfig};
use crate::models::{JobConfig, JobStatus};
use crate::tools::Toolbox;

use super::errors::{PipelineError, PipelineResult};
use super::pipeline::{CancelHandle, Pipeline, PipelineRunResult};
use super::types::{Context, JobState, ProgressCallback, WarningCallback};
use super::create_standard_pipeline;

/// Builds a fresh pipeline for each job.
pub type PipelineFactory = fn() -> Pipeline;

/// Stage name used for backend selection warnings.
const DEVICE_STAGE: &str = "Device";

/// Runs a [`JobQueue`] with the standard pipeline.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use kmp_core::config::Settings;
/// use kmp_core::device::DeviceSelector;
/// use kmp_core::jobs::JobQueue;
/// use kmp_core::orchestrator::QueueScheduler;
/// use kmp_core::tools::Toolbox;
///
/// let settings = Settings::default();
/// let device = Arc::new(DeviceSelector::from_command(
///     &settings.tools.device_probe_command,
///     settings.processing.device,
/// ));
/// let toolbox = Toolbox::from_settings(&settings.tools);
/// let queue = JobQueue::new(settings.paths.temp_root.as_ref());
///
/// let handle = QueueScheduler::new(settings, toolbox, device).spawn(queue);
/// for event in handle.events() {
///     println!("{:?}", event);
/// }
/// let summary = handle.join();
/// println!("{}/{} succeeded", summary.succeeded, summary.total);
/// ```
pub struct QueueScheduler {
    settings: Settings,
    toolbox: Toolbox,
    device: Arc<DeviceSelector>,
    logs_dir: PathBuf,
    temp_root: PathBuf,
    log_config: LogConfig,
    pipeline_factory: PipelineFactory,
}

impl QueueScheduler {
    pub fn new(settings: Settings, toolbox: Toolbox, device: Arc<DeviceSelector>) -> Self {
        let logs_dir = PathBuf::from(&settings.paths.logs_folder);
        let temp_root = PathBuf::from(&settings.paths.temp_root);
        let log_config = LogConfig::from(&settings.logging);
        Self {
            settings,
            toolbox,
            device,
            logs_dir,
            temp_root,
            log_config,
            pipeline_factory: create_standard_pipeline,
        }
    }

    /// Use a different pipeline for every job.
    pub fn with_pipeline(mut self, factory: PipelineFactory) -> Self {
        self.pipeline_factory = factory;
        self
    }

    /// Start the worker thread on `queue`.
    ///
    /// Only jobs that are Queued when this is called run.
    pub fn spawn(self, queue: JobQueue) -> SchedulerHandle {
        let (events, receiver) = mpsc::channel();
        let cancel = CancelHandle::new();
        let stop = Arc::new(AtomicBool::new(false));
        let total = queue.count_with(JobStatus::Queued);

        let worker = Worker {
            scheduler: self,
            events,
            cancel: cancel.clone(),
            stop: Arc::clone(&stop),
        };
        let thread = thread::spawn(move || worker.run(queue));

        SchedulerHandle {
            events: receiver,
            cancel,
            stop,
            total,
            thread,
        }
    }
}

/// Control and observation of a running scheduler.
pub struct SchedulerHandle {
    events: Receiver<QueueEvent>,
    cancel: CancelHandle,
    stop: Arc<AtomicBool>,
    total: usize,
    thread: JoinHandle<(QueueSummary, JobQueue)>,
}

impl SchedulerHandle {
    /// Cancel the running job; the queue moves on to the next one.
    ///
    /// Takes effect at the next stage boundary. Has no effect between jobs.
    pub fn cancel_current(&self) {
        tracing::info!("Cancelling current job");
        self.cancel.cancel();
    }

    /// Cancel the running job and leave the remaining jobs Queued.
    pub fn stop(&self) {
        tracing::info!("Stopping queue");
        self.stop.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    /// Event stream; ends when the worker finishes.
    pub fn events(&self) -> &Receiver<QueueEvent> {
        &self.events
    }

    /// Jobs that were Queued when the scheduler started.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Wait for the worker and return its summary.
    pub fn join(self) -> QueueSummary {
        let total = self.total;
        match self.join_with_queue() {
            Ok((summary, _)) => summary,
            Err(_) => {
                tracing::error!("Queue worker panicked");
                QueueSummary::new(total)
            }
        }
    }

    /// Wait for the worker and take back the queue with final job states.
    pub fn join_with_queue(self) -> thread::Result<(QueueSummary, JobQueue)> {
        self.thread.join()
    }
}

struct Worker {
    scheduler: QueueScheduler,
    events: Sender<QueueEvent>,
    cancel: CancelHandle,
    stop: Arc<AtomicBool>,
}

impl Worker {
    fn emit(&self, event: QueueEvent) {
        // A dropped receiver only means nobody is watching
        let _ = self.events.send(event);
    }

    fn run(self, mut queue: JobQueue) -> (QueueSummary, JobQueue) {
        let pending: Vec<String> = queue
            .jobs()
            .iter()
            .filter(|j| j.status() == JobStatus::Queued)
            .map(|j| j.id.clone())
            .collect();
        let total = pending.len();
        let mut summary = QueueSummary::new(total);
        tracing::info!("Queue started with {} job(s)", total);

        for (position, job_id) in pending.iter().enumerate() {
            if self.stop.load(Ordering::SeqCst) {
                tracing::info!(
                    "Queue stopped with {} job(s) left",
                    total - summary.processed
                );
                break;
            }

            tracing::info!("Processing job {}/{}: {}", position + 1, total, job_id);
            let result = self.run_job(&mut queue, job_id, position, total, summary.processed);
            save_queue(&queue);
            tracing::info!("Job {} finished: {}", job_id, result.status);

            self.emit(QueueEvent::JobFinished(result.clone()));
            summary.record(result);
        }

        save_queue(&queue);
        tracing::info!(
            "Queue finished: {} succeeded, {} failed, {} cancelled",
            summary.succeeded,
            summary.failed,
            summary.cancelled
        );
        self.emit(QueueEvent::QueueFinished(summary.clone()));
        (summary, queue)
    }

    fn run_job(
        &self,
        queue: &mut JobQueue,
        job_id: &str,
        position: usize,
        total: usize,
        completed: usize,
    ) -> JobResult {
        let config = match queue.get_mut(job_id) {
            Some(job) => {
                if let Err(e) = job.start() {
                    return self.report_failure(queue, job_id, "Setup", ErrorKind::Setup, e.to_string());
                }
                job.config.clone()
            }
            None => {
                return JobResult::failed(ErrorReport {
                    job_id: job_id.to_string(),
                    stage: "Setup".to_string(),
                    kind: ErrorKind::Setup,
                    message: "job vanished from the queue".to_string(),
                });
            }
        };
        save_queue(queue);

        // Cleared before the start event so a cancel sent in reply sticks
        self.cancel.reset();
        self.emit(QueueEvent::JobStarted {
            job_id: job_id.to_string(),
            source: config.source.clone(),
            position: position + 1,
            jobs_total: total,
        });

        let (state, outcome) = self.execute(job_id, config, completed, total);

        let Some(job) = queue.get_mut(job_id) else {
            return JobResult::cancelled(job_id);
        };
        for record in &state.records {
            if let Err(e) = job.record_stage(record.clone()) {
                tracing::error!("{}", e);
            }
        }

        match outcome {
            Ok(PipelineRunResult {
                steps_completed,
                steps_skipped,
            }) => match state.artifact() {
                Some(artifact) => {
                    if let Err(e) = job.succeed(artifact.clone()) {
                        tracing::error!("{}", e);
                    }
                    JobResult::succeeded(job_id, artifact.clone(), steps_completed, steps_skipped)
                }
                None => self.report_failure(
                    queue,
                    job_id,
                    "Mux",
                    ErrorKind::Mux,
                    "pipeline finished without an artifact".to_string(),
                ),
            },
            Err(PipelineError::Cancelled { .. }) => {
                if let Err(e) = job.cancel() {
                    tracing::error!("{}", e);
                }
                JobResult::cancelled(job_id)
            }
            Err(e) => {
                let stage = e.step_name().to_string();
                self.report_failure(queue, job_id, &stage, e.kind(), e.detail())
            }
        }
    }

    /// Mark the job Failed and publish the error.
    fn report_failure(
        &self,
        queue: &mut JobQueue,
        job_id: &str,
        stage: &str,
        kind: ErrorKind,
        message: String,
    ) -> JobResult {
        let report = ErrorReport {
            job_id: job_id.to_string(),
            stage: stage.to_string(),
            kind,
            message,
        };
        tracing::error!(job = %job_id, stage, kind = %kind, "{}", report.message);

        if let Some(job) = queue.get_mut(job_id) {
            let transition = if job.status() == JobStatus::Queued {
                job.start().and_then(|_| job.fail(stage, kind, &report.message))
            } else {
                job.fail(stage, kind, &report.message)
            };
            if let Err(e) = transition {
                tracing::error!("{}", e);
            }
        }

        self.emit(QueueEvent::Error(report.clone()));
        JobResult::failed(report)
    }

    /// Run the pipeline for one job inside its own work directory.
    ///
    /// The work directory is removed before returning, whatever the outcome.
    fn execute(
        &self,
        job_id: &str,
        config: JobConfig,
        completed: usize,
        total: usize,
    ) -> (JobState, PipelineResult<PipelineRunResult>) {
        let scheduler = &self.scheduler;
        let mut state = JobState::new(job_id);
        state.started_at = Some(chrono::Local::now().to_rfc3339());

        if let Err(e) = fs::create_dir_all(&scheduler.temp_root) {
            let message = format!("cannot create temp root: {}", e);
            return (state, Err(PipelineError::setup_failed(job_id, message)));
        }
        let work_dir = match tempfile::Builder::new()
            .prefix(&format!("{}-", job_id))
            .tempdir_in(&scheduler.temp_root)
        {
            Ok(dir) => dir,
            Err(e) => {
                let message = format!("cannot create work directory: {}", e);
                return (state, Err(PipelineError::setup_failed(job_id, message)));
            }
        };

        let log_events = self.events.clone();
        let log_job = job_id.to_string();
        let log_callback: LogCallback = Box::new(move |line| {
            let _ = log_events.send(QueueEvent::Log {
                job_id: log_job.clone(),
                line: line.to_string(),
            });
        });
        let logger = match JobLogger::new(
            job_id,
            &scheduler.logs_dir,
            scheduler.log_config.clone(),
            Some(log_callback),
        ) {
            Ok(logger) => Arc::new(logger),
            Err(e) => {
                let message = format!("cannot create job log: {}", e);
                return (state, Err(PipelineError::setup_failed(job_id, message)));
            }
        };

        let device = scheduler.device.select();
        if let Some(warning) = scheduler.device.take_warning() {
            logger.warn(&warning);
            self.emit(QueueEvent::Warning {
                job_id: job_id.to_string(),
                stage: DEVICE_STAGE.to_string(),
                message: warning,
            });
        }

        let pipeline = (scheduler.pipeline_factory)().with_cancel_handle(&self.cancel);
        let steps: Vec<String> = pipeline.step_names().into_iter().map(String::from).collect();

        let progress_events = self.events.clone();
        let progress_job = job_id.to_string();
        let progress: ProgressCallback = Box::new(move |step, percent, _message| {
            let index = steps.iter().position(|s| s == step).unwrap_or(0) as u32;
            let job_percent = match steps.len() as u32 {
                0 => 100,
                n => ((index * 100 + percent) / n).min(100),
            };
            let _ = progress_events.send(QueueEvent::Progress(ProgressUpdate {
                job_id: progress_job.clone(),
                stage: step.to_string(),
                stage_percent: percent,
                job_percent,
                jobs_completed: completed,
                jobs_total: total,
            }));
        });

        let warning_events = self.events.clone();
        let warning_job = job_id.to_string();
        let warning: WarningCallback = Box::new(move |step, message| {
            let _ = warning_events.send(QueueEvent::Warning {
                job_id: warning_job.clone(),
                stage: step.to_string(),
                message: message.to_string(),
            });
        });

        let ctx = Context::new(
            config,
            scheduler.settings.clone(),
            job_id,
            work_dir.path().to_path_buf(),
            Arc::clone(&logger),
            scheduler.toolbox.clone(),
            device,
        )
        .with_progress_callback(progress)
        .with_warning_callback(warning);

        logger.section(&format!("Job {}", job_id));
        logger.info(&format!("Source: {}", ctx.config.source));
        logger.info(&format!("Compute backend: {}", device.backend));

        let outcome = pipeline.run(&ctx, &mut state);
        match &outcome {
            Ok(_) => logger.success("Job completed"),
            Err(PipelineError::Cancelled { .. }) => logger.warn("Job cancelled"),
            Err(e) => logger.error(&e.to_string()),
        }
        logger.close();
        drop(ctx);

        let work_path = work_dir.path().to_path_buf();
        if let Err(e) = work_dir.close() {
            tracing::warn!(
                "Failed to remove work directory {}: {}",
                work_path.display(),
                e
            );
        }
        (state, outcome)
    }
}

fn save_queue(queue: &JobQueue) {
    if let Err(e) = queue.save() {
        tracing::warn!("Failed to save queue: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ProbeOutcome, StaticProbe};
    use crate::models::{Backend, DevicePreference, ExportMode, JobRequest};
    use crate::orchestrator::step::PipelineStep;
    use crate::orchestrator::steps::{AcquireStep, MuxStep};
    use crate::orchestrator::errors::StepResult;
    use crate::orchestrator::testing::{test_settings, test_source, FakeSeparator, FakeTools};
    use crate::orchestrator::types::StepOutcome;
    use std::path::Path;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn selector(outcome: ProbeOutcome) -> Arc<DeviceSelector> {
        Arc::new(DeviceSelector::new(
            Box::new(StaticProbe::new(outcome)),
            DevicePreference::Auto,
        ))
    }

    /// Audio-only job whose vocals are muted, so separation always runs.
    fn karaoke_mix_request(root: &Path, name: &str) -> JobRequest {
        let source = test_source(root, name);
        let mut request = JobRequest::new(source.to_string_lossy());
        request.export_mode = ExportMode::AudioOnly;
        request.stem_gains.insert("vocals".to_string(), 0.0);
        request
    }

    fn scheduler(root: &Path, tools: &FakeTools, device: Arc<DeviceSelector>) -> QueueScheduler {
        QueueScheduler::new(test_settings(root), tools.toolbox(), device)
    }

    fn queue_in(root: &Path) -> JobQueue {
        JobQueue::new(&root.join("temp"))
    }

    #[test]
    fn failed_job_does_not_stop_queue() {
        let dir = tempdir().unwrap();
        let tools = FakeTools::default().with_separator(FakeSeparator::failing_on_call(2));
        let mut queue = queue_in(dir.path());
        let out = dir.path().join("out");
        let ids: Vec<String> = ["One.wav", "Two.wav", "Three.wav"]
            .iter()
            .map(|name| {
                queue
                    .submit(karaoke_mix_request(dir.path(), name), &out)
                    .unwrap()
            })
            .collect();

        let handle = scheduler(dir.path(), &tools, selector(ProbeOutcome::Absent)).spawn(queue);
        let events: Vec<QueueEvent> = handle.events().iter().collect();
        let (summary, queue) = handle.join_with_queue().unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total, 3);

        let statuses: Vec<JobStatus> = ids.iter().map(|id| queue.get(id).unwrap().status()).collect();
        assert_eq!(
            statuses,
            vec![JobStatus::Succeeded, JobStatus::Failed, JobStatus::Succeeded]
        );
        let failure = queue.get(&ids[1]).unwrap().error().unwrap();
        assert_eq!(failure.kind, ErrorKind::Separation);
        assert_eq!(failure.stage, "Separate");
        assert_eq!(tools.separator.call_count(), 3);

        let errors: Vec<&ErrorReport> = events
            .iter()
            .filter_map(|e| match e {
                QueueEvent::Error(report) => Some(report),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].job_id, ids[1]);
        assert_eq!(errors[0].kind, ErrorKind::Separation);
        assert!(matches!(events.last(), Some(QueueEvent::QueueFinished(_))));

        // Progress never goes backwards within a job and stays in range
        let mut last: Option<(String, u32)> = None;
        for event in &events {
            if let QueueEvent::Progress(p) = event {
                assert_eq!(p.jobs_total, 3);
                assert!(p.job_percent <= 100);
                if let Some((job, pct)) = &last {
                    if *job == p.job_id {
                        assert!(p.job_percent >= *pct);
                    }
                }
                last = Some((p.job_id.clone(), p.job_percent));
            }
        }

        // Work directories are gone; only the persisted queue remains
        let leftovers: Vec<String> = fs::read_dir(dir.path().join("temp"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(leftovers, vec!["queue.json".to_string()]);
        assert!(dir.path().join("logs").join(format!("{}.log", ids[0])).is_file());

        // Persisted states survive a reload
        let reloaded = queue_in(dir.path());
        assert_eq!(reloaded.get(&ids[1]).unwrap().status(), JobStatus::Failed);
    }

    #[test]
    fn broken_probe_runs_on_general_with_warning() {
        let dir = tempdir().unwrap();
        let tools = FakeTools::default();
        let mut queue = queue_in(dir.path());
        let id = queue
            .submit(karaoke_mix_request(dir.path(), "Song.wav"), &dir.path().join("out"))
            .unwrap();

        let device = selector(ProbeOutcome::Failed("driver not loaded".to_string()));
        let handle = scheduler(dir.path(), &tools, Arc::clone(&device)).spawn(queue);
        let events: Vec<QueueEvent> = handle.events().iter().collect();
        let summary = handle.join();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(device.cached().unwrap().backend, Backend::General);
        assert_eq!(tools.separator.backends_seen(), vec![Backend::General]);
        let warning = events.iter().find_map(|e| match e {
            QueueEvent::Warning { job_id, stage, message } => Some((job_id, stage, message)),
            _ => None,
        });
        let (job_id, stage, message) = warning.unwrap();
        assert_eq!(job_id, &id);
        assert_eq!(stage, "Device");
        assert!(message.contains("driver not loaded"));
        assert!(summary.result(&id).unwrap().artifact.as_ref().unwrap().is_file());
    }

    #[test]
    fn unknown_stem_is_rejected_before_any_model_runs() {
        let dir = tempdir().unwrap();
        let tools = FakeTools::default();
        let mut queue = queue_in(dir.path());
        let mut request = karaoke_mix_request(dir.path(), "Song.wav");
        request.stem_gains.insert("echo".to_string(), 0.5);

        let err = queue.submit(request, &dir.path().join("out")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StemMix);
        assert!(queue.is_empty());

        let summary = scheduler(dir.path(), &tools, selector(ProbeOutcome::Absent))
            .spawn(queue)
            .join();
        assert_eq!(summary.total, 0);
        assert_eq!(tools.separator.call_count(), 0);
    }

    static CANCEL_GATE: AtomicBool = AtomicBool::new(false);
    static STOP_GATE: AtomicBool = AtomicBool::new(false);

    /// Blocks until its gate opens.
    struct GateStep(&'static AtomicBool);

    impl PipelineStep for GateStep {
        fn name(&self) -> &str {
            "Gate"
        }

        fn validate_input(&self, _ctx: &Context, _state: &JobState) -> StepResult<()> {
            Ok(())
        }

        fn execute(&self, _ctx: &Context, _state: &mut JobState) -> StepResult<StepOutcome> {
            let deadline = Instant::now() + Duration::from_secs(10);
            while !self.0.load(Ordering::SeqCst) && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(StepOutcome::Success)
        }

        fn validate_output(&self, _ctx: &Context, _state: &JobState) -> StepResult<()> {
            Ok(())
        }
    }

    fn cancel_pipeline() -> Pipeline {
        Pipeline::new()
            .with_step(GateStep(&CANCEL_GATE))
            .with_step(AcquireStep::new())
            .with_step(MuxStep::new())
    }

    fn stop_pipeline() -> Pipeline {
        Pipeline::new()
            .with_step(GateStep(&STOP_GATE))
            .with_step(AcquireStep::new())
            .with_step(MuxStep::new())
    }

    fn wait_for_start(handle: &SchedulerHandle) -> String {
        loop {
            match handle.events().recv_timeout(Duration::from_secs(10)) {
                Ok(QueueEvent::JobStarted { job_id, .. }) => return job_id,
                Ok(_) => continue,
                Err(e) => panic!("no job started: {}", e),
            }
        }
    }

    #[test]
    fn cancel_current_moves_on() {
        let dir = tempdir().unwrap();
        let tools = FakeTools::default();
        let mut queue = queue_in(dir.path());
        let out = dir.path().join("out");
        let first = queue.submit(karaoke_mix_request(dir.path(), "A.wav"), &out).unwrap();
        let second = queue.submit(karaoke_mix_request(dir.path(), "B.wav"), &out).unwrap();

        let handle = scheduler(dir.path(), &tools, selector(ProbeOutcome::Absent))
            .with_pipeline(cancel_pipeline)
            .spawn(queue);
        assert_eq!(wait_for_start(&handle), first);
        handle.cancel_current();
        CANCEL_GATE.store(true, Ordering::SeqCst);

        let (summary, queue) = handle.join_with_queue().unwrap();
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(queue.get(&first).unwrap().status(), JobStatus::Cancelled);
        assert_eq!(queue.get(&second).unwrap().status(), JobStatus::Succeeded);
        assert!(queue.get(&first).unwrap().artifact().is_none());
    }

    #[test]
    fn stop_leaves_remaining_jobs_queued() {
        let dir = tempdir().unwrap();
        let tools = FakeTools::default();
        let mut queue = queue_in(dir.path());
        let out = dir.path().join("out");
        let first = queue.submit(karaoke_mix_request(dir.path(), "A.wav"), &out).unwrap();
        let second = queue.submit(karaoke_mix_request(dir.path(), "B.wav"), &out).unwrap();

        let handle = scheduler(dir.path(), &tools, selector(ProbeOutcome::Absent))
            .with_pipeline(stop_pipeline)
            .spawn(queue);
        assert_eq!(wait_for_start(&handle), first);
        handle.stop();
        STOP_GATE.store(true, Ordering::SeqCst);

        let (summary, queue) = handle.join_with_queue().unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.remaining(), 1);
        assert_eq!(queue.get(&first).unwrap().status(), JobStatus::Cancelled);
        assert_eq!(queue.get(&second).unwrap().status(), JobStatus::Queued);
        assert!(!out.exists());
    }
}
