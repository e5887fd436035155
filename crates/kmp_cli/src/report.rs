//! Terminal rendering of scheduler events.

use kmp_core::events::{QueueEvent, QueueSummary};
use kmp_core::models::JobStatus;

/// Prints [`QueueEvent`]s as they arrive.
///
/// Progress is printed once per stage change or every 10% so long
/// separations do not flood the terminal.
pub struct EventPrinter {
    json: bool,
    verbose: bool,
    last_progress: Option<(String, String, u32)>,
}

impl EventPrinter {
    pub fn new(json: bool, verbose: bool) -> Self {
        Self {
            json,
            verbose,
            last_progress: None,
        }
    }

    pub fn print(&mut self, event: &QueueEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Cannot serialize event: {}", e),
            }
            return;
        }
        if let Some(line) = self.render(event) {
            match event {
                QueueEvent::Warning { .. } | QueueEvent::Error(_) => eprintln!("{}", line),
                _ => println!("{}", line),
            }
        }
    }

    pub fn print_summary(&self, summary: &QueueSummary) {
        println!();
        println!(
            "{} processed: {} succeeded, {} failed, {} cancelled",
            summary.processed, summary.succeeded, summary.failed, summary.cancelled
        );
        if summary.remaining() > 0 {
            println!("{} job(s) left queued", summary.remaining());
        }
        for result in &summary.results {
            match (&result.artifact, &result.error) {
                (Some(artifact), _) => println!("  {}  {}", result.job_id, artifact.display()),
                (None, Some(error)) => println!(
                    "  {}  {} in {}: {}",
                    result.job_id, error.kind, error.stage, error.message
                ),
                (None, None) => println!("  {}  {}", result.job_id, result.status),
            }
        }
    }

    fn render(&mut self, event: &QueueEvent) -> Option<String> {
        match event {
            QueueEvent::JobStarted {
                job_id,
                source,
                position,
                jobs_total,
            } => {
                self.last_progress = None;
                Some(format!("[{}/{}] {} {}", position, jobs_total, job_id, source))
            }
            QueueEvent::Progress(update) => {
                let bucket = update.job_percent / 10;
                let key = (update.job_id.clone(), update.stage.clone(), bucket);
                if self.last_progress.as_ref() == Some(&key) {
                    return None;
                }
                self.last_progress = Some(key);
                Some(format!(
                    "  {:>3}%  {:<10} (queue {:.0}%)",
                    update.job_percent,
                    update.stage,
                    update.overall_percent()
                ))
            }
            QueueEvent::Warning {
                job_id,
                stage,
                message,
            } => Some(format!("  warning [{} {}]: {}", job_id, stage, message)),
            QueueEvent::Error(report) => Some(format!(
                "  error [{} {}] {}: {}",
                report.job_id, report.stage, report.kind, report.message
            )),
            QueueEvent::Log { line, .. } => self.verbose.then(|| format!("    {}", line)),
            QueueEvent::JobFinished(result) => Some(match result.status {
                JobStatus::Succeeded => match &result.artifact {
                    Some(artifact) => format!("  done: {}", artifact.display()),
                    None => "  done".to_string(),
                },
                status => format!("  {}", status),
            }),
            QueueEvent::QueueFinished(_) => None,
        }
    }
}
