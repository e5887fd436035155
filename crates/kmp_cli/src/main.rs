//! KMP - Karaoke Media Processor command line.
//!
//! Handles:
//! - Configuration loading (platform config dir or `--config`)
//! - Application-level logging initialization
//! - Running job files through the queue scheduler
//! - Standalone subtitle synthesis from a transcript

mod jobfile;
mod report;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use kmp_core::config::ConfigManager;
use kmp_core::device::DeviceSelector;
use kmp_core::jobs::JobQueue;
use kmp_core::logging::{init_tracing, init_tracing_with_file, LogLevel};
use kmp_core::models::SubtitleStyle;
use kmp_core::orchestrator::QueueScheduler;
use kmp_core::subtitles::{synthesize, write_ass_file, SynthesisOptions};
use kmp_core::tools::{parse_transcript_json, Toolbox};
use kmp_core::transcription::{sanitize_words, scale_to_tempo};

use jobfile::JobFile;
use report::EventPrinter;

#[derive(Parser)]
#[command(name = "kmp")]
#[command(about = "Turn songs into karaoke videos, backing tracks and stems")]
#[command(version)]
struct Cli {
    /// Config file (default: kmp.toml in the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue every job in a job file and run the queue
    Run {
        /// TOML file with a [[jobs]] array
        jobs: PathBuf,

        /// Print scheduler events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Create or show the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show the compute backend jobs would run on
    Device,

    /// Build a karaoke .ass file from a transcript JSON
    Subtitles {
        /// Transcript with segments[].words[] entries
        transcript: PathBuf,

        /// Output .ass file
        #[arg(short, long)]
        output: PathBuf,

        /// Tempo factor the audio was changed by
        #[arg(long, default_value_t = 1.0)]
        tempo: f64,

        /// TOML file with a subtitle style (font, size, colors)
        #[arg(long)]
        style: Option<PathBuf>,

        /// Title written to the script header
        #[arg(long)]
        title: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    match cli.command {
        Commands::Run { jobs, json } => run_jobs(&config_path, &jobs, level, json, cli.verbose),
        Commands::Config { action } => {
            init_tracing(LogLevel::Warn);
            config_command(&config_path, action)
        }
        Commands::Device => {
            init_tracing(level);
            show_device(&config_path)
        }
        Commands::Subtitles {
            transcript,
            output,
            tempo,
            style,
            title,
        } => {
            init_tracing(level);
            build_subtitles(
                &config_path,
                &transcript,
                &output,
                tempo,
                style.as_deref(),
                title.as_deref(),
            )
        }
    }
}

/// `kmp.toml` in the platform config dir, or `.config/kmp.toml` when there
/// is no home directory.
fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "kmp")
        .map(|dirs| dirs.config_dir().join("kmp.toml"))
        .unwrap_or_else(|| PathBuf::from(".config").join("kmp.toml"))
}

fn load_config(path: &Path) -> Result<ConfigManager> {
    let mut manager = ConfigManager::new(path);
    manager
        .load_or_create()
        .with_context(|| format!("loading config {}", path.display()))?;
    Ok(manager)
}

fn run_jobs(
    config_path: &Path,
    jobs_path: &Path,
    level: LogLevel,
    json: bool,
    verbose: bool,
) -> Result<ExitCode> {
    let manager = load_config(config_path)?;

    let logs_dir = manager.logs_folder();
    let _log_guard = match init_tracing_with_file(level, &logs_dir) {
        Ok(guard) => Some(guard),
        Err(e) => {
            init_tracing(level);
            tracing::warn!("Cannot write application log in {}: {}", logs_dir.display(), e);
            None
        }
    };

    tracing::info!("KMP starting");
    tracing::info!("Config: {}", config_path.display());
    tracing::info!("Core version: {}", kmp_core::version());

    manager
        .ensure_dirs_exist()
        .context("creating output, temp and log folders")?;

    let job_file = JobFile::load(jobs_path)?;
    let settings = manager.settings().clone();
    let default_output = PathBuf::from(&settings.paths.output_folder);

    let mut queue = open_queue(&manager.temp_root())?;

    let mut rejected = 0usize;
    for (index, request) in job_file.jobs.into_iter().enumerate() {
        let source = request.source.clone();
        match queue.submit(request, &default_output) {
            Ok(id) => {
                if !json {
                    println!("Queued {}: {}", id, source);
                }
            }
            Err(e) => {
                rejected += 1;
                eprintln!("Job #{} ({}) rejected [{}]: {}", index + 1, source, e.kind(), e);
            }
        }
    }
    queue.save().context("saving queue")?;

    let device = Arc::new(DeviceSelector::from_command(
        &settings.tools.device_probe_command,
        settings.processing.device,
    ));
    let toolbox = Toolbox::from_settings(&settings.tools);
    let handle = QueueScheduler::new(settings, toolbox, device).spawn(queue);

    let mut printer = EventPrinter::new(json, verbose);
    for event in handle.events() {
        printer.print(&event);
    }
    let summary = handle.join();
    if !json {
        printer.print_summary(&summary);
    }

    if summary.failed > 0 || rejected > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Open the persisted queue without the jobs finished in earlier runs.
///
/// Jobs still Queued (or interrupted while Running) are kept and run again.
fn open_queue(temp_root: &Path) -> Result<JobQueue> {
    let mut queue = JobQueue::new(temp_root);
    let cleared = queue.clear_finished();
    if cleared > 0 {
        tracing::info!("Cleared {} finished job(s) from the persisted queue", cleared);
        queue.save().context("saving queue")?;
    }
    if !queue.is_empty() {
        tracing::info!("{} job(s) left over from an earlier run", queue.len());
    }
    Ok(queue)
}

fn config_command(config_path: &Path, action: ConfigAction) -> Result<ExitCode> {
    match action {
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            ConfigManager::new(config_path)
                .save()
                .with_context(|| format!("writing {}", config_path.display()))?;
            println!("Wrote {}", config_path.display());
        }
        ConfigAction::Show => {
            let manager = load_config(config_path)?;
            let text = toml::to_string_pretty(manager.settings()).context("rendering config")?;
            println!("# {}", config_path.display());
            print!("{}", text);
        }
        ConfigAction::Path => println!("{}", config_path.display()),
    }
    Ok(ExitCode::SUCCESS)
}

fn show_device(config_path: &Path) -> Result<ExitCode> {
    let manager = load_config(config_path)?;
    let settings = manager.settings();
    let selector = DeviceSelector::from_command(
        &settings.tools.device_probe_command,
        settings.processing.device,
    );

    let context = selector.select();
    println!("Preference: {:?}", settings.processing.device);
    println!("Backend:    {}", context.backend);
    if let Some(warning) = selector.take_warning() {
        println!("Warning:    {}", warning);
    }
    Ok(ExitCode::SUCCESS)
}

fn build_subtitles(
    config_path: &Path,
    transcript: &Path,
    output: &Path,
    tempo: f64,
    style_path: Option<&Path>,
    title: Option<&str>,
) -> Result<ExitCode> {
    let manager = load_config(config_path)?;

    let style = match style_path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading style {}", path.display()))?;
            toml::from_str::<SubtitleStyle>(&text)
                .with_context(|| format!("parsing style {}", path.display()))?
        }
        None => SubtitleStyle::default(),
    };
    if !tempo.is_finite() || tempo <= 0.0 {
        bail!("tempo must be a positive number, got {}", tempo);
    }

    let json = fs::read_to_string(transcript)
        .with_context(|| format!("reading transcript {}", transcript.display()))?;
    let raw = parse_transcript_json(&json)?;
    let tokens = scale_to_tempo(sanitize_words(raw), tempo);
    if tokens.is_empty() {
        bail!("transcript {} has no usable words", transcript.display());
    }

    let options = SynthesisOptions::from(&manager.settings().subtitles);
    let cues = synthesize(&tokens, &style, &options)?;
    write_ass_file(output, &cues, &style, title)?;

    println!(
        "Wrote {} line(s) from {} word(s) to {}",
        cues.len(),
        tokens.len(),
        output.display()
    );
    Ok(ExitCode::SUCCESS)
}
