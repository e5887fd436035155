//! Demucs stem separator.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;

use super::error::{ToolError, ToolResult};
use super::process;
use super::{ChunkStems, Separator};
use crate::logging::JobLogger;
use crate::models::{Backend, Stem};

fn progress_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)%\|").ok()).as_ref()
}

/// Turns Demucs progress bars into a percent over all chunks.
///
/// Demucs prints one bar per input file and a bar never goes back, so any
/// drop in percent means the next chunk started.
#[derive(Debug, Clone)]
pub struct DemucsProgress {
    total_chunks: usize,
    chunks_done: usize,
    last_percent: u32,
}

impl DemucsProgress {
    pub fn new(total_chunks: usize) -> Self {
        Self {
            total_chunks: total_chunks.max(1),
            chunks_done: 0,
            last_percent: 0,
        }
    }

    /// Feed one stderr line; returns overall percent when the line is a bar.
    pub fn update(&mut self, line: &str) -> Option<u32> {
        let caps = progress_regex()?.captures(line)?;
        let percent: u32 = caps[1].parse().ok()?;
        let percent = percent.min(100);

        if percent < self.last_percent {
            self.chunks_done = (self.chunks_done + 1).min(self.total_chunks);
        }
        self.last_percent = percent;

        let done = self.chunks_done as f64 + f64::from(percent) / 100.0;
        let overall = (done / self.total_chunks as f64 * 100.0).round();
        Some((overall as u32).min(100))
    }

    /// Current chunk, 1-based.
    pub fn current_chunk(&self) -> usize {
        (self.chunks_done + 1).min(self.total_chunks)
    }
}

/// Separator that runs `python -m demucs` over all chunks in one process.
#[derive(Debug, Clone)]
pub struct DemucsSeparator {
    python: String,
    model: String,
}

impl DemucsSeparator {
    pub fn new(python: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            model: model.into(),
        }
    }

    fn command(&self, chunks: &[PathBuf], out_dir: &Path, backend: Backend) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.args(["-m", "demucs", "--out"])
            .arg(out_dir)
            .args(["--device", backend.as_arg(), "-n", self.model.as_str()])
            .args(chunks);
        cmd
    }

    /// Where Demucs writes `stem` for `chunk`.
    fn stem_path(&self, out_dir: &Path, chunk: &Path, stem: Stem) -> Option<PathBuf> {
        let chunk_name = chunk.file_stem()?;
        Some(
            out_dir
                .join(&self.model)
                .join(chunk_name)
                .join(format!("{}.wav", stem.name())),
        )
    }
}

impl Separator for DemucsSeparator {
    fn separate(
        &self,
        chunks: &[PathBuf],
        out_dir: &Path,
        backend: Backend,
        logger: &JobLogger,
        progress: &mut dyn FnMut(u32),
    ) -> ToolResult<Vec<ChunkStems>> {
        let mut tracker = DemucsProgress::new(chunks.len());
        let mut cmd = self.command(chunks, out_dir, backend);

        process::run_streaming("demucs", &mut cmd, logger, &mut |line| {
            if let Some(percent) = tracker.update(line) {
                progress(percent);
            }
        })?;

        let mut results = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let mut stems = ChunkStems::new();
            for stem in Stem::ALL {
                let path = self.stem_path(out_dir, chunk, stem).ok_or_else(|| {
                    ToolError::output("demucs", format!("bad chunk path {}", chunk.display()))
                })?;
                if path.exists() {
                    stems.insert(stem, path);
                }
            }
            if stems.is_empty() {
                return Err(ToolError::output(
                    "demucs",
                    format!("no stems written for {}", chunk.display()),
                ));
            }
            results.push(stems);
        }
        progress(100);
        Ok(results)
    }
}
