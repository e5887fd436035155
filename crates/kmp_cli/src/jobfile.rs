//! Job files: a TOML `[[jobs]]` array of submissions.
//!
//! ```toml
//! [[jobs]]
//! source = "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
//! pitch_semitones = -2
//! stem_gains = { vocals = 0.0 }
//!
//! [[jobs]]
//! source = "songs/local.flac"
//! export_mode = "stems_only"
//! stems_to_export = ["vocals", "drums"]
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use kmp_core::models::JobRequest;
use kmp_core::source::{classify, SourceKind};

#[derive(Debug, Deserialize)]
pub struct JobFile {
    #[serde(default)]
    pub jobs: Vec<JobRequest>,
}

impl JobFile {
    /// Read a job file; relative paths inside it are taken from its folder.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading job file {}", path.display()))?;
        let mut file = Self::parse(&content)
            .with_context(|| format!("parsing job file {}", path.display()))?;
        if let Some(base) = path.parent() {
            file.resolve_relative(base);
        }
        Ok(file)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn resolve_relative(&mut self, base: &Path) {
        for job in &mut self.jobs {
            if let SourceKind::Path(path) = classify(&job.source) {
                if path.is_relative() && !job.source.trim().is_empty() {
                    job.source = base.join(path).to_string_lossy().to_string();
                }
            }
            if let Some(dir) = job.output_dir.as_mut() {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
        }
    }
}
