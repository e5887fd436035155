//! Karaoke subtitle synthesis.
//!
//! Turns word-level tokens into a styled cue timeline and writes it as an
//! ASS file with per-word `{\k}` timing.
//!
//! # Example
//!
//! ```
//! use kmp_core::models::{SubtitleStyle, WordToken};
//! use kmp_core::subtitles::{synthesize, SynthesisOptions};
//!
//! let tokens = vec![
//!     WordToken::new("la", 0.0, 0.3, 0),
//!     WordToken::new("la", 0.3, 0.6, 1),
//! ];
//! let cues = synthesize(&tokens, &SubtitleStyle::default(), &SynthesisOptions::default()).unwrap();
//! assert_eq!(cues.len(), 1);
//! ```

mod synth;
mod types;
pub mod writers;

use std::fs;
use std::path::Path;

pub use synth::{group_lines, repair_overlaps, synthesize};
pub use types::{SubtitleCue, SynthesisOptions, WordHighlight, EPSILON};

use crate::error::{StageError, StageResult};
use crate::models::SubtitleStyle;

/// Write cues to an `.ass` file.
pub fn write_ass_file(
    path: &Path,
    cues: &[SubtitleCue],
    style: &SubtitleStyle,
    title: Option<&str>,
) -> StageResult<()> {
    let resolved = style.resolve()?;
    let content = writers::write_ass(cues, &resolved, title);
    fs::write(path, content).map_err(|e| StageError::io("writing subtitle file", e))?;
    tracing::debug!(path = %path.display(), cues = cues.len(), "Wrote karaoke subtitles");
    Ok(())
}
