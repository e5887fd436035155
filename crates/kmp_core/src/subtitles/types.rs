//! Karaoke cue types and synthesis options.

use serde::{Deserialize, Serialize};

use crate::config::SubtitleSettings;
use crate::models::ResolvedStyle;

/// Gap left between a repaired word's end and the next word's start (seconds).
pub const EPSILON: f64 = 0.001;

/// Line layout and timing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOptions {
    /// Seconds a line (and each word highlight) appears early.
    pub pre_roll: f64,
    /// Seconds a line stays after its last word ends.
    pub trailing_hold: f64,
    pub max_words_per_line: usize,
    pub max_line_duration: f64,
    /// Break lines where the transcriber's segment changes.
    pub respect_segments: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self::from(&SubtitleSettings::default())
    }
}

impl From<&SubtitleSettings> for SynthesisOptions {
    fn from(settings: &SubtitleSettings) -> Self {
        Self {
            pre_roll: settings.pre_roll_secs.max(0.0),
            trailing_hold: settings.trailing_hold_secs.max(0.0),
            max_words_per_line: settings.max_words_per_line.max(1),
            max_line_duration: settings.max_line_duration_secs,
            respect_segments: settings.respect_segments,
        }
    }
}

impl SynthesisOptions {
    pub fn with_pre_roll(mut self, pre_roll: f64) -> Self {
        self.pre_roll = pre_roll.max(0.0);
        self
    }
}

/// Highlight window of one word inside a cue.
#[derive(Debug, Clone, PartialEq)]
pub struct WordHighlight {
    /// Sequence index of the source token.
    pub word_index: usize,
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// One displayed karaoke line.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    pub text: String,
    pub display_start: f64,
    pub display_end: f64,
    /// Words in line order; highlight windows never decrease.
    pub words: Vec<WordHighlight>,
    pub style: ResolvedStyle,
}

impl SubtitleCue {
    pub fn duration(&self) -> f64 {
        self.display_end - self.display_start
    }
}
