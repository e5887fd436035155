//! Word-level transcription tokens.

use serde::{Deserialize, Serialize};

/// One transcribed word with its timing in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordToken {
    pub text: String,
    pub start: f64,
    pub end: f64,
    /// Position in the token sequence.
    pub index: usize,
    /// Transcriber segment the word belongs to, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<usize>,
}

impl WordToken {
    pub fn new(text: impl Into<String>, start: f64, end: f64, index: usize) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            index,
            segment: None,
        }
    }

    pub fn with_segment(mut self, segment: usize) -> Self {
        self.segment = Some(segment);
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}
