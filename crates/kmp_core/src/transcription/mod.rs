//! Transcription stage.
//!
//! Runs the transcriber with the same device fallback as separation, cleans
//! up its word list and maps the timestamps onto the output timeline.

use std::path::Path;

use crate::device::{run_with_fallback, DeviceContext};
use crate::error::{StageError, StageResult};
use crate::logging::JobLogger;
use crate::models::{ModelSize, WordToken};
use crate::tools::{RawWord, ToolError, Transcriber};

/// Shortest duration given to a word reported with no length.
pub const MIN_WORD_DURATION: f64 = 0.02;

/// Transcribe `audio` into ordered word tokens.
///
/// `tempo_factor` is the tempo applied to the output audio; timestamps are
/// divided by it. An empty result is an error, not an empty transcript.
#[allow(clippy::too_many_arguments)]
pub fn transcribe(
    transcriber: &dyn Transcriber,
    audio: &Path,
    model: ModelSize,
    device: DeviceContext,
    work_dir: &Path,
    tempo_factor: f64,
    logger: &JobLogger,
    on_fallback: impl FnOnce(&ToolError),
) -> StageResult<Vec<WordToken>> {
    let raw = run_with_fallback(
        device,
        |backend| {
            logger.info(&format!(
                "Transcribing with '{}' model on {}",
                model.name(),
                backend
            ));
            transcriber.transcribe(audio, model, backend, work_dir, logger)
        },
        on_fallback,
    )
    .map_err(|e| StageError::transcription(e.to_string()))?;

    let reported = raw.len();
    let tokens = scale_to_tempo(sanitize_words(raw), tempo_factor);
    if tokens.is_empty() {
        return Err(StageError::transcription(format!(
            "no usable words in transcript ({} reported)",
            reported
        )));
    }

    logger.info(&format!("Transcribed {} word(s)", tokens.len()));
    Ok(tokens)
}

/// Clean up raw transcriber words.
///
/// Blank words and words with non-finite times are dropped, text is trimmed,
/// negative starts become 0 and zero-length words get
/// [`MIN_WORD_DURATION`]. Indices are assigned afterwards.
pub fn sanitize_words(raw: Vec<RawWord>) -> Vec<WordToken> {
    raw.into_iter()
        .filter(|w| w.start.is_finite() && w.end.is_finite())
        .filter_map(|w| {
            let text = w.text.trim();
            if text.is_empty() {
                return None;
            }
            let start = w.start.max(0.0);
            let end = if w.end <= start {
                start + MIN_WORD_DURATION
            } else {
                w.end
            };
            Some((text.to_string(), start, end, w.segment))
        })
        .enumerate()
        .map(|(index, (text, start, end, segment))| {
            WordToken::new(text, start, end, index).with_segment(segment)
        })
        .collect()
}

/// Map timestamps from source time to output time.
pub fn scale_to_tempo(tokens: Vec<WordToken>, tempo_factor: f64) -> Vec<WordToken> {
    if tempo_factor == 1.0 || !tempo_factor.is_finite() || tempo_factor <= 0.0 {
        return tokens;
    }
    tokens
        .into_iter()
        .map(|mut t| {
            t.start /= tempo_factor;
            t.end /= tempo_factor;
            t
        })
        .collect()
}
