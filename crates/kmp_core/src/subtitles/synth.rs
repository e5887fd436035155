//! Word tokens to karaoke cues.
//!
//! Three passes:
//! 1. Repair overlaps (clamp each word's end before the next word's start)
//! 2. Group words into lines
//! 3. Compute display and per-word highlight windows
//!
//! All times are seconds.

use std::ops::Range;

use super::types::{SubtitleCue, SynthesisOptions, WordHighlight, EPSILON};
use crate::error::{StageError, StageResult};
use crate::models::{SubtitleStyle, WordToken};

/// Build the karaoke cue timeline for a token sequence.
pub fn synthesize(
    tokens: &[WordToken],
    style: &SubtitleStyle,
    options: &SynthesisOptions,
) -> StageResult<Vec<SubtitleCue>> {
    let resolved = style.resolve()?;
    let tokens = repair_overlaps(tokens)?;
    let lines = group_lines(&tokens, options);

    let mut cues = Vec::with_capacity(lines.len());
    let mut prev_end = 0.0_f64;

    for (i, range) in lines.iter().enumerate() {
        let words = &tokens[range.clone()];
        let (first, last) = match (words.first(), words.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => continue,
        };

        let display_start = (first.start - options.pre_roll).max(0.0).max(prev_end);
        let next_start = lines
            .get(i + 1)
            .map(|next| (tokens[next.start].start - options.pre_roll).max(0.0))
            .unwrap_or(f64::INFINITY);

        let mut display_end = (last.end + options.trailing_hold).min(next_start);
        if display_end <= display_start {
            display_end = last.end;
        }

        let highlights = highlight_windows(words, display_start, display_end, options.pre_roll);
        let text = words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        cues.push(SubtitleCue {
            text,
            display_start,
            display_end,
            words: highlights,
            style: resolved.clone(),
        });
        prev_end = display_end;
    }

    tracing::debug!(
        words = tokens.len(),
        lines = cues.len(),
        "Synthesized karaoke timeline"
    );
    Ok(cues)
}

/// Clamp overlapping word ends; never reorders.
///
/// Fails on an empty sequence, negative or non-finite times, start times
/// that go backwards, or a word left with no duration.
pub fn repair_overlaps(tokens: &[WordToken]) -> StageResult<Vec<WordToken>> {
    if tokens.is_empty() {
        return Err(StageError::synthesis("token sequence is empty"));
    }

    for pair in tokens.windows(2) {
        if pair[1].start < pair[0].start {
            return Err(StageError::synthesis(format!(
                "word {} ('{}') starts at {:.3}s, before word {} at {:.3}s",
                pair[1].index, pair[1].text, pair[1].start, pair[0].index, pair[0].start
            )));
        }
    }

    let mut repaired = tokens.to_vec();
    for i in 0..repaired.len() {
        let token = &repaired[i];
        if !token.start.is_finite() || !token.end.is_finite() {
            return Err(StageError::synthesis(format!(
                "word {} has a non-finite timestamp",
                token.index
            )));
        }
        if token.start < 0.0 {
            return Err(StageError::synthesis(format!(
                "word {} has negative start {:.3}s",
                token.index, token.start
            )));
        }

        if let Some(next_start) = repaired.get(i + 1).map(|next| next.start) {
            if repaired[i].end > next_start {
                repaired[i].end = next_start - EPSILON;
            }
        }

        let token = &repaired[i];
        if token.end <= token.start {
            return Err(StageError::synthesis(format!(
                "word {} ('{}') has no duration after overlap repair ({:.3}s..{:.3}s)",
                token.index, token.text, token.start, token.end
            )));
        }
    }

    Ok(repaired)
}

/// Partition tokens into contiguous lines.
pub fn group_lines(tokens: &[WordToken], options: &SynthesisOptions) -> Vec<Range<usize>> {
    let mut lines = Vec::new();
    let mut line_start = 0;

    for (i, token) in tokens.iter().enumerate().skip(1) {
        let first = &tokens[line_start];
        let count = i - line_start;

        let segment_break = options.respect_segments && token.segment != first.segment;
        let too_many = count >= options.max_words_per_line;
        let too_long = token.end - first.start > options.max_line_duration;

        if segment_break || too_many || too_long {
            lines.push(line_start..i);
            line_start = i;
        }
    }

    if line_start < tokens.len() {
        lines.push(line_start..tokens.len());
    }
    lines
}

fn highlight_windows(
    words: &[WordToken],
    display_start: f64,
    display_end: f64,
    pre_roll: f64,
) -> Vec<WordHighlight> {
    let mut prev_start = display_start;
    let mut prev_end = display_start;

    words
        .iter()
        .map(|word| {
            let start = (word.start - pre_roll)
                .clamp(display_start, display_end)
                .max(prev_start);
            let end = word.end.max(start).max(prev_end).min(display_end);
            prev_start = start;
            prev_end = end;

            WordHighlight {
                word_index: word.index,
                text: word.text.clone(),
                start,
                end,
            }
        })
        .collect()
}
