//! ASS karaoke writer.
//!
//! # Timing Precision
//!
//! ASS uses centisecond timing (H:MM:SS.cc). Every cue boundary and every
//! highlight start is rounded to centiseconds first; the `{\kNN}` durations
//! are differences of those rounded boundaries, so they always sum to the
//! line's written display duration.

use crate::models::ResolvedStyle;
use crate::subtitles::types::SubtitleCue;

/// Script resolution the style sizes refer to.
pub const PLAY_RES_X: u32 = 1280;
pub const PLAY_RES_Y: u32 = 720;

/// Name of the single style definition.
pub const STYLE_NAME: &str = "Karaoke";

/// Render cues to ASS file content.
///
/// `style` is the track style; `title` goes to `[Script Info]`.
pub fn write_ass(cues: &[SubtitleCue], style: &ResolvedStyle, title: Option<&str>) -> String {
    let mut output = String::new();

    output.push_str("[Script Info]\n");
    if let Some(title) = title {
        output.push_str(&format!("Title: {}\n", title));
    }
    output.push_str("ScriptType: v4.00+\n");
    output.push_str(&format!("PlayResX: {}\n", PLAY_RES_X));
    output.push_str(&format!("PlayResY: {}\n", PLAY_RES_Y));
    output.push_str("WrapStyle: 0\n");
    output.push_str("ScaledBorderAndShadow: yes\n");
    output.push('\n');

    output.push_str("[V4+ Styles]\n");
    output.push_str(
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, \
         BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
         BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n",
    );
    output.push_str(&format_style_line(style));
    output.push('\n');

    output.push_str("[Events]\n");
    output.push_str(
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n",
    );
    for cue in cues {
        output.push_str(&format_dialogue_line(cue));
        output.push('\n');
    }

    output
}

/// Style line; the highlight color is primary since `\k` switches
/// from secondary to primary.
fn format_style_line(style: &ResolvedStyle) -> String {
    format!(
        "Style: {},{},{},{},{},{},{},-1,0,0,0,100,100,0,0,1,2,2,2,10,10,20,1\n",
        STYLE_NAME,
        style.font,
        style.size,
        style.highlight.to_ass_string(),
        style.upcoming.to_ass_string(),
        style.outline.to_ass_string(),
        style.shadow.to_ass_string(),
    )
}

fn format_dialogue_line(cue: &SubtitleCue) -> String {
    let start_cs = to_centis(cue.display_start);
    let end_cs = to_centis(cue.display_end).max(start_cs);

    format!(
        "Dialogue: 0,{},{},{},,0,0,0,,{}",
        format_ass_time(start_cs),
        format_ass_time(end_cs),
        STYLE_NAME,
        karaoke_text(cue, start_cs, end_cs)
    )
}

/// Text with inline `{\kNN}` tags.
pub fn karaoke_text(cue: &SubtitleCue, start_cs: u64, end_cs: u64) -> String {
    let boundaries: Vec<u64> = cue
        .words
        .iter()
        .map(|w| to_centis(w.start).clamp(start_cs, end_cs))
        .collect();

    let mut text = String::new();
    if let Some(&first) = boundaries.first() {
        if first > start_cs {
            text.push_str(&format!("{{\\k{}}}", first - start_cs));
        }
    }

    for (i, word) in cue.words.iter().enumerate() {
        let from = boundaries[i];
        let to = boundaries.get(i + 1).copied().unwrap_or(end_cs).max(from);
        if i > 0 {
            text.push(' ');
        }
        text.push_str(&format!("{{\\k{}}}{}", to - from, escape_text(&word.text)));
    }
    text
}

/// Seconds to whole centiseconds (round half up, never negative).
pub fn to_centis(secs: f64) -> u64 {
    (secs.max(0.0) * 100.0).round() as u64
}

/// Format centiseconds as ASS timestamp (H:MM:SS.cc).
pub fn format_ass_time(centis: u64) -> String {
    let cs = centis % 100;
    let total_secs = centis / 100;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;

    format!("{}:{:02}:{:02}.{:02}", hours, mins, secs, cs)
}

/// Keep word text from being read as override tags.
fn escape_text(text: &str) -> String {
    text.replace('{', "(")
        .replace('}', ")")
        .replace('\\', "/")
        .replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SubtitleStyle, WordToken};
    use crate::subtitles::{synthesize, SynthesisOptions};

    fn k_values(text: &str) -> Vec<u64> {
        text.split("{\\k")
            .skip(1)
            .filter_map(|part| part.split('}').next())
            .filter_map(|n| n.parse().ok())
            .collect()
    }

    #[test]
    fn test_format_ass_time() {
        assert_eq!(format_ass_time(0), "0:00:00.00");
        assert_eq!(format_ass_time(150), "0:00:01.50");
        assert_eq!(format_ass_time(6_000), "0:01:00.00");
        assert_eq!(format_ass_time(360_000), "1:00:00.00");
        assert_eq!(format_ass_time(366_199), "1:01:01.99");
    }

    #[test]
    fn scenario_line_renders_tags() {
        let tokens = vec![
            WordToken::new("la", 0.00, 0.30, 0),
            WordToken::new("la", 0.30, 0.60, 1),
        ];
        let style = SubtitleStyle::default();
        let cues =
            synthesize(&tokens, &style, &SynthesisOptions::default().with_pre_roll(0.10)).unwrap();
        let ass = write_ass(&cues, &style.resolve().unwrap(), Some("Song"));

        // Display 0.00..1.10; highlights start at 0.00 and 0.20
        assert!(ass.contains("Dialogue: 0,0:00:00.00,0:00:01.10,Karaoke,,0,0,0,,{\\k20}la {\\k90}la"));
        assert!(ass.contains("Title: Song"));
        assert!(ass.contains("PlayResX: 1280"));
    }

    #[test]
    fn leading_gap_gets_empty_syllable() {
        let tokens = vec![
            WordToken::new("hello", 2.0, 2.4, 0),
            WordToken::new("world", 2.5, 3.0, 1),
        ];
        let style = SubtitleStyle::default();
        let options = SynthesisOptions::default();
        let cues = synthesize(&tokens, &style, &options).unwrap();

        // Line shown from 1.00s, first highlight at 1.50s
        let cue = &cues[0];
        let text = karaoke_text(cue, 100, to_centis(cue.display_end));
        assert!(text.starts_with("{\\k50}{\\k50}hello"));
    }

    #[test]
    fn tags_sum_to_display_duration() {
        let tokens: Vec<WordToken> = [
            ("we", 0.713, 0.981),
            ("all", 0.981, 1.337),
            ("live", 1.402, 1.777),
            ("in", 1.801, 1.912),
            ("a", 1.95, 2.01),
            ("yellow", 2.104, 2.871),
            ("submarine", 2.9, 3.999),
        ]
        .iter()
        .enumerate()
        .map(|(i, (t, s, e))| WordToken::new(*t, *s, *e, i))
        .collect();
        let style = SubtitleStyle::default();
        let options = SynthesisOptions {
            max_words_per_line: 3,
            ..SynthesisOptions::default()
        };
        let cues = synthesize(&tokens, &style, &options).unwrap();
        assert_eq!(cues.len(), 3);

        for cue in &cues {
            let start = to_centis(cue.display_start);
            let end = to_centis(cue.display_end);
            let text = karaoke_text(cue, start, end);
            let total: u64 = k_values(&text).iter().sum();
            assert_eq!(total, end - start, "line '{}'", text);
        }
    }

    #[test]
    fn style_line_uses_highlight_as_primary() {
        let style = SubtitleStyle::default().resolve().unwrap();
        let line = format_style_line(&style);
        assert_eq!(
            line,
            "Style: Karaoke,Arial,30,&H00B469FF,&H00FFFFFF,&H00000000,&H00000000,-1,0,0,0,100,100,0,0,1,2,2,2,10,10,20,1\n"
        );
    }

    #[test]
    fn escapes_override_characters() {
        assert_eq!(escape_text("{a}\\b"), "(a)/b");
    }
}
