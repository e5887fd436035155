//! Transcriber driven by a command template.

use std::fs;
use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use super::error::{ToolError, ToolResult};
use super::process;
use super::Transcriber;
use crate::logging::JobLogger;
use crate::models::{Backend, ModelSize};

/// A word as reported by the transcriber, before sanitization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawWord {
    pub text: String,
    pub start: f64,
    pub end: f64,
    /// Index of the segment the word belongs to.
    pub segment: usize,
}

#[derive(Debug, Deserialize)]
struct TranscriptFile {
    #[serde(default)]
    segments: Vec<TranscriptSegment>,
}

#[derive(Debug, Deserialize)]
struct TranscriptSegment {
    #[serde(default)]
    words: Vec<TranscriptWord>,
}

#[derive(Debug, Deserialize)]
struct TranscriptWord {
    #[serde(alias = "text")]
    word: String,
    start: f64,
    end: f64,
}

/// Parse the `segments[].words[]` JSON layout written by whisper-style tools.
pub fn parse_transcript_json(json: &str) -> ToolResult<Vec<RawWord>> {
    let file: TranscriptFile = serde_json::from_str(json)
        .map_err(|e| ToolError::output("transcriber", format!("invalid transcript JSON: {}", e)))?;

    Ok(file
        .segments
        .into_iter()
        .enumerate()
        .flat_map(|(segment, seg)| {
            seg.words.into_iter().map(move |w| RawWord {
                text: w.word,
                start: w.start,
                end: w.end,
                segment,
            })
        })
        .collect())
}

/// Runs a configured command line and reads its JSON output.
///
/// The template may use `{input}`, `{model}`, `{device}` and `{output}`.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    template: String,
}

impl CommandTranscriber {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    fn command(
        &self,
        audio: &Path,
        model: ModelSize,
        backend: Backend,
        output: &Path,
    ) -> ToolResult<Command> {
        let input = audio.to_string_lossy();
        let output = output.to_string_lossy();
        let words: Vec<String> = process::split_command_line(&self.template)
            .into_iter()
            .map(|word| {
                word.replace("{input}", &input)
                    .replace("{model}", model.name())
                    .replace("{device}", backend.as_arg())
                    .replace("{output}", &output)
            })
            .collect();

        let (program, args) = words
            .split_first()
            .ok_or_else(|| ToolError::output("transcriber", "empty command template"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        Ok(cmd)
    }
}

impl Transcriber for CommandTranscriber {
    fn transcribe(
        &self,
        audio: &Path,
        model: ModelSize,
        backend: Backend,
        work_dir: &Path,
        logger: &JobLogger,
    ) -> ToolResult<Vec<RawWord>> {
        let output = work_dir.join("transcript.json");
        let mut cmd = self.command(audio, model, backend, &output)?;
        process::run("transcriber", &mut cmd, logger)?;

        let json = fs::read_to_string(&output)
            .map_err(|e| ToolError::io("reading transcript", e))?;
        parse_transcript_json(&json)
    }
}
