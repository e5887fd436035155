//! Running external commands.
//!
//! Output lines go to the job logger's tail buffer, so a failure can show
//! the last lines the tool printed.

use std::io::{BufReader, Read};
use std::process::{Command, Output, Stdio};

use super::error::{ToolError, ToolResult};
use crate::logging::JobLogger;

/// Lines of stderr kept in a failure message.
const FAILURE_TAIL_LINES: usize = 8;

/// Run a command to completion, capturing its output.
pub fn run(tool: &str, cmd: &mut Command, logger: &JobLogger) -> ToolResult<Output> {
    logger.command(&describe(cmd));

    let output = cmd.output().map_err(|e| ToolError::spawn(tool, e))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        logger.output_line(line, false);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines() {
        logger.output_line(line, true);
    }

    if !output.status.success() {
        logger.show_tail(tool);
        return Err(ToolError::failed(
            tool,
            output.status.code().unwrap_or(-1),
            tail(&stderr, FAILURE_TAIL_LINES),
        ));
    }

    Ok(output)
}

/// Run a command, feeding each stderr line to `on_line` as it arrives.
///
/// Lines are split on `\n` and `\r`, so carriage-return progress bars are
/// seen as they redraw. Stdout is discarded.
pub fn run_streaming(
    tool: &str,
    cmd: &mut Command,
    logger: &JobLogger,
    on_line: &mut dyn FnMut(&str),
) -> ToolResult<()> {
    logger.command(&describe(cmd));

    cmd.stdout(Stdio::null()).stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| ToolError::spawn(tool, e))?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ToolError::output(tool, "stderr was not captured"))?;

    let mut recent: Vec<String> = Vec::new();
    let mut reader = BufReader::new(stderr);
    let mut chunk = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = reader
            .read(&mut chunk)
            .map_err(|e| ToolError::io(format!("reading {} output", tool), e))?;
        if n == 0 {
            break;
        }
        for &byte in &chunk[..n] {
            if byte == b'\n' || byte == b'\r' {
                flush_line(&mut pending, logger, &mut recent, on_line);
            } else {
                pending.push(byte);
            }
        }
    }
    flush_line(&mut pending, logger, &mut recent, on_line);

    let status = child
        .wait()
        .map_err(|e| ToolError::io(format!("waiting for {}", tool), e))?;

    if !status.success() {
        logger.show_tail(tool);
        return Err(ToolError::failed(
            tool,
            status.code().unwrap_or(-1),
            recent.join("\n"),
        ));
    }
    Ok(())
}

fn flush_line(
    pending: &mut Vec<u8>,
    logger: &JobLogger,
    recent: &mut Vec<String>,
    on_line: &mut dyn FnMut(&str),
) {
    if pending.is_empty() {
        return;
    }
    let line = String::from_utf8_lossy(pending).trim().to_string();
    pending.clear();
    if line.is_empty() {
        return;
    }

    on_line(&line);
    logger.output_line(&line, true);
    if recent.len() >= FAILURE_TAIL_LINES {
        recent.remove(0);
    }
    recent.push(line);
}

/// Printable form of a command line.
pub fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
    for arg in cmd.get_args() {
        let arg = arg.to_string_lossy();
        if arg.contains(' ') {
            parts.push(format!("\"{}\"", arg));
        } else {
            parts.push(arg.to_string());
        }
    }
    parts.join(" ")
}

/// Split a command template into words.
///
/// Whitespace separates words; single or double quotes group them.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// Last `n` non-empty lines of `text`.
fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
