//! External tool errors.

use std::io;

use thiserror::Error;

/// Failure of an external collaborator (ffmpeg, yt-dlp, demucs, transcriber).
#[derive(Error, Debug)]
pub enum ToolError {
    /// The process could not be started.
    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// The process exited unsuccessfully.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    Failed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// The process succeeded but its output could not be used.
    #[error("Unusable output from {tool}: {message}")]
    Output { tool: String, message: String },

    /// File I/O around the tool invocation failed.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl ToolError {
    pub fn spawn(tool: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            tool: tool.into(),
            source,
        }
    }

    pub fn failed(tool: impl Into<String>, exit_code: i32, message: impl Into<String>) -> Self {
        Self::Failed {
            tool: tool.into(),
            exit_code,
            message: message.into(),
        }
    }

    pub fn output(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Output {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

/// Result type for tool invocations.
pub type ToolResult<T> = Result<T, ToolError>;
