//! Stage error taxonomy.
//!
//! Every stage operation returns [`StageError`]. The pipeline wraps it with
//! job and step context (`PipelineError`), and the scheduler turns it into an
//! error event carrying the [`ErrorKind`].

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised by a pipeline stage.
#[derive(Error, Debug)]
pub enum StageError {
    /// Source is neither a well-formed URL nor a readable local path.
    #[error("Invalid source '{source_ref}': {message}")]
    InvalidSource { source_ref: String, message: String },

    /// Downloader failed after all retries.
    #[error("Download of '{url}' failed after {attempts} attempt(s): {message}")]
    Download {
        url: String,
        attempts: u32,
        message: String,
    },

    /// A job parameter is out of range or malformed.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Separation model failed (after device fallback).
    #[error("Separation failed: {0}")]
    Separation(String),

    /// Stem mix configuration or stem audio is unusable.
    #[error("Stem mix error: {0}")]
    StemMix(String),

    /// Media toolkit rejected the effect chain.
    #[error("Effect processing failed: {0}")]
    Effect(String),

    /// Transcriber produced no usable words.
    #[error("Transcription failed: {0}")]
    Transcription(String),

    /// Token sequence is structurally invalid.
    #[error("Subtitle synthesis failed: {0}")]
    SubtitleSynthesis(String),

    /// Final assembly or move into the output directory failed.
    #[error("Mux failed: {0}")]
    Mux(String),

    /// File I/O error.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl StageError {
    pub fn invalid_source(source_ref: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSource {
            source_ref: source_ref.into(),
            message: message.into(),
        }
    }

    pub fn download(url: impl Into<String>, attempts: u32, message: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            attempts,
            message: message.into(),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn separation(message: impl Into<String>) -> Self {
        Self::Separation(message.into())
    }

    pub fn stem_mix(message: impl Into<String>) -> Self {
        Self::StemMix(message.into())
    }

    pub fn effect(message: impl Into<String>) -> Self {
        Self::Effect(message.into())
    }

    pub fn transcription(message: impl Into<String>) -> Self {
        Self::Transcription(message.into())
    }

    pub fn synthesis(message: impl Into<String>) -> Self {
        Self::SubtitleSynthesis(message.into())
    }

    pub fn mux(message: impl Into<String>) -> Self {
        Self::Mux(message.into())
    }

    /// Create an I/O error with context.
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Channel name of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSource { .. } => ErrorKind::InvalidSource,
            Self::Download { .. } => ErrorKind::Download,
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::Separation(_) => ErrorKind::Separation,
            Self::StemMix(_) => ErrorKind::StemMix,
            Self::Effect(_) => ErrorKind::Effect,
            Self::Transcription(_) => ErrorKind::Transcription,
            Self::SubtitleSynthesis(_) => ErrorKind::SubtitleSynthesis,
            Self::Mux(_) => ErrorKind::Mux,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Error category reported on the error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "InvalidSourceError")]
    InvalidSource,
    #[serde(rename = "DownloadError")]
    Download,
    #[serde(rename = "InvalidParameterError")]
    InvalidParameter,
    #[serde(rename = "SeparationError")]
    Separation,
    #[serde(rename = "StemMixError")]
    StemMix,
    #[serde(rename = "EffectError")]
    Effect,
    #[serde(rename = "TranscriptionError")]
    Transcription,
    #[serde(rename = "SubtitleSynthesisError")]
    SubtitleSynthesis,
    #[serde(rename = "MuxError")]
    Mux,
    #[serde(rename = "IoError")]
    Io,
    /// Non-fatal: accelerator absent or unusable.
    #[serde(rename = "DeviceProbeWarning")]
    DeviceProbeWarning,
    /// Job setup (work directory, logger) failed.
    #[serde(rename = "SetupError")]
    Setup,
    #[serde(rename = "Cancelled")]
    Cancelled,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidSource => "InvalidSourceError",
            Self::Download => "DownloadError",
            Self::InvalidParameter => "InvalidParameterError",
            Self::Separation => "SeparationError",
            Self::StemMix => "StemMixError",
            Self::Effect => "EffectError",
            Self::Transcription => "TranscriptionError",
            Self::SubtitleSynthesis => "SubtitleSynthesisError",
            Self::Mux => "MuxError",
            Self::Io => "IoError",
            Self::DeviceProbeWarning => "DeviceProbeWarning",
            Self::Setup => "SetupError",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;
