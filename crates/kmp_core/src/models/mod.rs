//! Data models.
//!
//! This module contains the core data structures used throughout the crate:
//! - Enums for stems, model sizes, export modes, backends, job status
//! - Stem mix gains and the audio effect chain
//! - Subtitle style and word tokens
//! - Job submission records (request, validated config)

mod effects;
mod enums;
mod job;
mod stems;
mod style;
mod tokens;

pub use effects::{EffectChain, MAX_PITCH_SEMITONES, MAX_TEMPO, MIN_TEMPO};
pub use enums::{
    AudioFormat, Backend, DevicePreference, ExportMode, JobStatus, ModelSize, Stem,
};
pub use job::{JobConfig, JobRequest};
pub use stems::StemMix;
pub use style::{AssColor, ResolvedStyle, SubtitleStyle};
pub use tokens::WordToken;
