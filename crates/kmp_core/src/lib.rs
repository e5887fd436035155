//! KMP Core - karaoke media processing pipeline
//!
//! Turns a song (URL or local file) into a karaoke artifact: stems are
//! separated and remixed, pitch/tempo/loudness effects applied, vocals
//! transcribed, and word-timed subtitles burned into the video.
//!
//! This crate contains all business logic with no UI dependencies; the
//! `kmp` binary is a thin command-line front end.

pub mod config;
pub mod device;
pub mod effects;
pub mod error;
pub mod events;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod mux;
pub mod orchestrator;
pub mod separation;
pub mod source;
pub mod subtitles;
pub mod tools;
pub mod transcription;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
