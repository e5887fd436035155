//! Audio effect chain.

use serde::{Deserialize, Serialize};

use crate::error::{StageError, StageResult};

/// Slowest accepted tempo factor.
pub const MIN_TEMPO: f64 = 0.5;
/// Fastest accepted tempo factor.
pub const MAX_TEMPO: f64 = 2.0;
/// Largest pitch shift in either direction, in semitones.
pub const MAX_PITCH_SEMITONES: f64 = 24.0;

/// Ordered effect parameters: pitch, then tempo, then normalize.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectChain {
    #[serde(default)]
    pub pitch_semitones: f64,
    #[serde(default = "default_tempo")]
    pub tempo_factor: f64,
    #[serde(default)]
    pub normalize: bool,
}

fn default_tempo() -> f64 {
    1.0
}

impl Default for EffectChain {
    fn default() -> Self {
        Self {
            pitch_semitones: 0.0,
            tempo_factor: 1.0,
            normalize: false,
        }
    }
}

impl EffectChain {
    pub fn new(pitch_semitones: f64, tempo_factor: f64, normalize: bool) -> Self {
        Self {
            pitch_semitones,
            tempo_factor,
            normalize,
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> StageResult<()> {
        if !self.tempo_factor.is_finite()
            || self.tempo_factor < MIN_TEMPO
            || self.tempo_factor > MAX_TEMPO
        {
            return Err(StageError::invalid_parameter(format!(
                "tempo factor {} outside [{}, {}]",
                self.tempo_factor, MIN_TEMPO, MAX_TEMPO
            )));
        }
        if !self.pitch_semitones.is_finite() || self.pitch_semitones.abs() > MAX_PITCH_SEMITONES {
            return Err(StageError::invalid_parameter(format!(
                "pitch shift {} semitones outside [-{}, {}]",
                self.pitch_semitones, MAX_PITCH_SEMITONES, MAX_PITCH_SEMITONES
            )));
        }
        Ok(())
    }

    pub fn has_pitch(&self) -> bool {
        self.pitch_semitones != 0.0
    }

    pub fn has_tempo(&self) -> bool {
        self.tempo_factor != 1.0
    }

    /// Whether applying the chain would leave the audio untouched.
    pub fn is_identity(&self) -> bool {
        !self.has_pitch() && !self.has_tempo() && !self.normalize
    }

    /// ffmpeg audio filters for the active sub-steps, in fixed order.
    pub fn audio_filters(&self, loudness_target_lufs: f64) -> Vec<String> {
        let mut filters = Vec::with_capacity(3);
        if self.has_pitch() {
            let ratio = 2f64.powf(self.pitch_semitones / 12.0);
            filters.push(format!("rubberband=pitch={:.6}", ratio));
        }
        if self.has_tempo() {
            filters.push(format!("atempo={}", self.tempo_factor));
        }
        if self.normalize {
            filters.push(format!(
                "loudnorm=I={}:TP=-1.5:LRA=11",
                loudness_target_lufs
            ));
        }
        filters
    }

    /// Short summary for artifact names.
    pub fn tag(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.has_pitch() {
            parts.push(format!("p{:+}", self.pitch_semitones));
        }
        if self.has_tempo() {
            parts.push(format!("t{}", self.tempo_factor));
        }
        if self.normalize {
            parts.push("n".to_string());
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(""))
        }
    }
}
