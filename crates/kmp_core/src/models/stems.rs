//! Stem mix gains.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::enums::Stem;
use crate::error::{StageError, StageResult};

/// Per-stem gain factors.
///
/// Every recognized stem always has a gain; unspecified stems default to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemMix {
    gains: BTreeMap<Stem, f32>,
}

impl Default for StemMix {
    fn default() -> Self {
        Self {
            gains: Stem::ALL.iter().map(|s| (*s, 1.0)).collect(),
        }
    }
}

impl StemMix {
    /// Build a mix from user-supplied stem names.
    ///
    /// Unknown names are a `StemMixError`; negative or non-finite gains are an
    /// `InvalidParameterError`.
    pub fn from_names(raw: &HashMap<String, f32>) -> StageResult<Self> {
        let mut mix = Self::default();
        // Sorted for deterministic error messages
        let mut entries: Vec<_> = raw.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        for (name, gain) in entries {
            let stem: Stem = name.parse().map_err(|_| {
                StageError::stem_mix(format!(
                    "unrecognized stem '{}' (expected one of vocals, drums, bass, other)",
                    name
                ))
            })?;
            mix.set(stem, *gain)?;
        }
        Ok(mix)
    }

    /// Set one stem's gain.
    pub fn set(&mut self, stem: Stem, gain: f32) -> StageResult<()> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(StageError::invalid_parameter(format!(
                "gain for {} must be a finite value >= 0, got {}",
                stem, gain
            )));
        }
        self.gains.insert(stem, gain);
        Ok(())
    }

    pub fn gain(&self, stem: Stem) -> f32 {
        self.gains.get(&stem).copied().unwrap_or(1.0)
    }

    /// Stems with a non-zero gain.
    pub fn audible(&self) -> impl Iterator<Item = (Stem, f32)> + '_ {
        self.gains
            .iter()
            .filter(|(_, g)| **g > 0.0)
            .map(|(s, g)| (*s, *g))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stem, f32)> + '_ {
        self.gains.iter().map(|(s, g)| (*s, *g))
    }

    /// Whether every stem plays at unity gain (plain re-assembly).
    pub fn is_unity(&self) -> bool {
        self.gains.values().all(|g| (*g - 1.0).abs() < f32::EPSILON)
    }

    /// Short summary for artifact names, e.g. `v0d1b1o1` or `v0.5d1b1o1`.
    pub fn tag(&self) -> String {
        self.gains
            .iter()
            .map(|(stem, gain)| format!("{}{}", stem.code(), format_gain(*gain)))
            .collect()
    }
}

fn format_gain(gain: f32) -> String {
    if gain.fract() == 0.0 {
        format!("{}", gain as i64)
    } else {
        format!("{:.2}", gain)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}
