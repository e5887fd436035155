//! Audio effects stage.
//!
//! Pitch, tempo and loudness run as one ordered filter chain. Output goes to
//! a `.partial` file that is renamed into place only when the toolkit
//! succeeds, so a failed run leaves nothing behind.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StageError, StageResult};
use crate::logging::JobLogger;
use crate::models::EffectChain;
use crate::tools::MediaToolkit;

/// Apply `chain` to `input`, writing `output`.
///
/// The chain is validated before the toolkit is touched. An identity chain
/// copies the input byte for byte.
pub fn apply_effects(
    media: &dyn MediaToolkit,
    input: &Path,
    output: &Path,
    chain: &EffectChain,
    loudness_target_lufs: f64,
    logger: &JobLogger,
) -> StageResult<PathBuf> {
    chain.validate()?;

    if chain.is_identity() {
        logger.info("No effects requested, passing audio through");
        fs::copy(input, output).map_err(|e| StageError::io("copying unprocessed audio", e))?;
        return Ok(output.to_path_buf());
    }

    let filters = chain.audio_filters(loudness_target_lufs);
    logger.info(&format!("Applying effects: {}", filters.join(" -> ")));

    let partial = partial_path(output);
    if let Err(e) = media.apply_audio_filters(input, &partial, &filters, logger) {
        discard(&partial);
        return Err(StageError::effect(e.to_string()));
    }
    if !partial.exists() {
        return Err(StageError::effect("toolkit reported success but wrote no audio"));
    }

    if let Err(e) = fs::rename(&partial, output) {
        discard(&partial);
        return Err(StageError::io("finalizing processed audio", e));
    }
    Ok(output.to_path_buf())
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn discard(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}
