//! Source separation.
//!
//! Long audio is cut into fixed-length chunks, each chunk is separated into
//! stems, and the stems are stitched back together. [`mix_stems`] then
//! combines them with the job's gains.

mod mix;

use std::fs;
use std::path::{Path, PathBuf};

pub use mix::{mix_stems, MixSummary, StemPaths};

use crate::device::{run_with_fallback, DeviceContext};
use crate::error::{StageError, StageResult};
use crate::logging::JobLogger;
use crate::models::{Backend, Stem};
use crate::tools::{ChunkStems, MediaToolkit, Separator, ToolError};

/// Number of chunks needed to cover `duration_secs`; at least one.
pub fn chunk_count(duration_secs: f64, chunk_secs: u32) -> usize {
    if chunk_secs == 0 || !duration_secs.is_finite() || duration_secs <= 0.0 {
        return 1;
    }
    ((duration_secs / f64::from(chunk_secs)).ceil() as usize).max(1)
}

/// Cut `input` into `chunk_NNN.wav` files under `dir`.
pub fn split_into_chunks(
    media: &dyn MediaToolkit,
    input: &Path,
    duration_secs: f64,
    chunk_secs: u32,
    dir: &Path,
    logger: &JobLogger,
) -> StageResult<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| StageError::io("creating chunk directory", e))?;

    let count = chunk_count(duration_secs, chunk_secs);
    logger.info(&format!("Splitting audio into {} chunk(s)", count));

    let mut chunks = Vec::with_capacity(count);
    for i in 0..count {
        let path = dir.join(format!("chunk_{:03}.wav", i));
        if count == 1 {
            fs::copy(input, &path).map_err(|e| StageError::io("copying single chunk", e))?;
        } else {
            let start = i as f64 * f64::from(chunk_secs);
            media
                .split_segment(input, &path, start, f64::from(chunk_secs), logger)
                .map_err(|e| StageError::separation(format!("splitting chunk {}: {}", i, e)))?;
        }
        chunks.push(path);
    }
    Ok(chunks)
}

/// Separate `chunks` on the selected backend, falling back once to the
/// general processor, and join each stem across chunks into `out_dir`.
///
/// `progress` gets stage-local percent and restarts at 0 on fallback.
/// `on_fallback` is called with the accelerator error before the retry.
#[allow(clippy::too_many_arguments)]
pub fn separate(
    separator: &dyn Separator,
    media: &dyn MediaToolkit,
    chunks: &[PathBuf],
    device: DeviceContext,
    out_dir: &Path,
    logger: &JobLogger,
    progress: &mut dyn FnMut(u32),
    on_fallback: impl FnOnce(&ToolError),
) -> StageResult<StemPaths> {
    if chunks.is_empty() {
        return Err(StageError::separation("no audio chunks to separate"));
    }

    let raw_dir = out_dir.join("raw");
    fs::create_dir_all(&raw_dir).map_err(|e| StageError::io("creating separation directory", e))?;

    let per_chunk = run_with_fallback(
        device,
        |backend: Backend| {
            progress(0);
            logger.info(&format!("Separating {} chunk(s) on {}", chunks.len(), backend));
            separator.separate(chunks, &raw_dir, backend, logger, &mut *progress)
        },
        on_fallback,
    )
    .map_err(|e| StageError::separation(e.to_string()))?;

    join_chunks(media, &per_chunk, out_dir, logger)
}

/// Concatenate each stem over all chunks.
fn join_chunks(
    media: &dyn MediaToolkit,
    per_chunk: &[ChunkStems],
    out_dir: &Path,
    logger: &JobLogger,
) -> StageResult<StemPaths> {
    let mut stems = StemPaths::new();

    for stem in Stem::ALL {
        let parts: Vec<PathBuf> = per_chunk
            .iter()
            .filter_map(|chunk| chunk.get(&stem).cloned())
            .collect();
        if parts.is_empty() {
            continue;
        }
        if parts.len() != per_chunk.len() {
            return Err(StageError::separation(format!(
                "{} stem missing for {} of {} chunk(s)",
                stem,
                per_chunk.len() - parts.len(),
                per_chunk.len()
            )));
        }

        let joined = out_dir.join(format!("{}.wav", stem));
        media
            .concat(&parts, &joined, logger)
            .map_err(|e| StageError::separation(format!("joining {} stem: {}", stem, e)))?;
        stems.insert(stem, joined);
    }

    if stems.is_empty() {
        return Err(StageError::separation("separator produced no stems"));
    }
    Ok(stems)
}
