//! Final assembly of job artifacts.
//!
//! Every artifact is built inside the job's work directory and moved into
//! the output directory in one step once it is complete.

mod naming;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use naming::{artifact_name, artifact_tag, options_hash, stem_file_name, ArtifactKind};

use crate::error::{StageError, StageResult};
use crate::logging::JobLogger;
use crate::models::{AudioFormat, Stem};
use crate::separation::StemPaths;
use crate::tools::{MediaToolkit, VideoMux};

/// Inputs of [`mux`].
#[derive(Debug, Clone)]
pub struct MuxRequest<'a> {
    /// Video stream; `None` produces an audio-only artifact.
    pub video: Option<&'a Path>,
    /// Processed audio.
    pub audio: &'a Path,
    /// Rendered karaoke subtitles, burned into the picture.
    pub subtitles: Option<&'a Path>,
    /// Tempo applied to the audio; the picture is retimed to match.
    pub tempo: f64,
    pub audio_format: AudioFormat,
    pub work_dir: &'a Path,
    pub output_dir: &'a Path,
    /// Artifact file name inside `output_dir`.
    pub file_name: &'a str,
}

/// Build the artifact in the work directory and move it into place.
pub fn mux(
    media: &dyn MediaToolkit,
    request: &MuxRequest<'_>,
    logger: &JobLogger,
) -> StageResult<PathBuf> {
    let staged = request.work_dir.join(request.file_name);
    let dest = request.output_dir.join(request.file_name);

    let result = match request.video {
        Some(video) => {
            logger.info("Combining video and processed audio");
            if request.subtitles.is_some() {
                logger.info("Burning karaoke subtitles into the picture");
            }
            media.mux_video(
                &VideoMux {
                    video,
                    audio: request.audio,
                    subtitles: request.subtitles,
                    tempo: request.tempo,
                    output: &staged,
                },
                logger,
            )
        }
        None => {
            logger.info(&format!(
                "Encoding audio-only artifact ({})",
                request.audio_format.extension()
            ));
            media.encode_audio(request.audio, &staged, request.audio_format.codec(), logger)
        }
    };

    if let Err(e) = result {
        let _ = fs::remove_file(&staged);
        return Err(StageError::mux(e.to_string()));
    }
    if !staged.is_file() {
        return Err(StageError::mux("toolkit reported success but wrote no file"));
    }

    finalize(&staged, &dest)?;
    Ok(dest)
}

/// Encode the selected stems into `<dir_name>/` and move the directory into
/// the output directory.
#[allow(clippy::too_many_arguments)]
pub fn export_stems(
    media: &dyn MediaToolkit,
    stems: &StemPaths,
    selected: &[Stem],
    format: AudioFormat,
    title: &str,
    work_dir: &Path,
    output_dir: &Path,
    dir_name: &str,
    logger: &JobLogger,
) -> StageResult<PathBuf> {
    let staged = work_dir.join(dir_name);
    fs::create_dir_all(&staged).map_err(|e| StageError::io("creating stems directory", e))?;

    for stem in selected {
        let source = stems
            .get(stem)
            .ok_or_else(|| StageError::mux(format!("stem '{}' was not separated", stem)))?;
        let target = staged.join(stem_file_name(title, *stem, format));
        logger.info(&format!("Exporting stem: {}", stem));
        media
            .encode_audio(source, &target, format.codec(), logger)
            .map_err(|e| StageError::mux(format!("exporting {} stem: {}", stem, e)))?;
    }

    let dest = output_dir.join(dir_name);
    finalize(&staged, &dest)?;
    Ok(dest)
}

/// Move `staged` to `dest`, replacing what is there.
///
/// The artifact is first brought next to `dest` (a rename, or a copy when
/// the work directory is on another filesystem) and only then swapped in,
/// so `dest` never holds a partial artifact and the previous one is removed
/// last.
pub fn finalize(staged: &Path, dest: &Path) -> StageResult<()> {
    finalize_with(staged, dest, |from, to| fs::rename(from, to))
}

fn finalize_with(
    staged: &Path,
    dest: &Path,
    move_staged: impl Fn(&Path, &Path) -> io::Result<()>,
) -> StageResult<()> {
    let (parent, name) = match (dest.parent(), dest.file_name()) {
        (Some(parent), Some(name)) => (parent, name.to_string_lossy().to_string()),
        _ => {
            return Err(StageError::mux(format!(
                "invalid artifact path {}",
                dest.display()
            )))
        }
    };
    fs::create_dir_all(parent).map_err(|e| StageError::io("creating output directory", e))?;

    let incoming = parent.join(format!(".{}.partial", name));
    remove_existing(&incoming).map_err(|e| StageError::io("removing stale partial artifact", e))?;

    if let Err(rename_err) = move_staged(staged, &incoming) {
        tracing::debug!("Rename failed ({}), copying instead", rename_err);
        if let Err(e) = copy_recursive(staged, &incoming) {
            let _ = remove_existing(&incoming);
            return Err(StageError::mux(format!(
                "copying {} into {}: {}",
                staged.display(),
                parent.display(),
                e
            )));
        }
        remove_existing(staged).map_err(|e| StageError::io("removing staged artifact", e))?;
    }

    let previous = parent.join(format!(".{}.old", name));
    publish(&incoming, dest, &previous).map_err(|e| {
        let _ = remove_existing(&incoming);
        StageError::mux(format!("publishing {}: {}", dest.display(), e))
    })
}

/// Swap `incoming` into `dest`, both in the same directory.
///
/// A file replaces a file in one rename. A directory on either side is
/// swapped through `previous`, which is restored if the swap fails.
fn publish(incoming: &Path, dest: &Path, previous: &Path) -> io::Result<()> {
    let dest_meta = match fs::symlink_metadata(dest) {
        Ok(meta) => Some(meta),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };
    let dest_is_dir = dest_meta.as_ref().is_some_and(|m| m.is_dir());
    if dest_meta.is_none() || (!dest_is_dir && !incoming.is_dir()) {
        return fs::rename(incoming, dest);
    }

    remove_existing(previous)?;
    fs::rename(dest, previous)?;
    if let Err(e) = fs::rename(incoming, dest) {
        let _ = fs::rename(previous, dest);
        return Err(e);
    }
    if let Err(e) = remove_existing(previous) {
        tracing::warn!("Could not remove replaced artifact {}: {}", previous.display(), e);
    }
    Ok(())
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn copy_recursive(from: &Path, to: &Path) -> io::Result<()> {
    if from.is_dir() {
        fs::create_dir_all(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        fs::copy(from, to).map(|_| ())
    }
}
