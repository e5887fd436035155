//! Stem mixdown.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::{StageError, StageResult};
use crate::models::{Stem, StemMix};

/// Stem files of a separated track.
pub type StemPaths = BTreeMap<Stem, PathBuf>;

/// What the mixdown did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixSummary {
    /// Interleaved samples written.
    pub samples: usize,
    /// Peak of the summed signal before any scaling.
    pub peak: f32,
    /// Whether the sum was scaled down to the safe peak.
    pub normalized: bool,
}

/// Sum stems scaled by their gains into a 32-bit float WAV.
///
/// Gains apply before summation. Stems with gain 0 are not decoded, but
/// still set the output length. If the sum peaks above `safe_peak` the
/// whole mix is scaled down to it; nothing is clipped.
pub fn mix_stems(
    stems: &StemPaths,
    mix: &StemMix,
    safe_peak: f32,
    output: &Path,
) -> StageResult<MixSummary> {
    if stems.is_empty() {
        return Err(StageError::separation("no stems to mix"));
    }
    for (stem, gain) in mix.audible() {
        if !stems.contains_key(&stem) {
            return Err(StageError::separation(format!(
                "stem '{}' has gain {} but was not produced",
                stem, gain
            )));
        }
    }

    let mut spec: Option<WavSpec> = None;
    let mut length = 0usize;
    let mut sum: Vec<f32> = Vec::new();

    for (&stem, path) in stems {
        let reader = WavReader::open(path).map_err(|e| {
            StageError::stem_mix(format!("cannot read {} stem {}: {}", stem, path.display(), e))
        })?;
        let stem_spec = reader.spec();
        match spec {
            None => spec = Some(stem_spec),
            Some(first)
                if first.sample_rate != stem_spec.sample_rate
                    || first.channels != stem_spec.channels =>
            {
                return Err(StageError::stem_mix(format!(
                    "{} stem is {} Hz/{} ch, expected {} Hz/{} ch",
                    stem,
                    stem_spec.sample_rate,
                    stem_spec.channels,
                    first.sample_rate,
                    first.channels
                )));
            }
            Some(_) => {}
        }

        length = length.max(reader.len() as usize);

        let gain = mix.gain(stem);
        if gain == 0.0 {
            continue;
        }

        let samples = read_samples(reader)
            .map_err(|e| StageError::stem_mix(format!("decoding {} stem: {}", stem, e)))?;
        if sum.len() < samples.len() {
            sum.resize(samples.len(), 0.0);
        }
        for (acc, s) in sum.iter_mut().zip(samples) {
            *acc += s * gain;
        }
    }
    sum.resize(length, 0.0);

    let peak = sum.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    let normalized = safe_peak > 0.0 && peak > safe_peak;
    if normalized {
        let scale = safe_peak / peak;
        for s in &mut sum {
            *s *= scale;
        }
    }

    let Some(in_spec) = spec else {
        return Err(StageError::stem_mix("no readable stems"));
    };
    let out_spec = WavSpec {
        channels: in_spec.channels,
        sample_rate: in_spec.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    write_float_wav(output, out_spec, &sum)
        .map_err(|e| StageError::stem_mix(format!("writing mix {}: {}", output.display(), e)))?;

    tracing::debug!(samples = sum.len(), peak, normalized, "Mixed stems");
    Ok(MixSummary {
        samples: sum.len(),
        peak,
        normalized,
    })
}

/// Decode every sample as f32 in [-1, 1].
fn read_samples<R: std::io::Read>(reader: WavReader<R>) -> Result<Vec<f32>, hound::Error> {
    let spec = reader.spec();
    match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect(),
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect()
        }
    }
}

fn write_float_wav(path: &Path, spec: WavSpec, samples: &[f32]) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[f32]) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        write_float_wav(path, spec, samples).unwrap();
    }

    fn write_pcm16(path: &Path, samples: &[i16]) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn read_back(path: &Path) -> Vec<f32> {
        WavReader::open(path)
            .unwrap()
            .into_samples::<f32>()
            .map(|s| s.unwrap())
            .collect()
    }

    fn four_stems(dir: &Path) -> StemPaths {
        let data: [(Stem, [f32; 4]); 4] = [
            (Stem::Vocals, [0.1, 0.1, -0.1, 0.0]),
            (Stem::Drums, [0.2, -0.2, 0.0, 0.1]),
            (Stem::Bass, [0.05, 0.05, 0.05, 0.05]),
            (Stem::Other, [0.0, 0.1, 0.2, -0.3]),
        ];
        data.iter()
            .map(|(stem, samples)| {
                let path = dir.join(format!("{}.wav", stem));
                write_wav(&path, 44100, 1, samples);
                (*stem, path)
            })
            .collect()
    }

    #[test]
    fn unity_gains_equal_plain_sum() {
        let dir = tempdir().unwrap();
        let stems = four_stems(dir.path());
        let out = dir.path().join("mix.wav");

        let summary = mix_stems(&stems, &StemMix::default(), 1.0, &out).unwrap();
        assert!(!summary.normalized);

        let mixed = read_back(&out);
        let expected = [0.35, 0.05, 0.15, -0.15];
        assert_eq!(mixed.len(), 4);
        for (m, e) in mixed.iter().zip(expected) {
            assert!((m - e).abs() < 1e-6, "{} vs {}", m, e);
        }
    }

    #[test]
    fn gains_scale_before_sum() {
        let dir = tempdir().unwrap();
        let stems = four_stems(dir.path());
        let out = dir.path().join("mix.wav");

        let mut mix = StemMix::default();
        mix.set(Stem::Vocals, 0.0).unwrap();
        mix.set(Stem::Drums, 0.5).unwrap();
        mix_stems(&stems, &mix, 1.0, &out).unwrap();

        let mixed = read_back(&out);
        // 0.5*drums + bass + other
        let expected = [0.15, 0.05, 0.25, -0.2];
        for (m, e) in mixed.iter().zip(expected) {
            assert!((m - e).abs() < 1e-6);
        }
    }

    #[test]
    fn loud_mix_is_scaled_to_safe_peak() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("vocals.wav");
        let b = dir.path().join("drums.wav");
        write_wav(&a, 44100, 1, &[0.8, -0.4]);
        write_wav(&b, 44100, 1, &[0.8, 0.2]);
        let stems: StemPaths = [(Stem::Vocals, a), (Stem::Drums, b)].into_iter().collect();
        let mut mix = StemMix::default();
        mix.set(Stem::Bass, 0.0).unwrap();
        mix.set(Stem::Other, 0.0).unwrap();

        let out = dir.path().join("mix.wav");
        let summary = mix_stems(&stems, &mix, 1.0, &out).unwrap();
        assert!(summary.normalized);
        assert!((summary.peak - 1.6).abs() < 1e-6);

        let mixed = read_back(&out);
        assert!((mixed[0] - 1.0).abs() < 1e-6);
        assert!((mixed[1] - (-0.2 / 1.6)).abs() < 1e-6);
    }

    #[test]
    fn all_zero_gains_give_silence_of_longest_stem() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("vocals.wav");
        let b = dir.path().join("drums.wav");
        write_wav(&a, 44100, 1, &[0.5; 3]);
        write_wav(&b, 44100, 1, &[0.5; 6]);
        let stems: StemPaths = [(Stem::Vocals, a), (Stem::Drums, b)].into_iter().collect();
        let mut mix = StemMix::default();
        for stem in Stem::ALL {
            mix.set(stem, 0.0).unwrap();
        }

        let out = dir.path().join("mix.wav");
        mix_stems(&stems, &mix, 1.0, &out).unwrap();
        assert_eq!(read_back(&out), vec![0.0; 6]);
    }

    #[test]
    fn int_stems_are_decoded() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("vocals.wav");
        write_pcm16(&a, &[16384, -16384]);
        let stems: StemPaths = [(Stem::Vocals, a)].into_iter().collect();
        let mut mix = StemMix::default();
        for stem in [Stem::Drums, Stem::Bass, Stem::Other] {
            mix.set(stem, 0.0).unwrap();
        }

        let out = dir.path().join("mix.wav");
        mix_stems(&stems, &mix, 1.0, &out).unwrap();
        let mixed = read_back(&out);
        assert!((mixed[0] - 0.5).abs() < 1e-6);
        assert!((mixed[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn mismatched_rates_are_stem_mix_errors() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("vocals.wav");
        let b = dir.path().join("drums.wav");
        write_wav(&a, 44100, 1, &[0.1]);
        write_wav(&b, 48000, 1, &[0.1]);
        let stems: StemPaths = [(Stem::Vocals, a), (Stem::Drums, b)].into_iter().collect();
        let mut mix = StemMix::default();
        mix.set(Stem::Bass, 0.0).unwrap();
        mix.set(Stem::Other, 0.0).unwrap();

        let err = mix_stems(&stems, &mix, 1.0, &dir.path().join("mix.wav")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StemMix);
    }

    #[test]
    fn missing_audible_stem_is_separation_error() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("vocals.wav");
        write_wav(&a, 44100, 1, &[0.1]);
        let stems: StemPaths = [(Stem::Vocals, a)].into_iter().collect();

        let err = mix_stems(&stems, &StemMix::default(), 1.0, &dir.path().join("mix.wav"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Separation);
    }
}
