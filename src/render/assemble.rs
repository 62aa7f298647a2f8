use rayon::prelude::*;

use crate::dsp::spectral::StftConfig;
use crate::dsp::transform::time_shift;
use crate::error::{DubError, Result};
use crate::melody::note::seconds_to_samples;

/// Join segments with windowed overlap-add cross-fades.
///
/// Each segment of length `L` is stretched to `L + 2h`, tapered, and added
/// into the output starting `h` samples before its slot, so neighbours
/// overlap by `h` on each side of every boundary. The taper ramps span `2h`
/// samples at both ends and consecutive ramps sum to one. The output is
/// exactly as long as the sum of the input lengths.
pub fn concatenate_windowed(
    segments: &[Vec<f32>],
    hop_size: usize,
    config: &StftConfig,
) -> Result<Vec<f32>> {
    if let Some(short) = segments.iter().find(|s| 2 * hop_size > s.len()) {
        return Err(DubError::Configuration(format!(
            "crossfade hop {} needs segments of at least {} samples, got {}",
            hop_size,
            2 * hop_size,
            short.len()
        )));
    }

    let total: usize = segments.iter().map(Vec::len).sum();
    let mut output = vec![0.0f32; total];

    if hop_size == 0 {
        let mut offset = 0;
        for segment in segments {
            output[offset..offset + segment.len()].copy_from_slice(segment);
            offset += segment.len();
        }
        return Ok(output);
    }

    let padded: Vec<Vec<f32>> = segments
        .par_iter()
        .map(|segment| time_shift(segment, segment.len() + 2 * hop_size, config))
        .collect::<Result<_>>()?;

    let ramp = 2 * hop_size;
    let mut offset = 0usize;
    for (segment, stretched) in segments.iter().zip(padded.iter()) {
        let start = offset as isize - hop_size as isize;
        for (i, &sample) in stretched.iter().enumerate() {
            let pos = start + i as isize;
            if pos < 0 || pos as usize >= total {
                continue;
            }
            output[pos as usize] += sample * taper(i, stretched.len(), ramp);
        }
        offset += segment.len();
    }

    Ok(output)
}

/// Linear fade over `ramp` samples at both ends of a window of length `len`.
///
/// The fall of one window and the rise of the next sum to exactly 1.
fn taper(i: usize, len: usize, ramp: usize) -> f32 {
    if ramp == 0 {
        1.0
    } else if i < ramp {
        (i as f32 + 0.5) / ramp as f32
    } else if i >= len - ramp {
        ((len - i) as f32 - 0.5) / ramp as f32
    } else {
        1.0
    }
}

/// `round(duration * rate)` zero samples.
pub fn generate_silence(duration_seconds: f32, sample_rate: u32) -> Vec<f32> {
    vec![0.0; seconds_to_samples(duration_seconds, sample_rate)]
}

/// Scale the dub track by `factor` and the original by `1 - factor`.
///
/// The two scaled tracks are returned separately; [`mix`] sums them.
pub fn blend(dub: &[f32], original: &[f32], factor: f32) -> Result<(Vec<f32>, Vec<f32>)> {
    if !(0.0..=1.0).contains(&factor) {
        return Err(DubError::Configuration(format!(
            "blend factor must be in [0, 1], got {}",
            factor
        )));
    }
    let dub = dub.iter().map(|s| s * factor).collect();
    let original = original.iter().map(|s| s * (1.0 - factor)).collect();
    Ok((dub, original))
}

/// Sample-wise sum; the shorter track is treated as zero past its end.
pub fn mix(a: &[f32], b: &[f32]) -> Vec<f32> {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).copied().unwrap_or(0.0) + b.get(i).copied().unwrap_or(0.0))
        .collect()
}
