use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{DubError, Result};

/// Resample mono f32 audio from `from_rate` to `to_rate` using rubato.
///
/// The output holds `round(len * to_rate / from_rate)` samples, aligned with
/// the input. A single `process` call over the whole buffer already starts
/// on the first input sample, so only the tail needs flushing.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(DubError::DegenerateInput(format!(
            "cannot resample {} Hz -> {} Hz",
            from_rate, to_rate
        )));
    }
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (samples.len() as f64 * ratio).round() as usize;

    // trailing zeros push the filter tail out of the resampler
    let mut padded = samples.to_vec();
    padded.resize(samples.len() + params.sinc_len, 0.0);

    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        1.0, // fixed ratio
        params,
        padded.len(),
        1, // mono
    )
    .map_err(|e| DubError::Resample(e.to_string()))?;

    let input = vec![padded];
    let output = resampler
        .process(&input, None)
        .map_err(|e| DubError::Resample(e.to_string()))?;

    let mut resampled: Vec<f32> = output
        .into_iter()
        .next()
        .unwrap_or_default()
        .into_iter()
        .take(expected)
        .collect();
    resampled.resize(expected, 0.0);
    Ok(resampled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_a_copy() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(resample(&samples, 44100, 44100).unwrap(), samples);
    }

    #[test]
    fn output_length_follows_ratio() {
        let samples: Vec<f32> = (0..4410).map(|i| (i as f32 * 0.05).sin()).collect();
        assert_eq!(resample(&samples, 44100, 22050).unwrap().len(), 2205);
        assert_eq!(resample(&samples, 44100, 48000).unwrap().len(), 4800);
    }

    #[test]
    fn preserves_a_low_tone() {
        let rate = 8000u32;
        let samples: Vec<f32> = (0..8000)
            .map(|i| (2.0 * std::f32::consts::PI * 100.0 * i as f32 / rate as f32).sin())
            .collect();
        let up = resample(&samples, rate, 16000).unwrap();
        // compare away from the edges
        for i in (1000..7000).step_by(97) {
            let expected = (2.0 * std::f32::consts::PI * 100.0 * i as f32 / 16000.0).sin();
            assert!((up[i] - expected).abs() < 0.1, "sample {}: {}", i, up[i]);
        }
    }

    fn impulse_position(from_rate: u32, to_rate: u32) -> usize {
        let mut samples = vec![0.0f32; 4000];
        samples[1000] = 1.0;
        let out = resample(&samples, from_rate, to_rate).unwrap();
        out.iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, s)| {
                if s.abs() > best.1 {
                    (i, s.abs())
                } else {
                    best
                }
            })
            .0
    }

    #[test]
    fn impulse_stays_in_place() {
        for (from, to, expected) in [(8000, 16000, 2000), (44100, 22050, 500), (44100, 48000, 1088)] {
            let found = impulse_position(from, to);
            assert!(
                found.abs_diff(expected) <= 2,
                "{} -> {}: impulse at {}, expected {}",
                from,
                to,
                found,
                expected
            );
        }
    }

    #[test]
    fn tail_is_not_silent() {
        let samples = vec![0.5f32; 4000];
        let out = resample(&samples, 44100, 22050).unwrap();
        assert_eq!(out.len(), 2000);
        let tail = &out[1700..1900];
        assert!(tail.iter().all(|s| (s - 0.5).abs() < 0.05), "tail {:?}", &tail[..4]);
    }

    #[test]
    fn rejects_zero_rate() {
        assert!(resample(&[0.0], 0, 44100).is_err());
    }
}
