//! Pitch and duration changes for audio fragments.

use log::trace;

use super::resample::resample;
use super::spectral::{istft, phase_vocoder, stft, StftConfig};
use crate::error::{DubError, Result};

/// `1 + (from - to) / from`, the factor [`pitch_shift`] works with.
pub fn shift_factor(from_freq: f32, to_freq: f32) -> f64 {
    1.0 + (from_freq as f64 - to_freq as f64) / from_freq as f64
}

/// Whether [`pitch_shift`] can move audio at `from_freq` to `to_freq`.
///
/// The shift factor must stay positive, so the source has to sit above half
/// the target.
pub fn reaches(from_freq: f32, to_freq: f32) -> bool {
    if !(from_freq > 0.0 && to_freq >= 0.0) {
        return false;
    }
    let shift = shift_factor(from_freq, to_freq);
    shift.is_finite() && shift > 0.0
}

/// Move `audio` from `from_freq` to `to_freq`.
///
/// With `shift = 1 + (from - to) / from`, the spectrogram is played back at
/// rate `shift` (duration divided by `shift`), inverted, and the result is
/// read as audio sampled at `round(sample_rate / shift)` and resampled to
/// `sample_rate`. Duration comes back to roughly the input length and the
/// pitch lands on `from / shift`, which matches `to` to first order.
pub fn pitch_shift(
    audio: &[f32],
    from_freq: f32,
    to_freq: f32,
    sample_rate: u32,
    config: &StftConfig,
) -> Result<Vec<f32>> {
    if from_freq == 0.0 {
        return Err(DubError::DegenerateInput(
            "cannot pitch shift from 0 Hz".to_string(),
        ));
    }
    if to_freq < 0.0 {
        return Err(DubError::DegenerateInput(format!(
            "cannot pitch shift to an unvoiced target ({} Hz)",
            to_freq
        )));
    }
    if audio.is_empty() {
        return Err(DubError::DegenerateInput(
            "cannot pitch shift an empty buffer".to_string(),
        ));
    }

    let shift = shift_factor(from_freq, to_freq);
    if !(shift.is_finite() && shift > 0.0) {
        return Err(DubError::DegenerateInput(format!(
            "shift factor {} from {} Hz to {} Hz is not positive",
            shift, from_freq, to_freq
        )));
    }
    let source_rate = (sample_rate as f64 / shift).round();
    if !(source_rate >= 1.0 && source_rate <= u32::MAX as f64) {
        return Err(DubError::DegenerateInput(format!(
            "shift factor {} from {} Hz to {} Hz is out of range",
            shift, from_freq, to_freq
        )));
    }
    let source_rate = source_rate as u32;

    trace!(
        "pitch shift {:.1} Hz -> {:.1} Hz (factor {:.4}, read at {} Hz)",
        from_freq,
        to_freq,
        shift,
        source_rate
    );

    let spec = stft(audio, config);
    let stretched = phase_vocoder(&spec, 1.0 / shift)?;
    let stretched_len = ((audio.len() as f64 / shift).round() as usize).max(1);
    let shifted = istft(&stretched, Some(stretched_len));

    resample(&shifted, source_rate, sample_rate)
}

/// Change the duration of `audio` to exactly `target_len` samples, keeping pitch.
///
/// The phase vocoder output is within `max(1, factor)` spectral hops of the
/// target; the inverse transform then trims or zero-extends to the exact length.
pub fn time_shift(audio: &[f32], target_len: usize, config: &StftConfig) -> Result<Vec<f32>> {
    if audio.is_empty() {
        return Err(DubError::DegenerateInput(
            "cannot time shift an empty buffer".to_string(),
        ));
    }
    if target_len == 0 {
        return Ok(Vec::new());
    }

    let factor = target_len as f64 / audio.len() as f64;
    let spec = stft(audio, config);
    let stretched = phase_vocoder(&spec, factor)?;
    Ok(istft(&stretched, Some(target_len)))
}
