//! Short-time Fourier transform, its inverse, and phase-vocoder time scaling.
//!
//! Frames are centred: the signal is zero-padded by `n_fft / 2` on both
//! sides, so frame `k` is centred on sample `k * hop`.

use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

use crate::error::{DubError, Result};

const TWO_PI: f64 = 2.0 * PI;

/// Frame geometry shared by the forward and inverse transforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StftConfig {
    pub n_fft: usize,
    pub hop_length: usize,
}

impl Default for StftConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
        }
    }
}

impl StftConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_fft < 4 || self.n_fft % 2 != 0 {
            return Err(DubError::Configuration(format!(
                "n_fft must be an even number >= 4, got {}",
                self.n_fft
            )));
        }
        if self.hop_length == 0 || self.hop_length > self.n_fft / 2 {
            return Err(DubError::Configuration(format!(
                "hop_length must be in 1..={}, got {}",
                self.n_fft / 2,
                self.hop_length
            )));
        }
        Ok(())
    }

    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }
}

/// Complex spectrogram, one `Vec` of `n_fft / 2 + 1` bins per frame.
#[derive(Clone, Debug)]
pub struct Spectrogram {
    pub config: StftConfig,
    pub frames: Vec<Vec<Complex<f32>>>,
}

impl Spectrogram {
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Length of the signal `istft` produces when no length is requested.
    pub fn natural_len(&self) -> usize {
        self.frames.len().saturating_sub(1) * self.config.hop_length
    }
}

/// Periodic Hann window.
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| (0.5 * (1.0 - (TWO_PI * i as f64 / size as f64).cos())) as f32)
        .collect()
}

pub fn stft(signal: &[f32], config: &StftConfig) -> Spectrogram {
    let n_fft = config.n_fft;
    let hop = config.hop_length;
    let pad = n_fft / 2;
    let num_frames = 1 + signal.len() / hop;
    let window = hann_window(n_fft);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];

    let frames = (0..num_frames)
        .map(|frame_idx| {
            // padded index p maps to signal index p - pad
            let origin = (frame_idx * hop) as isize - pad as isize;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let idx = origin + i as isize;
                let sample = if idx >= 0 && (idx as usize) < signal.len() {
                    signal[idx as usize]
                } else {
                    0.0
                };
                *slot = Complex::new(sample * window[i], 0.0);
            }
            fft.process(&mut buffer);
            buffer[..config.num_bins()].to_vec()
        })
        .collect();

    Spectrogram {
        config: *config,
        frames,
    }
}

/// Inverse of [`stft`] by weighted overlap-add.
///
/// With `length == None` the output holds `natural_len()` samples. A
/// requested length is read from the overlap-add buffer as far as frames
/// reach and zero-extended past that.
pub fn istft(spec: &Spectrogram, length: Option<usize>) -> Vec<f32> {
    let n_fft = spec.config.n_fft;
    let hop = spec.config.hop_length;
    let pad = n_fft / 2;
    let num_bins = spec.config.num_bins();
    let out_len = length.unwrap_or_else(|| spec.natural_len());

    if spec.frames.is_empty() || out_len == 0 {
        return vec![0.0; out_len];
    }

    let window = hann_window(n_fft);
    let full_len = (spec.frames.len() - 1) * hop + n_fft;
    let mut output = vec![0.0f32; full_len];
    let mut window_sum = vec![0.0f32; full_len];

    let mut planner = FftPlanner::<f32>::new();
    let ifft = planner.plan_fft_inverse(n_fft);
    let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
    let norm = 1.0 / n_fft as f32;

    for (frame_idx, frame) in spec.frames.iter().enumerate() {
        buffer[..num_bins].copy_from_slice(frame);
        // mirror negative frequencies
        for bin in 1..n_fft / 2 {
            buffer[n_fft - bin] = frame[bin].conj();
        }
        ifft.process(&mut buffer);

        let offset = frame_idx * hop;
        for i in 0..n_fft {
            output[offset + i] += buffer[i].re * norm * window[i];
            window_sum[offset + i] += window[i] * window[i];
        }
    }

    for (sample, &weight) in output.iter_mut().zip(window_sum.iter()) {
        if weight > 1e-8 {
            *sample /= weight;
        }
    }

    let available = full_len - pad;
    let mut signal: Vec<f32> = output[pad..pad + out_len.min(available)].to_vec();
    signal.resize(out_len, 0.0);
    signal
}

/// Scale the duration of a spectrogram by `factor` without changing pitch.
///
/// `factor > 1` produces more frames (longer audio). Magnitudes are
/// interpolated between neighbouring analysis frames and phases are
/// advanced by the measured per-bin instantaneous frequency.
///
/// Frame quantisation bounds the error of `natural_len()` against
/// `len * factor` to `max(1, factor)` hops.
pub fn phase_vocoder(spec: &Spectrogram, factor: f64) -> Result<Spectrogram> {
    if !(factor.is_finite() && factor > 0.0) {
        return Err(DubError::DegenerateInput(format!(
            "stretch factor must be positive and finite, got {}",
            factor
        )));
    }

    let num_bins = spec.config.num_bins();
    let n_fft = spec.config.n_fft as f64;
    let hop = spec.config.hop_length as f64;
    let num_frames = spec.frames.len();
    let rate = 1.0 / factor;

    if num_frames == 0 {
        return Ok(Spectrogram {
            config: spec.config,
            frames: Vec::new(),
        });
    }

    let phase_advance: Vec<f64> = (0..num_bins)
        .map(|bin| TWO_PI * hop * bin as f64 / n_fft)
        .collect();
    let zeros = vec![Complex::new(0.0f32, 0.0); num_bins];

    let mut phase_accum: Vec<f64> = spec.frames[0].iter().map(|c| c.arg() as f64).collect();
    let mut frames = Vec::with_capacity((num_frames as f64 * factor).ceil() as usize + 1);

    let mut step = 0usize;
    loop {
        let t = step as f64 * rate;
        if t >= num_frames as f64 {
            break;
        }
        let idx = t.floor() as usize;
        let alpha = (t - idx as f64) as f32;
        let current = column(&spec.frames, &zeros, idx);
        let next = column(&spec.frames, &zeros, idx + 1);

        let frame: Vec<Complex<f32>> = (0..num_bins)
            .map(|bin| {
                let mag = (1.0 - alpha) * current[bin].norm() + alpha * next[bin].norm();
                Complex::from_polar(mag, phase_accum[bin] as f32)
            })
            .collect();
        frames.push(frame);

        for bin in 0..num_bins {
            let delta = next[bin].arg() as f64 - current[bin].arg() as f64 - phase_advance[bin];
            let deviation = delta - TWO_PI * (delta / TWO_PI).round();
            phase_accum[bin] = (phase_accum[bin] + phase_advance[bin] + deviation).rem_euclid(TWO_PI);
        }
        step += 1;
    }

    Ok(Spectrogram {
        config: spec.config,
        frames,
    })
}

/// Frame `idx`, or silence past the end.
fn column<'a>(
    frames: &'a [Vec<Complex<f32>>],
    zeros: &'a [Complex<f32>],
    idx: usize,
) -> &'a [Complex<f32>] {
    frames.get(idx).map_or(zeros, |f| f.as_slice())
}
