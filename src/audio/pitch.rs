use log::info;
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::dsp::resample::resample;
use crate::error::Result;
use crate::melody::note::FrequencySample;

/// Contour value for frames without a detectable melody.
pub const UNVOICED: f32 = -1.0;

/// Number of hops the first estimate lags behind the start of the track.
const LEADING_HOPS: usize = 8;

/// Source of a melody contour.
pub trait FrequencyEstimator {
    /// One estimate per hop at [`analysis_rate`](Self::analysis_rate).
    /// Negative values mark unvoiced frames.
    fn estimate(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>>;

    fn hop_size(&self) -> usize;

    fn analysis_rate(&self) -> u32;

    /// Estimates paired with their timestamps.
    fn contour(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<FrequencySample>> {
        let frequencies = self.estimate(samples, sample_rate)?;
        let stamps = contour_timestamps(frequencies.len(), self.analysis_rate(), self.hop_size());
        Ok(frequencies
            .into_iter()
            .zip(stamps)
            .map(|(frequency, timestamp)| FrequencySample::new(frequency, timestamp))
            .collect())
    }
}

/// `t_i = (8 + i) * hop / rate`, the frame times of a Melodia-style contour.
pub fn contour_timestamps(len: usize, sample_rate: u32, hop_size: usize) -> Vec<f32> {
    let step = hop_size as f64 / sample_rate as f64;
    (0..len)
        .map(|i| ((LEADING_HOPS + i) as f64 * step) as f32)
        .collect()
}

/// YIN fundamental-frequency estimator.
///
/// The difference function is built from an FFT cross-correlation, one
/// frame per hop, frames analysed in parallel.
#[derive(Clone, Debug)]
pub struct YinEstimator {
    pub analysis_rate: u32,
    pub hop_size: usize,
    pub frame_size: usize,
    pub min_frequency: f32,
    pub max_frequency: f32,
    /// Dip threshold on the cumulative-mean-normalised difference.
    pub threshold: f32,
    /// Frames quieter than this RMS are unvoiced.
    pub silence_rms: f32,
}

impl Default for YinEstimator {
    fn default() -> Self {
        Self {
            analysis_rate: 44100,
            hop_size: 128,
            frame_size: 2048,
            min_frequency: 55.0,
            max_frequency: 1760.0,
            threshold: 0.15,
            silence_rms: 0.001,
        }
    }
}

impl FrequencyEstimator for YinEstimator {
    fn estimate(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        let samples = resample(samples, sample_rate, self.analysis_rate)?;
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let hop = self.hop_size;
        let num_frames = ((samples.len() - 1) / hop + 1).saturating_sub(LEADING_HOPS);
        let half = self.frame_size / 2;
        let rate = self.analysis_rate as f32;
        let tau_min = ((rate / self.max_frequency).floor() as usize).max(2);
        let tau_max = ((rate / self.min_frequency).ceil() as usize).min(half - 1);

        let estimates: Vec<f32> = (0..num_frames)
            .into_par_iter()
            .map_init(FftPlanner::<f32>::new, |planner, i| {
                let center = (LEADING_HOPS + i) * hop;
                let frame = frame_at(&samples, center, self.frame_size);

                let rms = (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt();
                if rms < self.silence_rms || tau_min >= tau_max {
                    return UNVOICED;
                }

                let cmnd = normalized_difference(&frame, planner);
                match pick_period(&cmnd, tau_min, tau_max, self.threshold) {
                    Some(period) => rate / period,
                    None => UNVOICED,
                }
            })
            .collect();

        let voiced = estimates.iter().filter(|&&f| f > 0.0).count();
        info!(
            "Melody contour: {} frames, {} voiced ({:.1}s at {} Hz)",
            estimates.len(),
            voiced,
            samples.len() as f32 / rate,
            self.analysis_rate
        );
        Ok(estimates)
    }

    fn hop_size(&self) -> usize {
        self.hop_size
    }

    fn analysis_rate(&self) -> u32 {
        self.analysis_rate
    }
}

/// `size` samples centred on `center`, zero outside the signal.
fn frame_at(samples: &[f32], center: usize, size: usize) -> Vec<f32> {
    let origin = center as isize - (size / 2) as isize;
    (0..size)
        .map(|i| {
            let idx = origin + i as isize;
            if idx >= 0 && (idx as usize) < samples.len() {
                samples[idx as usize]
            } else {
                0.0
            }
        })
        .collect()
}

/// Cumulative-mean-normalised difference `d'(tau)` for `tau < frame.len() / 2`.
fn normalized_difference(frame: &[f32], planner: &mut FftPlanner<f32>) -> Vec<f32> {
    let size = frame.len();
    let half = size / 2;
    let n = 2 * size;

    // r(tau) = sum_j a_j * x_{j + tau}, with a = first half of the frame
    let mut a: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); n];
    let mut x: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); n];
    for j in 0..half {
        a[j] = Complex::new(frame[j], 0.0);
    }
    for (j, &s) in frame.iter().enumerate() {
        x[j] = Complex::new(s, 0.0);
    }
    let forward = planner.plan_fft_forward(n);
    forward.process(&mut a);
    forward.process(&mut x);
    for (ai, xi) in a.iter_mut().zip(x.iter()) {
        *ai = ai.conj() * xi;
    }
    planner.plan_fft_inverse(n).process(&mut a);
    let norm = 1.0 / n as f32;

    let mut squares = vec![0.0f32; size + 1];
    for (j, &s) in frame.iter().enumerate() {
        squares[j + 1] = squares[j] + s * s;
    }
    let head_energy = squares[half];

    let mut cmnd = vec![1.0f32; half];
    let mut running = 0.0f32;
    for tau in 1..half {
        let shifted_energy = squares[tau + half] - squares[tau];
        let diff = (head_energy + shifted_energy - 2.0 * a[tau].re * norm).max(0.0);
        running += diff;
        cmnd[tau] = if running > 0.0 {
            diff * tau as f32 / running
        } else {
            1.0
        };
    }
    cmnd
}

/// First dip of `cmnd` below `threshold` in `tau_min..tau_max`, refined to
/// its local minimum and interpolated to a fractional period.
fn pick_period(cmnd: &[f32], tau_min: usize, tau_max: usize, threshold: f32) -> Option<f32> {
    let mut tau = (tau_min..tau_max).find(|&t| cmnd[t] < threshold)?;
    while tau + 1 < tau_max && cmnd[tau + 1] < cmnd[tau] {
        tau += 1;
    }

    if tau == 0 || tau + 1 >= cmnd.len() {
        return Some(tau as f32);
    }
    let (s0, s1, s2) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
    let denom = s0 - 2.0 * s1 + s2;
    if denom.abs() < f32::EPSILON {
        return Some(tau as f32);
    }
    Some(tau as f32 + 0.5 * (s0 - s2) / denom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, seconds: f32) -> Vec<f32> {
        let len = (rate as f32 * seconds) as usize;
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn timestamps_start_after_leading_hops() {
        let stamps = contour_timestamps(3, 44100, 128);
        assert!((stamps[0] - 8.0 * 128.0 / 44100.0).abs() < 1e-7);
        assert!((stamps[2] - stamps[1] - 128.0 / 44100.0).abs() < 1e-7);
    }

    #[test]
    fn tracks_a_steady_tone() {
        let estimator = YinEstimator::default();
        let signal = sine(440.0, 44100, 1.0);
        let contour = estimator.contour(&signal, 44100).unwrap();

        assert_eq!(contour.len(), (signal.len() - 1) / 128 + 1 - 8);
        let middle = &contour[50..contour.len() - 50];
        for sample in middle {
            assert!(
                (sample.frequency - 440.0).abs() < 440.0 * 0.02,
                "estimated {} Hz",
                sample.frequency
            );
        }
        // frames stay inside the signal
        let last = contour.last().unwrap().timestamp;
        assert!(((last * 44100.0).round() as usize) < signal.len());
    }

    #[test]
    fn silence_is_unvoiced() {
        let estimator = YinEstimator::default();
        let estimates = estimator.estimate(&vec![0.0; 20000], 44100).unwrap();
        assert!(!estimates.is_empty());
        assert!(estimates.iter().all(|&f| f == UNVOICED));
    }

    #[test]
    fn other_rates_are_resampled_first() {
        let estimator = YinEstimator::default();
        let signal = sine(330.0, 22050, 1.0);
        let estimates = estimator.estimate(&signal, 22050).unwrap();
        let middle = &estimates[50..estimates.len() - 50];
        let voiced: Vec<f32> = middle.iter().copied().filter(|&f| f > 0.0).collect();
        assert!(voiced.len() > middle.len() * 9 / 10);
        for f in voiced {
            assert!((f - 330.0).abs() < 330.0 * 0.02, "estimated {} Hz", f);
        }
    }

    #[test]
    fn short_input_has_no_frames() {
        let estimator = YinEstimator::default();
        assert!(estimator.estimate(&[], 44100).unwrap().is_empty());
        assert!(estimator.estimate(&[0.1; 500], 44100).unwrap().is_empty());
    }
}
