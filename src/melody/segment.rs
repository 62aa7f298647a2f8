use log::debug;

use super::note::{FrequencySample, Note};
use crate::error::{DubError, Result};

/// Tunables of the admission test, validated on construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentParams {
    threshold: f64,
    weight: f64,
}

impl SegmentParams {
    /// `threshold` must lie in (0, 1) and `weight` in (0, 0.5), bounds excluded.
    pub fn new(threshold: f32, weight: f32) -> Result<Self> {
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(DubError::Configuration(format!(
                "threshold must be in (0, 1), got {}",
                threshold
            )));
        }
        if !(weight > 0.0 && weight < 0.5) {
            return Err(DubError::Configuration(format!(
                "weight must be in (0, 0.5), got {}",
                weight
            )));
        }
        Ok(Self {
            threshold: threshold as f64,
            weight: weight as f64,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold as f32
    }

    pub fn weight(&self) -> f32 {
        self.weight as f32
    }
}

/// Split a contour into notes. Validates the tunables first.
pub fn segment(
    contour: &[FrequencySample],
    threshold: f32,
    weight: f32,
    sample_rate: u32,
) -> Result<Vec<Note>> {
    let params = SegmentParams::new(threshold, weight)?;
    Ok(segment_with(contour, &params, sample_rate))
}

/// Group contiguous contour samples into notes using the admission test.
///
/// Every sample ends up in exactly one note and notes come out in contour
/// order. The active run is always flushed at the end of input.
pub fn segment_with(contour: &[FrequencySample], params: &SegmentParams, sample_rate: u32) -> Vec<Note> {
    let mut notes = Vec::new();
    let mut active: Vec<FrequencySample> = Vec::new();

    for &sample in contour {
        if !active.is_empty() && !admits(sample.frequency, &active, params) {
            notes.push(close_note(&active, sample_rate));
            active.clear();
        }
        active.push(sample);
    }

    if !active.is_empty() {
        notes.push(close_note(&active, sample_rate));
    }

    debug!("Segmented {} contour samples into {} notes", contour.len(), notes.len());
    notes
}

/// Whether `candidate` continues the note held in `active`.
///
/// Runs shorter than three samples always admit. Otherwise the weighted
/// product of z-scores `prod (1/w)^i * (b_i - mean) / std` is averaged over
/// the run and compared against the threshold. A run with zero spread only
/// admits a candidate equal to its value.
pub fn admits(candidate: f32, active: &[FrequencySample], params: &SegmentParams) -> bool {
    let n = active.len();
    if n < 3 {
        return true;
    }

    let mean = active.iter().map(|s| s.frequency as f64).sum::<f64>() / n as f64;
    let variance = active
        .iter()
        .map(|s| {
            let d = s.frequency as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    let std_dev = variance.sqrt();

    let tolerance = 1e-9 * mean.abs().max(1.0);
    if std_dev <= tolerance {
        return (candidate as f64 - mean).abs() <= tolerance;
    }

    let inv_weight = 1.0 / params.weight;
    let score = active
        .iter()
        .enumerate()
        .fold(1.0f64, |acc, (i, s)| {
            acc * inv_weight.powi(i as i32) * ((s.frequency as f64 - mean) / std_dev)
        });

    params.threshold < score / n as f64
}

fn close_note(active: &[FrequencySample], sample_rate: u32) -> Note {
    let sum: f64 = active.iter().map(|s| s.frequency as f64).sum();
    Note {
        frequency: (sum / active.len() as f64) as f32,
        start: active[0].timestamp,
        end: active[active.len() - 1].timestamp,
        sample_rate,
    }
}
