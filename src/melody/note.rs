/// One estimate of the melody contour.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrequencySample {
    /// Estimated fundamental in Hz; negative means unvoiced.
    pub frequency: f32,
    /// Time of the estimate in seconds.
    pub timestamp: f32,
}

impl FrequencySample {
    pub fn new(frequency: f32, timestamp: f32) -> Self {
        Self {
            frequency,
            timestamp,
        }
    }
}

/// A contiguous span of the contour judged to be one sustained pitch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Note {
    /// Mean of the absorbed frequencies. Negative marks an unvoiced span.
    pub frequency: f32,
    pub start: f32,
    pub end: f32,
    pub sample_rate: u32,
}

impl Note {
    pub fn is_unvoiced(&self) -> bool {
        self.frequency < 0.0
    }

    pub fn duration(&self) -> f32 {
        self.end - self.start
    }

    /// Length of the note in samples at its own sample rate.
    pub fn target_len(&self) -> usize {
        seconds_to_samples(self.duration(), self.sample_rate)
    }
}

/// A note together with the audio it was cut from.
#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    pub frequency: f32,
    pub start: f32,
    pub end: f32,
    pub audio: Vec<f32>,
}

/// `round(seconds * rate)`, clamped at zero.
pub fn seconds_to_samples(seconds: f32, sample_rate: u32) -> usize {
    (seconds as f64 * sample_rate as f64).round().max(0.0) as usize
}
