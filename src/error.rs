//! Error types for the retargeting core.

use thiserror::Error;

/// Errors raised by segmentation, matching, transformation and assembly.
///
/// All of them are fatal for a render: the pipeline never retries and never
/// emits partial output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DubError {
    /// A tunable parameter (threshold, weight, blend factor, hop size) is out of range.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No dub fragments to match against.
    #[error("fragment bank is empty")]
    EmptyBank,

    /// Note timing falls outside the audio buffer.
    #[error("note range {start}..{end} is outside an audio buffer of {len} samples")]
    Range { start: usize, end: usize, len: usize },

    /// Zero-length or zero-frequency input to a transform.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// The resampler could not be built or failed while processing.
    #[error("resampling failed: {0}")]
    Resample(String),
}

pub type Result<T> = std::result::Result<T, DubError>;
