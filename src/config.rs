use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::pitch::YinEstimator;
use crate::cli::{Cli, DEFAULT_BLEND, DEFAULT_THRESHOLD, DEFAULT_WEIGHT};
use crate::dsp::spectral::StftConfig;
use crate::error::{DubError, Result};
use crate::melody::fragment::BankFilter;
use crate::melody::segment::SegmentParams;
use crate::render::pipeline::{MatchStrategy, RenderSettings};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub spectral: SpectralConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub bank: BankConfig,
}

#[derive(Debug, Deserialize)]
pub struct SegmentationConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    #[serde(default = "default_min_frequency")]
    pub min_frequency: f32,
    #[serde(default = "default_max_frequency")]
    pub max_frequency: f32,
    #[serde(default = "default_yin_threshold")]
    pub yin_threshold: f32,
    #[serde(default = "default_silence_rms")]
    pub silence_rms: f32,
}

#[derive(Debug, Deserialize)]
pub struct SpectralConfig {
    #[serde(default = "default_n_fft")]
    pub n_fft: usize,
    #[serde(default = "default_hop_length")]
    pub hop_length: usize,
}

#[derive(Debug, Deserialize)]
pub struct RenderConfig {
    /// Negative values are rejected by [`Settings::resolve`].
    #[serde(default = "default_crossfade_hop")]
    pub crossfade_hop: i64,
    #[serde(default = "default_blend")]
    pub blend: f32,
}

#[derive(Debug, Deserialize)]
pub struct BankConfig {
    #[serde(default)]
    pub include_unvoiced: bool,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            weight: default_weight(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            hop_size: default_hop_size(),
            frame_size: default_frame_size(),
            min_frequency: default_min_frequency(),
            max_frequency: default_max_frequency(),
            yin_threshold: default_yin_threshold(),
            silence_rms: default_silence_rms(),
        }
    }
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            n_fft: default_n_fft(),
            hop_length: default_hop_length(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            crossfade_hop: default_crossfade_hop(),
            blend: default_blend(),
        }
    }
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            include_unvoiced: false,
            min_samples: default_min_samples(),
        }
    }
}

fn default_threshold() -> f32 { DEFAULT_THRESHOLD }
fn default_weight() -> f32 { DEFAULT_WEIGHT }
fn default_sample_rate() -> u32 { 44100 }
fn default_hop_size() -> usize { 128 }
fn default_frame_size() -> usize { 2048 }
fn default_min_frequency() -> f32 { 55.0 }
fn default_max_frequency() -> f32 { 1760.0 }
fn default_yin_threshold() -> f32 { 0.15 }
fn default_silence_rms() -> f32 { 0.001 }
fn default_n_fft() -> usize { 2048 }
fn default_hop_length() -> usize { 512 }
fn default_crossfade_hop() -> i64 { 12 }
fn default_blend() -> f32 { DEFAULT_BLEND }
fn default_min_samples() -> usize { 1 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Explicit path first, then `./autodub.toml`, then the per-user config.
pub fn discover_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("autodub.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("autodub").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("autodub").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

/// The config for this run, or defaults when no file is found.
///
/// A file named with `--config` must load; an auto-discovered one that does
/// not parse is skipped with a warning.
pub fn read_config(explicit: Option<&Path>) -> Result<Config> {
    let Some(path) = discover_config(explicit) else {
        return Ok(Config::default());
    };
    match load_config(&path) {
        Some(config) => {
            log::info!("Loaded config from {}", path.display());
            Ok(config)
        }
        None if explicit.is_some() => Err(DubError::Configuration(format!(
            "cannot read config file {}",
            path.display()
        ))),
        None => {
            log::warn!("Failed to load config from {}", path.display());
            Ok(Config::default())
        }
    }
}

/// Everything a run needs, merged from the command line and the config file
/// and checked before any audio is touched.
#[derive(Clone, Debug)]
pub struct Settings {
    pub segment: SegmentParams,
    pub estimator: YinEstimator,
    pub render: RenderSettings,
    pub bank: BankFilter,
    pub blend: f32,
}

impl Settings {
    /// Config values apply only where the CLI flag is still at its default.
    pub fn resolve(cli: &Cli, config: &Config) -> Result<Self> {
        let threshold = if cli.threshold == DEFAULT_THRESHOLD {
            config.segmentation.threshold
        } else {
            cli.threshold
        };
        let weight = if cli.weight == DEFAULT_WEIGHT {
            config.segmentation.weight
        } else {
            cli.weight
        };
        let blend = if cli.blend == DEFAULT_BLEND {
            config.render.blend
        } else {
            cli.blend
        };

        let segment = SegmentParams::new(threshold, weight)?;

        if !(0.0..=1.0).contains(&blend) {
            return Err(DubError::Configuration(format!(
                "blend must be in [0, 1], got {}",
                blend
            )));
        }

        let crossfade_hop = usize::try_from(config.render.crossfade_hop).map_err(|_| {
            DubError::Configuration(format!(
                "crossfade_hop must not be negative, got {}",
                config.render.crossfade_hop
            ))
        })?;

        let stft = StftConfig {
            n_fft: config.spectral.n_fft,
            hop_length: config.spectral.hop_length,
        };
        stft.validate()?;

        let estimator = estimator_from(&config.analysis)?;

        let strategy = if cli.random {
            MatchStrategy::Random {
                seed: cli.seed.unwrap_or_else(rand::random),
            }
        } else {
            MatchStrategy::Nearest
        };

        Ok(Self {
            segment,
            estimator,
            render: RenderSettings {
                stft,
                crossfade_hop,
                strategy,
            },
            bank: BankFilter {
                include_unvoiced: config.bank.include_unvoiced,
                min_samples: config.bank.min_samples,
            },
            blend,
        })
    }

    /// Rate every track is loaded at.
    pub fn sample_rate(&self) -> u32 {
        self.estimator.analysis_rate
    }
}

fn estimator_from(analysis: &AnalysisConfig) -> Result<YinEstimator> {
    if analysis.sample_rate == 0 {
        return Err(DubError::Configuration("sample_rate must be positive".into()));
    }
    if analysis.hop_size == 0 {
        return Err(DubError::Configuration("hop_size must be positive".into()));
    }
    if analysis.frame_size < 4 || analysis.frame_size % 2 != 0 {
        return Err(DubError::Configuration(format!(
            "frame_size must be an even number >= 4, got {}",
            analysis.frame_size
        )));
    }
    if !(analysis.min_frequency > 0.0 && analysis.min_frequency < analysis.max_frequency) {
        return Err(DubError::Configuration(format!(
            "frequency range {}..{} Hz is empty",
            analysis.min_frequency, analysis.max_frequency
        )));
    }
    if !(analysis.yin_threshold > 0.0 && analysis.yin_threshold < 1.0) {
        return Err(DubError::Configuration(format!(
            "yin_threshold must be in (0, 1), got {}",
            analysis.yin_threshold
        )));
    }
    if !(analysis.silence_rms >= 0.0) {
        return Err(DubError::Configuration(format!(
            "silence_rms must not be negative, got {}",
            analysis.silence_rms
        )));
    }
    Ok(YinEstimator {
        analysis_rate: analysis.sample_rate,
        hop_size: analysis.hop_size,
        frame_size: analysis.frame_size,
        min_frequency: analysis.min_frequency,
        max_frequency: analysis.max_frequency,
        threshold: analysis.yin_threshold,
        silence_rms: analysis.silence_rms,
    })
}
