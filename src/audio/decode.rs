use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::dsp::resample::resample;
use crate::encode::wav::write_wav;

/// Mono samples at a known rate.
#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioData {
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Load a track as mono audio at `sample_rate`.
///
/// mp3 inputs are transcoded to a sibling wav first and that file is loaded.
pub fn load_audio(path: &Path, sample_rate: u32) -> Result<AudioData> {
    let path = if is_mp3(path) {
        transcode_mp3(path)?
    } else {
        path.to_path_buf()
    };

    let decoded = decode_audio(&path)?;
    if decoded.sample_rate == sample_rate {
        return Ok(decoded);
    }

    log::info!(
        "Resampling {} from {}Hz to {}Hz",
        path.display(),
        decoded.sample_rate,
        sample_rate
    );
    let samples = resample(&decoded.samples, decoded.sample_rate, sample_rate)
        .with_context(|| format!("Failed to resample {}", path.display()))?;
    Ok(AudioData {
        samples,
        sample_rate,
    })
}

pub fn is_mp3(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("mp3"))
}

/// `song.mp3` -> `song.wav`, in the same directory.
pub fn sibling_wav(path: &Path) -> PathBuf {
    path.with_extension("wav")
}

/// Decode an mp3 and write it next to the original as a wav file.
///
/// Returns the path of the new wav.
pub fn transcode_mp3(path: &Path) -> Result<PathBuf> {
    let audio = decode_audio(path)?;
    let wav_path = sibling_wav(path);
    write_wav(&wav_path, &audio.samples, audio.sample_rate)
        .with_context(|| format!("Failed to transcode {}", path.display()))?;
    log::info!("Transcoded {} -> {}", path.display(), wav_path.display());
    Ok(wav_path)
}

/// Decode the first audio track of any supported container, downmixed to mono.
pub fn decode_audio(path: &Path) -> Result<AudioData> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe audio format of {}", path.display()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        downmix_into(sample_buf.samples(), channels, &mut mono);
    }

    log::info!(
        "Decoded {}: {} samples, {}Hz, {:.1}s",
        path.display(),
        mono.len(),
        sample_rate,
        mono.len() as f32 / sample_rate as f32
    );

    Ok(AudioData {
        samples: mono,
        sample_rate,
    })
}

/// Average interleaved frames down to one channel.
fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}
