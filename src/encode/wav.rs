use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Write;
use std::path::Path;

/// Write mono 32-bit float WAV.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    writer
        .finalize()
        .with_context(|| format!("Failed to finalize {}", path.display()))?;
    Ok(())
}

/// One sample per line.
pub fn print_samples<W: Write>(samples: &[f32], out: W) -> Result<()> {
    let mut out = std::io::BufWriter::new(out);
    for sample in samples {
        writeln!(out, "{}", sample).context("Failed to write samples")?;
    }
    out.flush().context("Failed to flush samples")?;
    Ok(())
}
