mod audio;
mod cli;
mod config;
mod dsp;
mod encode;
mod error;
mod melody;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use cli::Cli;
use config::Settings;
use error::DubError;
use render::assemble::{blend, mix};
use render::pipeline::{analyze_track, build_bank, render_notes};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config = config::read_config(cli.config.as_deref())?;

    let settings = Settings::resolve(&cli, &config)?;
    if cli.dub.is_empty() {
        return Err(DubError::EmptyBank).context("At least one --dub track is required");
    }
    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    log::info!("autodub");
    log::info!("Input: {}", cli.input.display());
    log::info!("Dubs: {}", cli.dub.len());
    match &cli.output {
        Some(path) => log::info!("Output: {}", path.display()),
        None => log::info!("Output: stdout"),
    }

    // 1. Decode
    let rate = settings.sample_rate();
    let source = audio::decode::load_audio(&cli.input, rate)?;
    let dubs = cli
        .dub
        .iter()
        .map(|path| audio::decode::load_audio(path, rate))
        .collect::<Result<Vec<_>>>()?;

    // 2. Melody of the source
    log::info!("Analyzing source melody...");
    let notes = analyze_track(&source, &settings.estimator, &settings.segment)
        .context("Failed to segment the source track")?;

    // 3. Fragment bank
    log::info!("Building fragment bank from {} dub tracks...", dubs.len());
    let bank = build_bank(&dubs, &settings.estimator, &settings.segment, &settings.bank)
        .context("Failed to build the fragment bank")?;

    // 4. Render
    let pb = ProgressBar::new(notes.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} notes ({eta} remaining)")?
            .progress_chars("=>-"),
    );
    let dubbed = render_notes(&notes, &bank, &settings.render, &pb)
        .context("Failed to render notes")?;
    pb.finish_with_message("Rendering complete");

    // 5. Blend
    let output = if settings.blend > 0.0 {
        log::info!("Blending dub {:.2} / original {:.2}", settings.blend, 1.0 - settings.blend);
        let (dub, original) = blend(&dubbed, &source.samples, settings.blend)?;
        mix(&dub, &original)
    } else {
        dubbed
    };

    // 6. Write
    match &cli.output {
        Some(path) => {
            encode::wav::write_wav(path, &output, rate)?;
            log::info!(
                "Done! Wrote {:.1}s to {}",
                output.len() as f32 / rate as f32,
                path.display()
            );
        }
        None => encode::wav::print_samples(&output, std::io::stdout().lock())?,
    }
    Ok(())
}
