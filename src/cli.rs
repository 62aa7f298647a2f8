use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_WEIGHT: f32 = 0.3;
pub const DEFAULT_THRESHOLD: f32 = 0.4;
pub const DEFAULT_BLEND: f32 = 0.0;

#[derive(Parser, Debug)]
#[command(
    name = "autodub",
    about = "Re-sing the melody of a track with audio cut from other tracks"
)]
pub struct Cli {
    /// Source audio file whose melody is followed (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Output WAV file. Samples go to stdout, one per line, when omitted
    pub output: Option<PathBuf>,

    /// Dub audio files that provide the sound
    #[arg(short, long, num_args = 1..)]
    pub dub: Vec<PathBuf>,

    /// Weight of older contour samples in the note admission test, in (0, 0.5)
    #[arg(short, long, default_value_t = DEFAULT_WEIGHT)]
    pub weight: f32,

    /// Admission threshold for extending a note, in (0, 1)
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f32,

    /// Pick dub fragments at random instead of by nearest pitch
    #[arg(short, long)]
    pub random: bool,

    /// Seed for --random
    #[arg(long)]
    pub seed: Option<u64>,

    /// Share of the dub in the output; the rest is the source track. 0 disables blending
    #[arg(short, long, default_value_t = DEFAULT_BLEND)]
    pub blend: f32,

    /// Config file (default: ./autodub.toml or ~/.config/autodub/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_command_line() {
        let cli = Cli::try_parse_from([
            "autodub", "song.wav", "out.wav", "-d", "a.wav", "b.mp3", "-w", "0.2", "-t", "0.5",
            "-r", "--seed", "9", "-b", "0.25",
        ])
        .unwrap();
        assert_eq!(cli.input, PathBuf::from("song.wav"));
        assert_eq!(cli.output, Some(PathBuf::from("out.wav")));
        assert_eq!(cli.dub, vec![PathBuf::from("a.wav"), PathBuf::from("b.mp3")]);
        assert_eq!(cli.weight, 0.2);
        assert_eq!(cli.threshold, 0.5);
        assert!(cli.random);
        assert_eq!(cli.seed, Some(9));
        assert_eq!(cli.blend, 0.25);
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["autodub", "song.wav"]).unwrap();
        assert!(cli.output.is_none());
        assert!(cli.dub.is_empty());
        assert_eq!(cli.weight, DEFAULT_WEIGHT);
        assert_eq!(cli.threshold, DEFAULT_THRESHOLD);
        assert_eq!(cli.blend, DEFAULT_BLEND);
        assert!(!cli.random);
        assert!(cli.config.is_none());
    }

    #[test]
    fn input_is_required() {
        assert!(Cli::try_parse_from(["autodub"]).is_err());
    }
}
