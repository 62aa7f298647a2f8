//! Note-by-note retargeting of the source melody onto dub material.

use indicatif::ProgressBar;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use super::assemble::{concatenate_windowed, generate_silence};
use crate::audio::decode::AudioData;
use crate::audio::pitch::FrequencyEstimator;
use crate::dsp::spectral::StftConfig;
use crate::dsp::transform::{pitch_shift, reaches, time_shift};
use crate::error::Result;
use crate::melody::fragment::{extract, BankFilter, FragmentBank};
use crate::melody::note::{Fragment, Note};
use crate::melody::segment::{segment_with, SegmentParams};

/// How a source note picks its dub fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Closest representative frequency.
    Nearest,
    /// Uniform draw from the bank, reproducible for a given seed.
    Random { seed: u64 },
}

#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub stft: StftConfig,
    pub crossfade_hop: usize,
    pub strategy: MatchStrategy,
}

/// Detect and segment the melody of one track.
pub fn analyze_track(
    audio: &AudioData,
    estimator: &dyn FrequencyEstimator,
    params: &SegmentParams,
) -> Result<Vec<Note>> {
    let contour = estimator.contour(&audio.samples, audio.sample_rate)?;
    let notes = segment_with(&contour, params, audio.sample_rate);
    info!(
        "Segmented {:.1}s of audio into {} notes",
        audio.duration(),
        notes.len()
    );
    Ok(notes)
}

/// Segment every dub track and pool the resulting fragments, in dub order.
pub fn build_bank(
    dubs: &[AudioData],
    estimator: &dyn FrequencyEstimator,
    params: &SegmentParams,
    filter: &BankFilter,
) -> Result<FragmentBank> {
    let per_track = dubs
        .iter()
        .map(|dub| {
            let notes = analyze_track(dub, estimator, params)?;
            extract(&dub.samples, dub.sample_rate, &notes)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(FragmentBank::assemble(per_track, filter))
}

/// Choose a fragment for every note that needs one.
///
/// Unvoiced notes and notes shorter than one sample get `None` and never
/// touch the bank. Only fragments above half the note's frequency can be
/// shifted onto it: in nearest mode a nearest fragment below that falls back
/// to the nearest one above, and a note no fragment can reach gets `None`
/// and is rendered as silence.
pub fn match_notes<'a>(
    notes: &[Note],
    bank: &'a FragmentBank,
    strategy: MatchStrategy,
) -> Result<Vec<Option<&'a Fragment>>> {
    let mut rng = match strategy {
        MatchStrategy::Random { seed } => Some(StdRng::seed_from_u64(seed)),
        MatchStrategy::Nearest => None,
    };

    notes
        .iter()
        .map(|note| {
            if note.is_unvoiced() || note.target_len() == 0 {
                return Ok(None);
            }
            let fragment = match rng.as_mut() {
                Some(rng) => bank.random(note.frequency, rng)?,
                None => {
                    let nearest = bank.nearest(note.frequency)?;
                    if reaches(nearest.frequency, note.frequency) {
                        Some(nearest)
                    } else {
                        let fallback = bank.nearest_reaching(note.frequency)?;
                        if let Some(fallback) = fallback {
                            warn!(
                                "Nearest fragment at {:.1} Hz cannot reach {:.1} Hz, using {:.1} Hz",
                                nearest.frequency, note.frequency, fallback.frequency
                            );
                        }
                        fallback
                    }
                }
            };
            if fragment.is_none() {
                warn!(
                    "No dub fragment can reach {:.1} Hz, note at {:.3}s is left silent",
                    note.frequency, note.start
                );
            }
            Ok(fragment)
        })
        .collect()
}

/// Render one note: silence when unvoiced or unmatched, otherwise the
/// fragment moved to the note's pitch and stretched to its length.
pub fn render_note(note: &Note, fragment: Option<&Fragment>, stft: &StftConfig) -> Result<Vec<f32>> {
    let Some(fragment) = fragment.filter(|_| !note.is_unvoiced()) else {
        return Ok(generate_silence(note.duration(), note.sample_rate));
    };

    debug!(
        "Note {:.3}s-{:.3}s at {:.1} Hz <- fragment at {:.1} Hz ({} samples)",
        note.start,
        note.end,
        note.frequency,
        fragment.frequency,
        fragment.audio.len()
    );
    let shifted = pitch_shift(
        &fragment.audio,
        fragment.frequency,
        note.frequency,
        note.sample_rate,
        stft,
    )?;
    time_shift(&shifted, note.target_len(), stft)
}

/// Render every source note and join them into one track.
///
/// Notes are transformed in parallel; the segments are reassembled in note
/// order before the cross-fade.
pub fn render_notes(
    notes: &[Note],
    bank: &FragmentBank,
    settings: &RenderSettings,
    progress: &ProgressBar,
) -> Result<Vec<f32>> {
    let choices = match_notes(notes, bank, settings.strategy)?;

    let segments: Vec<Vec<f32>> = notes
        .par_iter()
        .zip(choices.par_iter())
        .map(|(note, fragment)| {
            let rendered = render_note(note, *fragment, &settings.stft);
            progress.inc(1);
            rendered
        })
        .collect::<Result<_>>()?;

    let segments: Vec<Vec<f32>> = segments.into_iter().filter(|s| !s.is_empty()).collect();
    info!(
        "Joining {} segments with a {} sample cross-fade",
        segments.len(),
        settings.crossfade_hop
    );
    concatenate_windowed(&segments, settings.crossfade_hop, &settings.stft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DubError;

    const RATE: u32 = 44100;

    fn tone(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.4 * (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin())
            .collect()
    }

    fn fragment(freq: f32) -> Fragment {
        Fragment {
            frequency: freq,
            start: 0.0,
            end: 0.25,
            audio: tone(freq, RATE as usize / 4),
        }
    }

    fn note(frequency: f32, start: f32, end: f32) -> Note {
        Note {
            frequency,
            start,
            end,
            sample_rate: RATE,
        }
    }

    fn settings(strategy: MatchStrategy) -> RenderSettings {
        RenderSettings {
            stft: StftConfig::default(),
            crossfade_hop: 12,
            strategy,
        }
    }

    fn bank() -> FragmentBank {
        FragmentBank::assemble(
            vec![vec![fragment(220.0)], vec![fragment(440.0)]],
            &BankFilter::default(),
        )
    }

    #[test]
    fn unvoiced_note_renders_silence_without_matching() {
        let empty = FragmentBank::default();
        let notes = [note(-1.0, 0.0, 0.5)];
        let out = render_notes(
            &notes,
            &empty,
            &settings(MatchStrategy::Nearest),
            &ProgressBar::hidden(),
        )
        .unwrap();
        assert_eq!(out.len(), 22050);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn matches_nearest_fragment() {
        let bank = bank();
        let notes = [note(430.0, 0.0, 0.2), note(-1.0, 0.3, 0.4), note(230.0, 0.5, 0.6)];
        let choices = match_notes(&notes, &bank, MatchStrategy::Nearest).unwrap();
        assert_eq!(choices[0].unwrap().frequency, 440.0);
        assert!(choices[1].is_none());
        assert_eq!(choices[2].unwrap().frequency, 220.0);
    }

    #[test]
    fn voiced_note_without_bank_fails() {
        let empty = FragmentBank::default();
        let notes = [note(440.0, 0.0, 0.2)];
        assert_eq!(
            match_notes(&notes, &empty, MatchStrategy::Nearest).unwrap_err(),
            DubError::EmptyBank
        );
    }

    #[test]
    fn random_matching_is_seeded() {
        let bank = bank();
        let notes: Vec<Note> = (0..10)
            .map(|i| note(300.0, i as f32 * 0.1, i as f32 * 0.1 + 0.05))
            .collect();
        let a = match_notes(&notes, &bank, MatchStrategy::Random { seed: 3 }).unwrap();
        let b = match_notes(&notes, &bank, MatchStrategy::Random { seed: 3 }).unwrap();
        let freqs = |c: &[Option<&Fragment>]| c.iter().map(|f| f.unwrap().frequency).collect::<Vec<_>>();
        assert_eq!(freqs(&a), freqs(&b));
    }

    #[test]
    fn rendered_track_covers_every_note() {
        let bank = bank();
        let notes = [
            note(430.0, 0.0, 0.2),
            note(-1.0, 0.25, 0.3),
            note(250.0, 0.35, 0.5),
            // single-frame note, zero length
            note(260.0, 0.55, 0.55),
        ];
        let out = render_notes(
            &notes,
            &bank,
            &settings(MatchStrategy::Nearest),
            &ProgressBar::hidden(),
        )
        .unwrap();

        let expected: usize = notes.iter().map(|n| n.target_len()).sum();
        assert_eq!(out.len(), expected);
        assert!(out.iter().all(|s| s.is_finite()));
        assert!(out[1000..8000].iter().any(|s| s.abs() > 0.05));
    }

    #[test]
    fn render_note_hits_target_length() {
        let source = note(400.0, 0.1, 0.35);
        let dub = fragment(440.0);
        let out = render_note(&source, Some(&dub), &StftConfig::default()).unwrap();
        assert_eq!(out.len(), source.target_len());
    }

    #[test]
    fn nearest_falls_back_to_a_reachable_fragment() {
        let bank = FragmentBank::assemble(
            vec![vec![fragment(100.0), fragment(1000.0)]],
            &BankFilter::default(),
        );
        let notes = [note(300.0, 0.0, 0.1)];
        let choices = match_notes(&notes, &bank, MatchStrategy::Nearest).unwrap();
        assert_eq!(choices[0].unwrap().frequency, 1000.0);

        let out = render_notes(
            &notes,
            &bank,
            &settings(MatchStrategy::Nearest),
            &ProgressBar::hidden(),
        )
        .unwrap();
        assert_eq!(out.len(), notes[0].target_len());
    }

    #[test]
    fn unreachable_note_renders_silence() {
        let bank = FragmentBank::assemble(vec![vec![fragment(220.0)]], &BankFilter::default());
        let notes = [note(440.0, 0.0, 0.1), note(230.0, 0.1, 0.2)];
        let choices = match_notes(&notes, &bank, MatchStrategy::Nearest).unwrap();
        assert!(choices[0].is_none());
        assert!(choices[1].is_some());

        let out = render_notes(
            &notes,
            &bank,
            &settings(MatchStrategy::Nearest),
            &ProgressBar::hidden(),
        )
        .unwrap();
        let first = notes[0].target_len();
        assert_eq!(out.len(), first + notes[1].target_len());
        // the cross-fade only reaches 12 samples into the silent note's tail
        assert!(out[..first - 12].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn random_renders_never_abort_on_a_wide_bank() {
        let bank = FragmentBank::assemble(
            vec![vec![fragment(110.0), fragment(220.0), fragment(440.0), fragment(880.0)]],
            &BankFilter::default(),
        );
        let notes: Vec<Note> = (0..20)
            .map(|i| note(400.0, i as f32 * 0.05, (i + 1) as f32 * 0.05))
            .collect();
        for seed in 0..20 {
            let choices = match_notes(&notes, &bank, MatchStrategy::Random { seed }).unwrap();
            assert!(choices.iter().all(|c| c.unwrap().frequency > 200.0));
        }
        let out = render_notes(
            &notes,
            &bank,
            &settings(MatchStrategy::Random { seed: 5 }),
            &ProgressBar::hidden(),
        )
        .unwrap();
        let expected: usize = notes.iter().map(|n| n.target_len()).sum();
        assert_eq!(out.len(), expected);
    }
}
