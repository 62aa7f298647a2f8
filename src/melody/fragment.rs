use log::{debug, info};
use rand::Rng;

use super::note::{seconds_to_samples, Fragment, Note};
use crate::dsp::transform::reaches;
use crate::error::{DubError, Result};

/// Cut the audio under each note out of `audio`.
///
/// Note times map to sample offsets with `round(t * rate)`; one fragment per
/// note, in note order.
pub fn extract(audio: &[f32], sample_rate: u32, notes: &[Note]) -> Result<Vec<Fragment>> {
    notes
        .iter()
        .map(|note| {
            let start = seconds_to_samples(note.start, sample_rate);
            let end = seconds_to_samples(note.end, sample_rate);
            if end > audio.len() || start > end {
                return Err(DubError::Range {
                    start,
                    end,
                    len: audio.len(),
                });
            }
            Ok(Fragment {
                frequency: note.frequency,
                start: note.start,
                end: note.end,
                audio: audio[start..end].to_vec(),
            })
        })
        .collect()
}

/// The fragment closest in frequency to `target_freq`.
///
/// Ties go to the earliest fragment in `bank`.
pub fn nearest(bank: &[Fragment], target_freq: f32) -> Result<&Fragment> {
    closest(bank.iter(), target_freq).ok_or(DubError::EmptyBank)
}

fn closest<'a>(
    candidates: impl Iterator<Item = &'a Fragment>,
    target_freq: f32,
) -> Option<&'a Fragment> {
    let mut best: Option<(&Fragment, f32)> = None;
    for fragment in candidates {
        let distance = (fragment.frequency - target_freq).abs();
        if distance.is_nan() {
            continue;
        }
        match best {
            Some((_, best_distance)) if !(distance < best_distance) => {}
            _ => best = Some((fragment, distance)),
        }
    }
    best.map(|(fragment, _)| fragment)
}

/// Which dub fragments are allowed into the bank.
///
/// This is the hook for ranking dub material: today it only drops fragments
/// the transformer cannot render.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BankFilter {
    pub include_unvoiced: bool,
    pub min_samples: usize,
}

impl Default for BankFilter {
    fn default() -> Self {
        Self {
            include_unvoiced: false,
            min_samples: 1,
        }
    }
}

impl BankFilter {
    pub fn keep(&self, fragment: &Fragment) -> bool {
        if !self.include_unvoiced && fragment.frequency <= 0.0 {
            return false;
        }
        fragment.audio.len() >= self.min_samples
    }
}

/// Read-only pool of dub fragments shared by every match.
#[derive(Clone, Debug, Default)]
pub struct FragmentBank {
    fragments: Vec<Fragment>,
}

impl FragmentBank {
    /// Concatenate per-track fragment lists in dub order.
    pub fn assemble(per_track: Vec<Vec<Fragment>>, filter: &BankFilter) -> Self {
        let mut fragments = Vec::new();
        for (track, list) in per_track.into_iter().enumerate() {
            let before = fragments.len();
            let total = list.len();
            fragments.extend(list.into_iter().filter(|f| filter.keep(f)));
            debug!(
                "Dub track {}: kept {} of {} fragments",
                track,
                fragments.len() - before,
                total
            );
        }
        info!("Fragment bank holds {} fragments", fragments.len());
        Self { fragments }
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn nearest(&self, target_freq: f32) -> Result<&Fragment> {
        nearest(&self.fragments, target_freq)
    }

    /// Closest fragment that can be pitch shifted to `target_freq`, if any.
    pub fn nearest_reaching(&self, target_freq: f32) -> Result<Option<&Fragment>> {
        if self.is_empty() {
            return Err(DubError::EmptyBank);
        }
        Ok(closest(
            self.fragments
                .iter()
                .filter(|f| reaches(f.frequency, target_freq)),
            target_freq,
        ))
    }

    /// Uniform draw among the fragments that can be pitch shifted to
    /// `target_freq`, if any.
    pub fn random<R: Rng + ?Sized>(
        &self,
        target_freq: f32,
        rng: &mut R,
    ) -> Result<Option<&Fragment>> {
        if self.is_empty() {
            return Err(DubError::EmptyBank);
        }
        let candidates: Vec<&Fragment> = self
            .fragments
            .iter()
            .filter(|f| reaches(f.frequency, target_freq))
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }
        Ok(Some(candidates[rng.random_range(0..candidates.len())]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fragment(frequency: f32, len: usize) -> Fragment {
        Fragment {
            frequency,
            start: 0.0,
            end: 0.0,
            audio: vec![frequency; len],
        }
    }

    fn note(start: f32, end: f32) -> Note {
        Note {
            frequency: 300.0,
            start,
            end,
            sample_rate: 100,
        }
    }

    #[test]
    fn extracts_slices_in_note_order() {
        let audio: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let fragments = extract(&audio, 100, &[note(0.1, 0.2), note(0.5, 0.55)]).unwrap();

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].audio, (10..20).map(|i| i as f32).collect::<Vec<_>>());
        assert_eq!(fragments[1].audio.len(), 5);
        assert_eq!(fragments[1].audio[0], 50.0);
        assert_eq!(fragments[1].frequency, 300.0);
    }

    #[test]
    fn extract_rejects_out_of_range_notes() {
        let audio = vec![0.0; 100];
        assert!(matches!(
            extract(&audio, 100, &[note(0.5, 1.5)]),
            Err(DubError::Range { end: 150, len: 100, .. })
        ));
        assert!(matches!(
            extract(&audio, 100, &[note(0.6, 0.5)]),
            Err(DubError::Range { .. })
        ));
    }

    #[test]
    fn nearest_picks_closest_frequency() {
        let bank = vec![fragment(220.0, 4), fragment(440.0, 4)];
        assert_eq!(nearest(&bank, 430.0).unwrap().frequency, 440.0);
        assert_eq!(nearest(&bank, 300.0).unwrap().frequency, 220.0);
    }

    #[test]
    fn nearest_on_empty_bank_fails() {
        assert_eq!(nearest(&[], 440.0), Err(DubError::EmptyBank));
    }

    #[test]
    fn nearest_breaks_ties_by_first_occurrence() {
        let bank = vec![fragment(200.0, 1), fragment(400.0, 2), fragment(200.0, 3)];
        let first = nearest(&bank, 300.0).unwrap();
        assert_eq!(first.audio.len(), 1);
        let again = nearest(&bank, 300.0).unwrap();
        assert!(std::ptr::eq(first, again));

        let exact = nearest(&bank, 400.0).unwrap();
        assert_eq!((exact.frequency - 400.0).abs(), 0.0);
    }

    #[test]
    fn nearest_is_never_farther_than_best_candidate() {
        let bank: Vec<Fragment> = [110.0, 523.3, 261.6, 98.0, 392.0]
            .iter()
            .map(|&f| fragment(f, 1))
            .collect();
        for target in [50.0, 100.0, 250.0, 300.0, 450.0, 1000.0] {
            let chosen = nearest(&bank, target).unwrap();
            let best = bank
                .iter()
                .map(|f| (f.frequency - target).abs())
                .fold(f32::INFINITY, f32::min);
            assert_eq!((chosen.frequency - target).abs(), best);
        }
    }

    #[test]
    fn bank_concatenates_tracks_and_filters() {
        let first = vec![fragment(220.0, 10), fragment(-1.0, 10), fragment(330.0, 0)];
        let second = vec![fragment(440.0, 10)];
        let bank = FragmentBank::assemble(vec![first, second], &BankFilter::default());

        let freqs: Vec<f32> = bank.fragments().iter().map(|f| f.frequency).collect();
        assert_eq!(freqs, vec![220.0, 440.0]);

        let everything = BankFilter {
            include_unvoiced: true,
            min_samples: 0,
        };
        let first = vec![fragment(220.0, 10), fragment(-1.0, 10), fragment(330.0, 0)];
        assert_eq!(FragmentBank::assemble(vec![first], &everything).len(), 3);
    }

    #[test]
    fn random_choice_is_reproducible_with_seed() {
        let bank = FragmentBank::assemble(
            vec![(1..=8).map(|i| fragment(i as f32 * 100.0, 4)).collect()],
            &BankFilter::default(),
        );
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..16 {
            assert_eq!(
                bank.random(300.0, &mut a).unwrap().unwrap().frequency,
                bank.random(300.0, &mut b).unwrap().unwrap().frequency
            );
        }

        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            FragmentBank::default().random(300.0, &mut rng),
            Err(DubError::EmptyBank)
        );
    }

    #[test]
    fn random_choice_only_draws_reachable_fragments() {
        let bank = FragmentBank::assemble(
            vec![vec![fragment(110.0, 4), fragment(220.0, 4), fragment(440.0, 4), fragment(880.0, 4)]],
            &BankFilter::default(),
        );
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..20 {
                let chosen = bank.random(400.0, &mut rng).unwrap().unwrap();
                assert!(chosen.frequency > 200.0, "drew {} Hz", chosen.frequency);
            }
        }

        let low = FragmentBank::assemble(vec![vec![fragment(100.0, 4)]], &BankFilter::default());
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(low.random(400.0, &mut rng), Ok(None));
    }

    #[test]
    fn nearest_reaching_skips_fragments_too_low() {
        let bank = FragmentBank::assemble(
            vec![vec![fragment(100.0, 4), fragment(1000.0, 4)]],
            &BankFilter::default(),
        );
        assert_eq!(bank.nearest(300.0).unwrap().frequency, 100.0);
        assert_eq!(bank.nearest_reaching(300.0).unwrap().unwrap().frequency, 1000.0);

        let low = FragmentBank::assemble(vec![vec![fragment(220.0, 4)]], &BankFilter::default());
        assert_eq!(low.nearest_reaching(440.0), Ok(None));
        assert_eq!(FragmentBank::default().nearest_reaching(440.0), Err(DubError::EmptyBank));
    }
}
