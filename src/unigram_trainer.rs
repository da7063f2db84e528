//! Unigram training: frequency seeding followed by Viterbi-driven pruning.
//!
//! 1. Every substring of at most `window` bytes is a candidate. By default each
//!    distinct candidate counts once, so all start at `ln(1 / candidates)`;
//!    [`SeedScoring::Frequency`] weights them by occurrence instead.
//! 2. While the table is too large, the corpus is re-segmented with the current
//!    scores and the least used multi-byte tokens are dropped.
//!
//! Scores are never re-estimated after seeding.

use std::collections::HashMap;

use log::{debug, warn};
use rayon::prelude::*;

use crate::{
    config::{SeedScoring, BYTE_VOCAB_SIZE},
    error::TrainError,
    types::{ByteSeq, Score, TokenFreq},
    viterbi,
};

/// Merges two partial count maps, folding the smaller into the larger.
fn merge_counts<'a>(
    mut a: HashMap<&'a [u8], TokenFreq>,
    mut b: HashMap<&'a [u8], TokenFreq>,
) -> HashMap<&'a [u8], TokenFreq> {
    if a.len() < b.len() {
        std::mem::swap(&mut a, &mut b);
    }
    for (token, count) in b {
        *a.entry(token).or_insert(0) += count;
    }
    a
}

/// Counts every substring of 1..=`window` bytes, in parallel over start offsets.
fn count_windows(bytes: &[u8], window: usize) -> HashMap<&[u8], TokenFreq> {
    let n = bytes.len();
    (0..n)
        .into_par_iter()
        .fold(HashMap::new, |mut acc, start| {
            let stop = (start + window).min(n);
            for end in start + 1..=stop {
                *acc.entry(&bytes[start..end]).or_insert(0) += 1;
            }
            acc
        })
        .reduce(HashMap::new, merge_counts)
}

/// Counts how often each token appears in a segmentation.
fn count_tokens<'a>(tokens: &[&'a [u8]]) -> HashMap<&'a [u8], TokenFreq> {
    tokens
        .par_iter()
        .fold(HashMap::new, |mut acc, &token| {
            *acc.entry(token).or_insert(0) += 1;
            acc
        })
        .reduce(HashMap::new, merge_counts)
}

/// Score table under construction.
#[derive(Debug)]
pub(crate) struct UnigramTrainer {
    scores: HashMap<ByteSeq, Score>,

    /// Longest key in `scores`; bounds the Viterbi scan.
    max_len: usize,
}

impl UnigramTrainer {
    /// Seeds candidates from `bytes`.
    ///
    /// `score = ln(weight / total)`, where `weight` is 1 under
    /// [`SeedScoring::Uniform`] and the occurrence count under
    /// [`SeedScoring::Frequency`], and `total` sums all weights. With
    /// `byte_fallback`, byte values absent from the corpus get half a pseudo-count
    /// so they score below every observed token.
    pub(crate) fn seed(bytes: &[u8], window: usize, scoring: SeedScoring, byte_fallback: bool) -> Self {
        let counts: HashMap<&[u8], TokenFreq> = match scoring {
            SeedScoring::Uniform => count_windows(bytes, window)
                .into_keys()
                .map(|token| (token, 1))
                .collect(),
            SeedScoring::Frequency => count_windows(bytes, window),
        };
        let total: TokenFreq = counts.values().sum();
        let denom = total.max(1) as Score;

        let mut scores: HashMap<ByteSeq, Score> = counts
            .into_iter()
            .map(|(token, count)| (token.to_vec(), (count as Score / denom).ln()))
            .collect();

        if byte_fallback {
            let floor = (0.5 / denom).ln();
            for b in 0..BYTE_VOCAB_SIZE {
                scores.entry(vec![b as u8]).or_insert(floor);
            }
        }

        let max_len = scores.keys().map(Vec::len).max().unwrap_or(0);
        debug!(
            "seeded {} candidates ({:?} scoring, total weight {}, max length {})",
            scores.len(),
            scoring,
            total,
            max_len
        );

        Self { scores, max_len }
    }

    pub(crate) fn len(&self) -> usize {
        self.scores.len()
    }

    /// Runs one pruning pass toward `vocab_size` over the corpus `bytes`.
    ///
    /// Returns the number of tokens removed; zero means only protected
    /// single-byte tokens are left above target.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::Segmentation`] if the corpus cannot be segmented,
    /// which only happens when `bytes` is not the corpus the table was seeded from.
    pub(crate) fn prune_pass(&mut self, bytes: &[u8], vocab_size: usize) -> Result<usize, TrainError> {
        let excess = self.scores.len().saturating_sub(vocab_size);
        if excess == 0 {
            return Ok(0);
        }

        let (tokens, _) = viterbi::segment(bytes, &self.scores, self.max_len)?;
        let freqs = count_tokens(&tokens);

        // Ascending by observed frequency, ties in byte order.
        let mut ranked: Vec<(TokenFreq, &ByteSeq)> = self
            .scores
            .keys()
            .filter(|token| token.len() > 1)
            .map(|token| (freqs.get(token.as_slice()).copied().unwrap_or(0), token))
            .collect();
        ranked.sort_unstable();

        let doomed: Vec<ByteSeq> = ranked
            .into_iter()
            .take(excess)
            .map(|(_, token)| token.clone())
            .collect();

        for token in &doomed {
            self.scores.remove(token);
        }
        debug!(
            "pruned {} tokens ({} segments in corpus), {} remain",
            doomed.len(),
            tokens.len(),
            self.scores.len()
        );

        Ok(doomed.len())
    }

    /// Prunes until the table fits `vocab_size` or a pass makes no progress.
    ///
    /// `on_pass` receives the table size after every pass.
    pub(crate) fn prune(
        &mut self,
        bytes: &[u8],
        vocab_size: usize,
        mut on_pass: impl FnMut(usize),
    ) -> Result<(), TrainError> {
        while self.scores.len() > vocab_size {
            let removed = self.prune_pass(bytes, vocab_size)?;
            on_pass(self.scores.len());
            if removed == 0 {
                warn!(
                    "no more tokens to prune: {} single-byte tokens exceed target {}",
                    self.scores.len(),
                    vocab_size
                );
                break;
            }
        }
        Ok(())
    }

    /// Final table with tokens in ascending byte order.
    pub(crate) fn into_sorted(self) -> Vec<(ByteSeq, Score)> {
        let mut entries: Vec<(ByteSeq, Score)> = self.scores.into_iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(bytes: &[u8], window: usize) -> UnigramTrainer {
        UnigramTrainer::seed(bytes, window, SeedScoring::Uniform, false)
    }

    #[test]
    fn test_seed_scores_distinct_candidates_uniformly() {
        let trainer = seed(b"abab", 14);
        // a, b, ab, ba, aba, bab, abab
        assert_eq!(trainer.len(), 7);
        let uniform = (1.0_f64 / 7.0).ln();
        for score in trainer.scores.values() {
            assert!((score - uniform).abs() < 1e-12);
        }
        assert_eq!(trainer.max_len, 4);
    }

    #[test]
    fn test_seed_frequency_scoring_counts_every_window() {
        let trainer = UnigramTrainer::seed(b"abab", 14, SeedScoring::Frequency, false);
        assert_eq!(trainer.len(), 7);
        // 4 + 3 + 2 + 1 windows in total; "a" occurs twice.
        let a = trainer.scores[&b"a".to_vec()];
        let abab = trainer.scores[&b"abab".to_vec()];
        assert!((a - (2.0_f64 / 10.0).ln()).abs() < 1e-12);
        assert!((abab - (1.0_f64 / 10.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_seed_respects_window() {
        let trainer = seed(b"abcdef", 2);
        assert!(trainer.scores.keys().all(|t| t.len() <= 2));
        assert_eq!(trainer.len(), 6 + 5);
    }

    #[test]
    fn test_seed_byte_fallback_covers_alphabet() {
        let trainer = UnigramTrainer::seed(b"ab", 14, SeedScoring::Uniform, true);
        for b in 0..=255u8 {
            assert!(trainer.scores.contains_key(&vec![b]));
        }
        let seen = trainer.scores[&b"a".to_vec()];
        let unseen = trainer.scores[&b"z".to_vec()];
        assert!((seen - (1.0_f64 / 3.0).ln()).abs() < 1e-12);
        assert!((unseen - (0.5_f64 / 3.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_prune_keeps_single_bytes() {
        let mut trainer = seed(b"abab", 14);
        trainer.prune(b"abab", 3, |_| {}).expect("corpus is segmentable");
        let entries = trainer.into_sorted();
        let tokens: Vec<&[u8]> = entries.iter().map(|(t, _)| t.as_slice()).collect();
        // "abab" is the only token the segmentation used.
        assert_eq!(tokens, vec![&b"a"[..], &b"abab"[..], &b"b"[..]]);
    }

    #[test]
    fn test_prune_stops_when_only_bytes_remain() {
        let mut trainer = seed(b"abcabc", 3);
        let mut passes = 0;
        trainer
            .prune(b"abcabc", 2, |_| passes += 1)
            .expect("corpus is segmentable");
        assert_eq!(trainer.len(), 3);
        assert!(trainer.scores.keys().all(|t| t.len() == 1));
        assert_eq!(passes, 2);
    }

    #[test]
    fn test_prune_ties_break_in_byte_order() {
        // Segmentation is ab|cd; bc is unused, then ab beats cd on bytes.
        let mut trainer = seed(b"abcd", 2);
        assert_eq!(trainer.len(), 7);
        let removed = trainer.prune_pass(b"abcd", 5).expect("corpus is segmentable");
        assert_eq!(removed, 2);
        let entries = trainer.into_sorted();
        let tokens: Vec<&[u8]> = entries.iter().map(|(t, _)| t.as_slice()).collect();
        assert_eq!(tokens, vec![&b"a"[..], &b"b"[..], &b"c"[..], &b"cd"[..], &b"d"[..]]);
    }

    #[test]
    fn test_count_tokens() {
        let tokens: Vec<&[u8]> = vec![b"ab", b"c", b"ab"];
        let freqs = count_tokens(&tokens);
        assert_eq!(freqs[&b"ab"[..]], 2);
        assert_eq!(freqs[&b"c"[..]], 1);
    }
}
