//! Viterbi segmentation over bytes.
//!
//! Finds the partition of a byte string into known tokens that maximizes the
//! summed log-score. Shared by Unigram training (corpus re-segmentation) and
//! Unigram encoding.

use std::collections::HashMap;

use crate::{
    error::EncodeError,
    types::{ByteSeq, Score},
};

/// Forward DP table over byte positions `0..=n`.
///
/// `best[i]` is the best score of any segmentation of `bytes[..i]` and
/// `back[i]` the start of the last token in it. Rebuilt per call.
#[derive(Debug)]
struct Lattice {
    best: Vec<Score>,
    back: Vec<usize>,
}

impl Lattice {
    /// Forward pass.
    ///
    /// Only tokens of at most `max_len` bytes are tried at each end position.
    /// On equal scores the earliest start (the longest token) is kept.
    fn forward(
        bytes: &[u8],
        scores: &HashMap<ByteSeq, Score>,
        max_len: usize,
    ) -> Result<Self, EncodeError> {
        let n = bytes.len();
        let mut best = vec![Score::NEG_INFINITY; n + 1];
        let mut back = vec![0; n + 1];
        best[0] = 0.0;

        for end in 1..=n {
            for start in end.saturating_sub(max_len)..end {
                if best[start] == Score::NEG_INFINITY {
                    continue;
                }
                if let Some(&score) = scores.get(&bytes[start..end]) {
                    let candidate = best[start] + score;
                    if candidate > best[end] {
                        best[end] = candidate;
                        back[end] = start;
                    }
                }
            }

            // best[end - 1] is reachable here, so the last byte itself is unknown.
            if best[end] == Score::NEG_INFINITY {
                return Err(EncodeError::UnscorableByte {
                    byte: bytes[end - 1],
                    offset: end - 1,
                });
            }
        }

        Ok(Self { best, back })
    }

    /// Follows backpointers from the end, returning tokens in forward order.
    fn backtrack<'a>(&self, bytes: &'a [u8]) -> Vec<&'a [u8]> {
        let mut tokens = Vec::new();
        let mut end = bytes.len();

        while end > 0 {
            let start = self.back[end];
            tokens.push(&bytes[start..end]);
            end = start;
        }

        tokens.reverse();
        tokens
    }

    fn total(&self) -> Score {
        self.best.last().copied().unwrap_or(0.0)
    }
}

/// Best segmentation of `bytes` and its total score.
///
/// `max_len` must be at least the longest key in `scores`.
///
/// # Errors
///
/// Returns [`EncodeError::UnscorableByte`] for the first byte no token covers.
pub(crate) fn segment<'a>(
    bytes: &'a [u8],
    scores: &HashMap<ByteSeq, Score>,
    max_len: usize,
) -> Result<(Vec<&'a [u8]>, Score), EncodeError> {
    let lattice = Lattice::forward(bytes, scores, max_len)?;
    Ok((lattice.backtrack(bytes), lattice.total()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, Score)]) -> HashMap<ByteSeq, Score> {
        entries
            .iter()
            .map(|&(t, s)| (t.as_bytes().to_vec(), s))
            .collect()
    }

    #[test]
    fn test_prefers_higher_total_score() {
        let scores = table(&[("a", -1.0), ("b", -1.0), ("ab", -1.5)]);
        let (tokens, total) = segment(b"abab", &scores, 2).expect("all bytes are known");
        assert_eq!(tokens, vec![&b"ab"[..], &b"ab"[..]]);
        assert!((total - -3.0).abs() < 1e-12);
    }

    #[test]
    fn test_falls_back_to_single_bytes() {
        let scores = table(&[("a", -1.0), ("b", -1.0), ("ab", -5.0)]);
        let (tokens, _) = segment(b"ab", &scores, 2).expect("all bytes are known");
        assert_eq!(tokens, vec![&b"a"[..], &b"b"[..]]);
    }

    #[test]
    fn test_tie_keeps_longest_token() {
        let scores = table(&[("a", -1.0), ("aa", -2.0)]);
        let (tokens, _) = segment(b"aa", &scores, 2).expect("all bytes are known");
        assert_eq!(tokens, vec![&b"aa"[..]]);
    }

    #[test]
    fn test_window_limits_token_length() {
        let scores = table(&[("a", -1.0), ("aaa", -0.1)]);
        let (tokens, _) = segment(b"aaa", &scores, 2).expect("all bytes are known");
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_empty_input() {
        let scores = table(&[("a", -1.0)]);
        let (tokens, total) = segment(b"", &scores, 1).expect("nothing to score");
        assert!(tokens.is_empty());
        assert_eq!(total, 0.0);
    }

    #[test]
    fn test_unscorable_byte() {
        let scores = table(&[("a", -1.0), ("b", -1.0)]);
        let err = segment(b"abzab", &scores, 1).expect_err("z has no score");
        assert_eq!(err, EncodeError::UnscorableByte { byte: b'z', offset: 2 });
    }
}
