//! BPE Converter - applies learned merge rules to byte token sequences.
//!
//! Rules are applied strictly in the order they were learned. A min-heap keyed
//! by (merge order, position) replays the same rewrites as running one
//! left-to-right, non-overlapping pass per rule, without the per-rule rescan:
//! a merge at order `k` only creates pairs containing the new token, and every
//! rule mentioning that token was learned after `k`.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
};

use crate::types::{MergeOrder, MergeRule, Token, TokenPair};

/// Item in the priority queue for merge ordering.
///
/// Candidates are ordered by merge_order (earliest first) with position
/// as a tiebreaker (leftmost first).
#[derive(Debug, PartialEq, Eq)]
struct MergeCandidate {
    /// Merge order from training (0 = first merge, 1 = second merge, etc.).
    merge_order: MergeOrder,

    /// The token pair to be merged.
    pair: TokenPair,

    /// Position in the token sequence where this pair starts.
    position: usize,
}

impl PartialOrd for MergeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // We reverse the comparison (other vs self) to create min-heap behavior
        // from Rust's max-heap BinaryHeap.
        other
            .merge_order
            .cmp(&self.merge_order)
            .then_with(|| other.position.cmp(&self.position))
    }
}

/// Applies learned merge rules to token sequences.
///
/// # Time Complexity
///
/// Encoding is O(N log N) where N is the input token sequence length.
#[derive(Debug, Clone, Default)]
pub(crate) struct BPEConverter {
    /// Maps token pairs to (merged_token, merge_order).
    merges: HashMap<TokenPair, (Token, MergeOrder)>,
}

impl BPEConverter {
    /// Creates a converter from a merge table.
    ///
    /// The slice order is the merge priority (earlier = higher priority).
    pub(crate) fn new(merges: &[MergeRule]) -> Self {
        let merges = merges
            .iter()
            .enumerate()
            .map(|(order, rule)| (rule.pair(), (rule.id, order)))
            .collect();
        Self { merges }
    }

    /// Encodes a token sequence by applying learned BPE merge rules.
    ///
    /// The output has the same or fewer tokens than the input.
    pub(crate) fn encode(&self, tokens: Vec<Token>) -> Vec<Token> {
        if tokens.len() <= 1 || self.merges.is_empty() {
            return tokens;
        }

        let mut heap = BinaryHeap::new();

        // results[pos] = Some(token) | None
        // None indicates consumed by a prev merge
        let mut results: Vec<Option<Token>> = tokens.iter().map(|&t| Some(t)).collect();

        self.initialize_minheap(&tokens, &mut heap);

        while let Some(candidate) = heap.pop() {
            let pos = candidate.position;

            let Some(left) = results.get(pos).copied().flatten() else {
                continue;
            };

            // the left token may itself be a merge, so pos+1 can be consumed.
            let mut right_idx = pos + 1;
            while matches!(results.get(right_idx), Some(None)) {
                right_idx += 1;
            }
            let Some(right) = results.get(right_idx).copied().flatten() else {
                continue;
            };

            // validate live pair
            if candidate.pair != TokenPair(left, right) {
                continue;
            }

            let Some(&(merge_tok, _order)) = self.merges.get(&candidate.pair) else {
                continue;
            };

            results[pos] = Some(merge_tok);
            results[right_idx] = None;

            self.track_new_merge_candidate(&mut heap, &results, pos, merge_tok, true);
            self.track_new_merge_candidate(&mut heap, &results, pos, merge_tok, false);
        }

        results.into_iter().flatten().collect()
    }

    /// Adds new merge candidates to the priority queue after a successful merge.
    ///
    /// * `check_left` - If true, checks left neighbor; otherwise checks right neighbor.
    fn track_new_merge_candidate(
        &self,
        heap: &mut BinaryHeap<MergeCandidate>,
        results: &[Option<Token>],
        pos: usize,
        merged_tok: Token,
        check_left: bool,
    ) {
        let n = results.len();
        let mut idx;

        if check_left {
            if pos == 0 {
                return;
            }
            idx = pos - 1;
            while idx > 0 && matches!(results.get(idx), Some(None)) {
                idx -= 1;
            }
        } else {
            idx = pos + 1;
            while idx < n && matches!(results.get(idx), Some(None)) {
                idx += 1;
            }
        }

        let Some(&Some(tok)) = results.get(idx) else {
            return;
        };

        let pair = if check_left {
            TokenPair(tok, merged_tok)
        } else {
            TokenPair(merged_tok, tok)
        };

        if let Some(&(_merge_tok, merge_order)) = self.merges.get(&pair) {
            let position = if check_left { idx } else { pos };
            heap.push(MergeCandidate {
                merge_order,
                pair,
                position,
            });
        }
    }

    /// Populates the priority queue with all initial mergeable pairs.
    fn initialize_minheap(&self, tokens: &[Token], heap: &mut BinaryHeap<MergeCandidate>) {
        for (i, w) in tokens.windows(2).enumerate() {
            let pair = TokenPair(w[0], w[1]);
            if let Some(&(_, merge_order)) = self.merges.get(&pair) {
                heap.push(MergeCandidate {
                    merge_order,
                    pair,
                    position: i,
                });
            }
        }
    }

    /// Returns the total number of merge rules in this converter.
    pub(crate) fn num_merges(&self) -> usize {
        self.merges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(history: &[((Token, Token), Token)]) -> Vec<MergeRule> {
        history
            .iter()
            .map(|&((left, right), id)| MergeRule { left, right, id })
            .collect()
    }

    /// One left-to-right, non-overlapping pass per rule, in rule order.
    fn multi_pass(merges: &[MergeRule], mut tokens: Vec<Token>) -> Vec<Token> {
        for rule in merges {
            let mut next = Vec::with_capacity(tokens.len());
            let mut k = 0;
            while k < tokens.len() {
                if k + 1 < tokens.len() && tokens[k] == rule.left && tokens[k + 1] == rule.right {
                    next.push(rule.id);
                    k += 2;
                } else {
                    next.push(tokens[k]);
                    k += 1;
                }
            }
            tokens = next;
        }
        tokens
    }

    #[test]
    fn test_basic_encoding() {
        let converter = BPEConverter::new(&rules(&[((0, 1), 2), ((2, 0), 3)]));
        assert_eq!(converter.encode(vec![0, 1, 0]), vec![3]);
    }

    #[test]
    fn test_single_token_no_change() {
        let converter = BPEConverter::new(&rules(&[((0, 1), 2)]));
        assert_eq!(converter.encode(vec![7]), vec![7]);
    }

    #[test]
    fn test_no_merge_rules_apply() {
        let converter = BPEConverter::new(&rules(&[((5, 6), 7)]));
        assert_eq!(converter.encode(vec![0, 1, 2, 3]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_merge_skips_consumed_left() {
        let converter = BPEConverter::new(&rules(&[((0, 1), 4), ((2, 3), 5), ((4, 5), 6)]));
        assert_eq!(converter.encode(vec![0, 1, 2, 3]), vec![6]);
    }

    #[test]
    fn test_overlapping_pair_is_leftmost_first() {
        let converter = BPEConverter::new(&rules(&[((97, 97), 256)]));
        assert_eq!(converter.encode(vec![97, 97, 97]), vec![256, 97]);
    }

    #[test]
    fn test_merge_priority() {
        let converter = BPEConverter::new(&rules(&[((0, 0), 2), ((0, 1), 3)]));
        // (0,0) is applied first: [0,0,1] -> [2,1].
        assert_eq!(converter.encode(vec![0, 0, 1]), vec![2, 1]);
    }

    #[test]
    fn test_matches_multi_pass_definition() {
        let merges = rules(&[
            ((97, 97), 256),
            ((256, 97), 257),
            ((98, 97), 258),
            ((256, 256), 259),
            ((258, 256), 260),
            ((97, 98), 261),
        ]);
        let converter = BPEConverter::new(&merges);
        let inputs: [&[u8]; 5] = [b"aaaaaaa", b"baaaab", b"abababaaa", b"aabaabaa", b"b"];
        for input in inputs {
            let tokens: Vec<Token> = input.iter().map(|&b| b as Token).collect();
            assert_eq!(
                converter.encode(tokens.clone()),
                multi_pass(&merges, tokens),
                "input {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_num_merges() {
        let converter = BPEConverter::new(&rules(&[((0, 1), 2), ((1, 2), 3), ((2, 3), 4)]));
        assert_eq!(converter.num_merges(), 3);
    }
}
