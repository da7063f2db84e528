//! Core BPE training algorithm.
//!
//! Incremental variant of greedy pair merging (Algorithm 2 of
//! "Byte Pair Encoding is Suboptimal for Language Model Pretraining",
//! https://aclanthology.org/2023.findings-acl.38.pdf): pair counts and pair
//! positions are updated locally around every merge instead of rescanning the
//! whole sequence, and a lazy max-heap yields the next pair to merge.
//!
//! The output is identical to the naive loop: count every adjacent pair, pick
//! the most frequent one, rewrite the sequence left to right without overlap.

use std::{
    cmp::{Ordering, Reverse},
    collections::{BTreeSet, BinaryHeap, HashMap},
    ops::ControlFlow,
};

use log::debug;

use crate::{
    types::{ByteSeq, MergeRule, TextIdx, Token, TokenFreq, TokenPair},
    vocab::Vocabulary,
};

/// Node in doubly-linked list representing a token in the training sequence.
///
/// Uses index-based links rather than direct references to work within
/// Rust's ownership system. Nodes are stored in a Vec<Option<Node>> arena.
#[derive(Debug)]
struct Node {
    /// The token identifier at this position.
    token: Token,

    /// Index of the previous node in the sequence, if any.
    prev_idx: Option<TextIdx>,

    /// Index of the next node in the sequence, if any.
    next_idx: Option<TextIdx>,
}

/// Item in the max heap for tracking most frequent token pairs.
///
/// The heap may contain stale entries after merges, so frequencies
/// must be validated against `pair_freqs` before use.
#[derive(Debug, PartialEq, Eq)]
struct HeapItem {
    /// Frequency count of this token pair when it was pushed.
    freq: TokenFreq,

    /// Concatenated bytes of the pair.
    merged: ByteSeq,

    /// Byte length of the left token.
    left_len: usize,

    /// The token pair being tracked.
    pair: TokenPair,
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Highest frequency at the top. Among equal frequencies the lexicographically
/// smallest concatenation wins, then the shorter left token.
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.freq
            .cmp(&other.freq)
            .then_with(|| Reverse(&self.merged).cmp(&Reverse(&other.merged)))
            .then_with(|| Reverse(self.left_len).cmp(&Reverse(other.left_len)))
            .then_with(|| self.pair.cmp(&other.pair))
    }
}

/// BPE training structure.
///
/// This trainer uses a *Vec-as-arena* pattern to represent a
/// linked list of nodes. Direct `Node` <-> `Node` references are
/// avoided due to Rust's ownership and borrowing rules.
///
/// Nodes are stored in a `Vec<Option<Node>>`, where:
/// - The `Vec` provides stable indices for nodes
/// - Deletions are O(1) by setting entries to `None`
/// - Traversal is done via index-based left/right links inside `Node`
#[derive(Debug)]
pub(crate) struct BPETrainer {
    /// Storage arena for nodes.
    ///
    /// `None` represents a deleted node.
    nodes: Vec<Option<Node>>,

    /// Vec index pointing linked list's head.
    head_idx: Option<TextIdx>,

    /// Number of `Some` entries in `nodes`.
    live_tokens: usize,

    /// Max heap of pairs ordered by frequency then byte order.
    ///
    /// Contains stale entries that need to be guarded against.
    heap: BinaryHeap<HeapItem>,

    /// Positions where each token pair occurs.
    /// pair -> ordered set of positions [index of first token of every pair].
    ///
    /// Source of truth for pair positions. Ordered so that a merge rewrites
    /// occurrences left to right.
    pair_positions: HashMap<TokenPair, BTreeSet<TextIdx>>,

    /// Current frequencies of each pair.
    ///
    /// Source of truth for pair frequencies. Pairs whose count drops to zero are removed.
    pair_freqs: HashMap<TokenPair, TokenFreq>,

    /// Token bytes, grown by one entry per merge.
    vocab: Vocabulary,

    /// Learned merges in creation order.
    merges: Vec<MergeRule>,
}

impl BPETrainer {
    /// Create a new BPE trainer over the bytes of a corpus.
    ///
    /// Every byte becomes one node holding its single-byte token id.
    pub(crate) fn new(bytes: &[u8]) -> Self {
        let n = bytes.len();
        let mut nodes = Vec::with_capacity(n);

        for (i, &b) in bytes.iter().enumerate() {
            let prev = if i > 0 { Some(i - 1) } else { None };
            let next = if i + 1 < n { Some(i + 1) } else { None };
            nodes.push(Some(Node {
                token: b as Token,
                prev_idx: prev,
                next_idx: next,
            }));
        }

        // Handle case: corpus might be empty.
        let head = if nodes.is_empty() { None } else { Some(0) };

        let mut trainer = BPETrainer {
            nodes,
            head_idx: head,
            live_tokens: n,
            heap: BinaryHeap::new(),
            pair_positions: HashMap::new(),
            pair_freqs: HashMap::new(),
            vocab: Vocabulary::byte_level(),
            merges: Vec::new(),
        };

        trainer.build_initial_pairs();

        trainer
    }

    /// Perform one merge operation.
    ///
    /// Returns the learned rule, or `None` if no pairs remain.
    ///
    /// # Time Complexity
    /// Worst case: `O(N*log V)` where `N` is the token sequence length and `V` refers to vocab size.
    pub(crate) fn merge_step(&mut self) -> Option<(MergeRule, TokenFreq)> {
        let (merge_pair, merge_freq) = self.get_max_pair()?;

        // Copy positions out: the merge below edits the tracking maps.
        let positions: Vec<TextIdx> = self
            .pair_positions
            .remove(&merge_pair)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        self.pair_freqs.remove(&merge_pair);

        let mut merged = self.token_bytes(merge_pair.0).to_vec();
        merged.extend_from_slice(self.token_bytes(merge_pair.1));
        let new_tok_id = self.vocab.push(merged);

        debug!(
            "merge {}: ({}, {}) -> {} freq {}",
            self.merges.len(),
            merge_pair.0,
            merge_pair.1,
            new_tok_id,
            merge_freq
        );

        // Ascending positions make this the left-to-right, non-overlapping pass.
        for &pos in &positions {
            let (idx1, idx2) = match self.get_merge_idxs(merge_pair, pos) {
                ControlFlow::Continue(idxs) => idxs,
                ControlFlow::Break(_) => continue,
            };

            let cur_prev_idx = self.nodes[idx1].as_ref().and_then(|n| n.prev_idx);
            let new_next_idx = self.nodes[idx2].as_ref().and_then(|n| n.next_idx);

            self.remove_neighbours(merge_pair, idx1, idx2);
            self.merge_pair_in_list(new_next_idx, new_tok_id, idx1, idx2);
            self.add_neighbours(new_tok_id, idx1, cur_prev_idx, new_next_idx);
        }

        let rule = MergeRule {
            left: merge_pair.0,
            right: merge_pair.1,
            id: new_tok_id,
        };
        self.merges.push(rule);

        Some((rule, merge_freq))
    }

    /// Length of the current token sequence.
    pub(crate) fn len(&self) -> usize {
        self.live_tokens
    }

    /// Returns the current token sequence as a vector.
    ///
    /// Traverses the linked list from head to tail, collecting all tokens.
    #[cfg(test)]
    pub(crate) fn get_encodings(&self) -> Vec<Token> {
        let mut result = Vec::new();

        let mut current = self.head_idx;

        while let Some(idx) = current {
            match &self.nodes[idx] {
                Some(node) => {
                    result.push(node.token);
                    current = node.next_idx;
                }
                None => break,
            }
        }

        result
    }

    /// Number of distinct adjacent pairs currently in the sequence.
    pub(crate) fn distinct_pairs(&self) -> usize {
        self.pair_freqs.len()
    }

    /// Consumes the trainer, returning the vocabulary and merge table.
    pub(crate) fn into_parts(self) -> (Vocabulary, Vec<MergeRule>) {
        (self.vocab, self.merges)
    }

    fn token_bytes(&self, token: Token) -> &[u8] {
        self.vocab.id_to_token(token).unwrap_or_default()
    }

    fn heap_item(&self, pair: TokenPair, freq: TokenFreq) -> HeapItem {
        let left = self.token_bytes(pair.0);
        let mut merged = Vec::with_capacity(left.len() + self.token_bytes(pair.1).len());
        merged.extend_from_slice(left);
        merged.extend_from_slice(self.token_bytes(pair.1));
        HeapItem {
            freq,
            merged,
            left_len: left.len(),
            pair,
        }
    }

    /// Builds initial pair frequencies from the linked list.
    ///
    /// Scans through the initial token sequence once, recording all adjacent
    /// pairs and their frequencies, then populates the max heap.
    fn build_initial_pairs(&mut self) {
        let mut cur_idx = self.head_idx;

        while let Some(idx) = cur_idx {
            let Some(node) = &self.nodes[idx] else {
                break;
            };
            if let Some(next_node) = node.next_idx.and_then(|n| self.nodes[n].as_ref()) {
                let pair = TokenPair(node.token, next_node.token);
                *self.pair_freqs.entry(pair).or_insert(0) += 1;
                self.pair_positions.entry(pair).or_default().insert(idx);
            }
            cur_idx = node.next_idx;
        }

        let items: Vec<HeapItem> = self
            .pair_freqs
            .iter()
            .map(|(&pair, &freq)| self.heap_item(pair, freq))
            .collect();
        self.heap.extend(items);
    }

    /// Removes and returns the most frequent token pair from the max heap.
    ///
    /// Continuously pops from the heap until finding an entry whose frequency
    /// matches the current frequency in `pair_freqs`, filtering out stale entries.
    fn get_max_pair(&mut self) -> Option<(TokenPair, TokenFreq)> {
        while let Some(entry) = self.heap.pop() {
            match self.pair_freqs.get(&entry.pair) {
                Some(&true_freq) if true_freq == entry.freq && true_freq > 0 => {
                    return Some((entry.pair, entry.freq));
                }
                // Stale entry, keep popping.
                _ => {}
            }
        }

        None
    }

    /// Updates bookkeeping for a pair occurrence being removed.
    ///
    /// Decrements the pair's frequency, removes its position and re-queues
    /// the pair under its new count.
    fn remove_pair_at(&mut self, idx: TextIdx, pair: TokenPair) {
        if let Some(pos_set) = self.pair_positions.get_mut(&pair) {
            pos_set.remove(&idx);
            if pos_set.is_empty() {
                self.pair_positions.remove(&pair);
            }
        }

        let remaining = match self.pair_freqs.get_mut(&pair) {
            Some(freq) => {
                *freq = freq.saturating_sub(1);
                *freq
            }
            None => return,
        };

        if remaining == 0 {
            self.pair_freqs.remove(&pair);
        } else {
            let item = self.heap_item(pair, remaining);
            self.heap.push(item);
        }
    }

    /// Adds a new pair occurrence at a specific position.
    ///
    /// Increments the pair's frequency, records its position, and adds it to the heap.
    fn add_pair_at(&mut self, idx: TextIdx, pair: TokenPair) {
        self.pair_positions.entry(pair).or_default().insert(idx);
        let freq = self.pair_freqs.entry(pair).or_insert(0);
        *freq += 1;
        let freq = *freq;

        let item = self.heap_item(pair, freq);
        self.heap.push(item);
    }

    /// Adds new neighbor pairs formed after a merge operation.
    ///
    /// After merging two tokens, the new merged token may form new pairs with
    /// its left and right neighbors that need to be tracked.
    fn add_neighbours(
        &mut self,
        new_tok_id: Token,
        idx1: TextIdx,
        cur_prev_idx: Option<TextIdx>,
        new_next_idx: Option<TextIdx>,
    ) {
        if let Some(prev_idx) = cur_prev_idx {
            if let Some(prev_token) = self.nodes[prev_idx].as_ref().map(|n| n.token) {
                self.add_pair_at(prev_idx, TokenPair(prev_token, new_tok_id));
            }
        }

        if let Some(next_idx) = new_next_idx {
            if let Some(next_token) = self.nodes[next_idx].as_ref().map(|n| n.token) {
                self.add_pair_at(idx1, TokenPair(new_tok_id, next_token));
            }
        }
    }

    /// Performs the actual merge operation in the linked list.
    ///
    /// Updates the first node to contain the merged token, relinks the list to
    /// skip the second node, and marks the second node as deleted.
    fn merge_pair_in_list(
        &mut self,
        next_idx: Option<TextIdx>,
        tok_id: Token,
        idx1: TextIdx,
        idx2: TextIdx,
    ) {
        if let Some(node) = &mut self.nodes[idx1] {
            node.token = tok_id;
            node.next_idx = next_idx;
        }

        if let Some(new_right_node) = next_idx.and_then(|i| self.nodes[i].as_mut()) {
            new_right_node.prev_idx = Some(idx1);
        }

        if self.nodes[idx2].take().is_some() {
            self.live_tokens -= 1;
        }
    }

    /// Removes old neighbor pairs that become invalid after a merge.
    ///
    /// When two tokens are merged, their pairs with their left and right neighbors
    /// are no longer valid and must be removed from tracking.
    fn remove_neighbours(&mut self, merge_pair: TokenPair, idx1: TextIdx, idx2: TextIdx) {
        let prev_idx = self.nodes[idx1].as_ref().and_then(|n| n.prev_idx);
        if let Some(prev_idx) = prev_idx {
            if let Some(prev_token) = self.nodes[prev_idx].as_ref().map(|n| n.token) {
                self.remove_pair_at(prev_idx, TokenPair(prev_token, merge_pair.0));
            }
        }

        let next_idx = self.nodes[idx2].as_ref().and_then(|n| n.next_idx);
        if let Some(next_idx) = next_idx {
            if let Some(next_token) = self.nodes[next_idx].as_ref().map(|n| n.token) {
                self.remove_pair_at(idx2, TokenPair(merge_pair.1, next_token));
            }
        }
    }

    /// Extracts and verifies the indices of two nodes for a merge operation.
    ///
    /// Validates that the pair still exists at the given position and hasn't
    /// been invalidated by an earlier, overlapping occurrence.
    fn get_merge_idxs(&self, pair: TokenPair, pos: TextIdx) -> ControlFlow<(), (TextIdx, TextIdx)> {
        let idx1 = pos;
        let idx2 = match self.nodes[idx1].as_ref().and_then(|n| n.next_idx) {
            Some(idx2) => idx2,
            // Start node deleted, or it is now the tail.
            None => return ControlFlow::Break(()),
        };

        let is_target = match (&self.nodes[idx1], &self.nodes[idx2]) {
            (Some(node1), Some(node2)) => node1.token == pair.0 && node2.token == pair.1,
            _ => false,
        };

        if !is_target {
            return ControlFlow::Break(());
        }

        ControlFlow::Continue((idx1, idx2))
    }
}
