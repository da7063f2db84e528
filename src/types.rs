//! Type aliases and shared types for training and encoding.
//!
//! These type aliases provide semantic clarity throughout the codebase.

use serde::{Deserialize, Serialize};

/// Represents a token identifier in the vocabulary.
///
/// For BPE, ids 0-255 are the single bytes and every learned merge takes the
/// next id. For Unigram, ids enumerate the surviving tokens in byte order.
pub type Token = usize;

/// Position of a token in a token sequence.
///
/// Used to index into the doubly-linked list structure during BPE training.
pub(crate) type TextIdx = usize;

/// Frequency count for token pairs or segmented tokens during training.
pub(crate) type TokenFreq = usize;

/// Merge order indicates when a merge rule was learned during training.
///
/// Lower values represent earlier merges (e.g., 0 = first merge, 1 = second merge).
pub(crate) type MergeOrder = usize;

/// A sequence of raw bytes.
///
/// The byte content of a single vocabulary entry.
pub type ByteSeq = Vec<u8>;

/// Log-probability assigned to a Unigram token.
pub type Score = f64;

/// A pair of adjacent tokens.
///
/// Used as a key for looking up merge rules during encoding and for
/// tracking pair frequencies during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct TokenPair(pub(crate) Token, pub(crate) Token);

/// A learned BPE merge: `left` followed by `right` becomes `id`.
///
/// The position of a rule in the merge table is its priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MergeRule {
    pub left: Token,
    pub right: Token,
    pub id: Token,
}

impl MergeRule {
    pub(crate) fn pair(&self) -> TokenPair {
        TokenPair(self.left, self.right)
    }
}
