//! Byte-level subword tokenizers with exact round-trip encoding.
//!
//! Two engines share one [`Tokenizer`] surface:
//! - [`BpeTokenizer`]: greedy pair merging, trained with Algorithm 2 from
//!   "Byte Pair Encoding is Suboptimal for Language Model Pretraining"
//!   (linked-list corpus, lazy max-heap of pair counts).
//! - [`UnigramTokenizer`]: log-probability scores seeded from substring counts,
//!   pruned by repeated Viterbi segmentation of the corpus.
//!
//! Both operate on UTF-8 bytes, so `decode(encode(s)) == s` for every string the
//! tokenizer can encode. Trained state is saved as a versioned JSON artifact.
//!
//! With the `python` feature this is also a PyO3 extension module.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]

mod types;
mod vocab;
mod codec;
mod config;
mod error;
mod progress;

mod bpe_trainer;
mod converter;
mod bpe;

mod viterbi;
mod unigram_trainer;
mod unigram;

mod tokenizer;
mod persistence;

#[cfg(feature = "python")]
mod python;

pub use bpe::BpeTokenizer;
pub use codec::Normalizer;
pub use config::{BpeConfig, SeedScoring, UnigramConfig, BYTE_VOCAB_SIZE, DEFAULT_WINDOW, FORMAT_VERSION};
pub use error::{ConfigError, DecodeError, EncodeError, ErrorMode, PersistError, TrainError};
pub use persistence::{
    load_tokenizer, read_artifact, write_artifact, Artifact, ModelArtifact, ScoredEntry, VocabEntry,
};
pub use tokenizer::Tokenizer;
pub use types::{ByteSeq, MergeRule, Score, Token};
pub use unigram::UnigramTokenizer;
pub use vocab::Vocabulary;
