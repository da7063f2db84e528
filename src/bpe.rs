//! Byte-level BPE tokenizer.
//!
//! Training learns an ordered merge table over the UTF-8 bytes of a corpus;
//! encoding replays that table on new text.

use std::path::Path;

use log::{debug, info};

use crate::{
    bpe_trainer::BPETrainer,
    codec::Normalizer,
    config::BpeConfig,
    converter::BPEConverter,
    error::{EncodeError, PersistError, TrainError},
    persistence::{self, Artifact, ModelArtifact},
    progress::progress_bar,
    tokenizer::Tokenizer,
    types::{MergeRule, Token},
    vocab::Vocabulary,
};

/// A trained byte-level BPE tokenizer.
///
/// - ids 0-255: single bytes
/// - ids 256..: one per merge, in creation order
#[derive(Debug, Clone)]
pub struct BpeTokenizer {
    vocab: Vocabulary,
    merges: Vec<MergeRule>,
    converter: BPEConverter,
    normalizer: Normalizer,
}

impl BpeTokenizer {
    /// Trains a tokenizer with `vocab_size - 256` merges at most.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::Config`] if `vocab_size < 256`.
    pub fn train(corpus: &str, vocab_size: usize) -> Result<Self, TrainError> {
        Self::train_with_config(corpus, &BpeConfig::new(vocab_size))
    }

    /// Trains a tokenizer with the full option set.
    ///
    /// Stops early once no adjacent pair is left in the corpus.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::Config`] for an invalid configuration, or
    /// [`TrainError::ProgressBarSetup`] if the progress bar cannot be built.
    pub fn train_with_config(corpus: &str, cfg: &BpeConfig) -> Result<Self, TrainError> {
        cfg.validate()?;

        let bytes = cfg.normalizer.to_bytes(corpus);
        let num_merges = cfg.num_merges();
        info!(
            "training BPE on {} bytes, up to {} merges",
            bytes.len(),
            num_merges
        );

        let pb = progress_bar(cfg.show_progress, num_merges as u64, "Learning merges")?;
        let mut trainer = BPETrainer::new(&bytes);

        for i in 0..num_merges {
            if trainer.merge_step().is_none() {
                debug!("no more pairs to merge after {i} merges");
                break;
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        let final_len = trainer.len();
        let remaining_pairs = trainer.distinct_pairs();
        let (vocab, merges) = trainer.into_parts();
        info!(
            "learned {} merges, vocab size {}, corpus compressed {} -> {} tokens ({} distinct pairs left)",
            merges.len(),
            vocab.len(),
            bytes.len(),
            final_len,
            remaining_pairs
        );

        Ok(Self::from_parts(vocab, merges, cfg.normalizer))
    }

    /// Assembles a tokenizer from already validated parts.
    pub(crate) fn from_parts(vocab: Vocabulary, merges: Vec<MergeRule>, normalizer: Normalizer) -> Self {
        let converter = BPEConverter::new(&merges);
        debug!("converter holds {} merge rules", converter.num_merges());
        Self {
            vocab,
            merges,
            converter,
            normalizer,
        }
    }

    /// Reads a tokenizer previously written with [`Tokenizer::save`].
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if the file cannot be read, is not a BPE
    /// artifact, or violates the merge-table invariants.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        persistence::read_artifact(path.as_ref())?.into_bpe()
    }

    /// The learned merge rules in priority order.
    pub fn merges(&self) -> &[MergeRule] {
        &self.merges
    }
}

impl Tokenizer for BpeTokenizer {
    fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Preprocess -> UTF-8 bytes -> merges replayed in training order.
    ///
    /// Never fails: every byte is a base token.
    fn encode(&self, text: &str) -> Result<Vec<Token>, EncodeError> {
        let byte_tokens: Vec<Token> = self
            .normalizer
            .to_bytes(text)
            .into_iter()
            .map(|b| b as Token)
            .collect();

        if byte_tokens.len() <= 1 {
            return Ok(byte_tokens);
        }

        Ok(self.converter.encode(byte_tokens))
    }

    fn to_artifact(&self) -> Artifact {
        Artifact::new(
            self.normalizer,
            ModelArtifact::bpe(&self.vocab, &self.merges),
        )
    }
}
