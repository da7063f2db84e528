//! Unigram tokenizer.
//!
//! Training seeds a log-score table from the corpus substrings and prunes it
//! with repeated Viterbi segmentation of the corpus. Encoding is a single
//! Viterbi pass over the input bytes.

use std::{collections::HashMap, path::Path};

use log::info;

use crate::{
    codec::Normalizer,
    config::UnigramConfig,
    error::{EncodeError, PersistError, TrainError},
    persistence::{self, Artifact, ModelArtifact},
    progress::progress_bar,
    tokenizer::Tokenizer,
    types::{ByteSeq, Score, Token},
    unigram_trainer::UnigramTrainer,
    viterbi,
    vocab::Vocabulary,
};

/// A trained Unigram tokenizer.
///
/// Token ids follow ascending byte order of the surviving tokens.
#[derive(Debug, Clone)]
pub struct UnigramTokenizer {
    vocab: Vocabulary,
    scores: HashMap<ByteSeq, Score>,
    /// Seed window the table was trained with.
    window: usize,
    /// Longest token in the table; bounds the Viterbi scan.
    max_len: usize,
    normalizer: Normalizer,
}

impl UnigramTokenizer {
    /// Trains a tokenizer pruned toward `vocab_size` tokens.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::Config`] if `vocab_size` is zero.
    pub fn train(corpus: &str, vocab_size: usize) -> Result<Self, TrainError> {
        Self::train_with_config(corpus, &UnigramConfig::new(vocab_size))
    }

    /// Trains a tokenizer with the full option set.
    ///
    /// Pruning stops early, above target, once only single-byte tokens are left
    /// to remove.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::Config`] for an invalid configuration, or
    /// [`TrainError::ProgressBarSetup`] if the progress bar cannot be built.
    pub fn train_with_config(corpus: &str, cfg: &UnigramConfig) -> Result<Self, TrainError> {
        cfg.validate()?;

        let bytes = cfg.normalizer.to_bytes(corpus);
        let mut trainer = UnigramTrainer::seed(&bytes, cfg.window, cfg.seed_scoring, cfg.byte_fallback);
        let seeded = trainer.len();
        info!(
            "training Unigram on {} bytes: {} seed candidates, target {}",
            bytes.len(),
            seeded,
            cfg.vocab_size
        );

        let to_prune = seeded.saturating_sub(cfg.vocab_size) as u64;
        let pb = progress_bar(cfg.show_progress, to_prune, "Pruning candidates")?;
        trainer.prune(&bytes, cfg.vocab_size, |remaining| {
            pb.set_position(seeded.saturating_sub(remaining) as u64);
        })?;
        pb.finish_and_clear();

        let tokenizer = Self::from_sorted(trainer.into_sorted(), cfg.window, cfg.normalizer);
        info!("final Unigram vocabulary size: {}", tokenizer.vocab.len());

        Ok(tokenizer)
    }

    /// Assembles a tokenizer from `(token, score)` pairs already in byte order.
    pub(crate) fn from_sorted(
        entries: Vec<(ByteSeq, Score)>,
        window: usize,
        normalizer: Normalizer,
    ) -> Self {
        let mut vocab = Vocabulary::new();
        let mut scores = HashMap::with_capacity(entries.len());
        let mut max_len = 0;

        for (token, score) in entries {
            max_len = max_len.max(token.len());
            vocab.push(token.clone());
            scores.insert(token, score);
        }

        Self {
            vocab,
            scores,
            window,
            max_len,
            normalizer,
        }
    }

    /// Reads a tokenizer previously written with [`Tokenizer::save`].
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if the file cannot be read, is not a Unigram
    /// artifact, or violates the score-table invariants.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        persistence::read_artifact(path.as_ref())?.into_unigram()
    }

    /// Log-probability of `token`, if it survived pruning.
    pub fn score(&self, token: &[u8]) -> Option<Score> {
        self.scores.get(token).copied()
    }

    /// Seed window used during training.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Tokens in id order with their scores.
    pub fn scored_tokens(&self) -> impl Iterator<Item = (Token, &[u8], Score)> + '_ {
        self.vocab.iter().map(|(id, bytes)| {
            let score = self.scores.get(bytes).copied().unwrap_or(Score::NEG_INFINITY);
            (id, bytes, score)
        })
    }
}

impl Tokenizer for UnigramTokenizer {
    fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Preprocess -> UTF-8 bytes -> best Viterbi segmentation -> ids.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::UnscorableByte`] for a byte value the training
    /// corpus never contained.
    fn encode(&self, text: &str) -> Result<Vec<Token>, EncodeError> {
        let bytes = self.normalizer.to_bytes(text);
        let (tokens, _) = viterbi::segment(&bytes, &self.scores, self.max_len)?;

        tokens
            .into_iter()
            .map(|token| {
                self.vocab
                    .token_to_id(token)
                    .ok_or_else(|| EncodeError::UnknownToken(token.to_vec()))
            })
            .collect()
    }

    fn to_artifact(&self) -> Artifact {
        Artifact::new(
            self.normalizer,
            ModelArtifact::unigram(self.scored_tokens(), self.window),
        )
    }
}
