//! Training configuration for both engines.

use serde::{Deserialize, Serialize};

use crate::{codec::Normalizer, error::ConfigError};

/// Number of single-byte tokens every byte-level vocabulary starts from.
pub const BYTE_VOCAB_SIZE: usize = 256;

/// Longest substring, in bytes, seeded as a Unigram candidate by default.
pub const DEFAULT_WINDOW: usize = 14;

/// Version written into every saved artifact.
pub const FORMAT_VERSION: u32 = 1;

/// Settings for a BPE training run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BpeConfig {
    /// Target vocabulary size: 256 byte tokens plus up to `vocab_size - 256` merges.
    pub vocab_size: usize,
    /// Draw a progress bar while merging.
    #[serde(default)]
    pub show_progress: bool,
    #[serde(default)]
    pub normalizer: Normalizer,
}

impl BpeConfig {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            show_progress: false,
            normalizer: Normalizer::default(),
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Number of merges this configuration asks for.
    pub fn num_merges(&self) -> usize {
        self.vocab_size.saturating_sub(BYTE_VOCAB_SIZE)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::VocabTooSmall`] if `vocab_size` cannot hold the byte alphabet.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vocab_size < BYTE_VOCAB_SIZE {
            return Err(ConfigError::VocabTooSmall {
                requested: self.vocab_size,
                minimum: BYTE_VOCAB_SIZE,
            });
        }
        Ok(())
    }
}

/// How seed candidates are scored before pruning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedScoring {
    /// Every distinct substring counts once: all scores are `ln(1 / candidates)`.
    #[default]
    Uniform,
    /// Substrings are weighted by how often they occur among all seeded windows.
    Frequency,
}

/// Settings for a Unigram training run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnigramConfig {
    /// Pruning stops once the score table holds at most this many tokens.
    pub vocab_size: usize,
    /// Longest substring, in bytes, seeded as a candidate token.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Seed every byte value, including ones absent from the corpus.
    #[serde(default)]
    pub byte_fallback: bool,
    #[serde(default)]
    pub seed_scoring: SeedScoring,
    /// Draw a progress bar while pruning.
    #[serde(default)]
    pub show_progress: bool,
    #[serde(default)]
    pub normalizer: Normalizer,
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}

impl UnigramConfig {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            window: DEFAULT_WINDOW,
            byte_fallback: false,
            seed_scoring: SeedScoring::default(),
            show_progress: false,
            normalizer: Normalizer::default(),
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_byte_fallback(mut self, byte_fallback: bool) -> Self {
        self.byte_fallback = byte_fallback;
        self
    }

    pub fn with_seed_scoring(mut self, seed_scoring: SeedScoring) -> Self {
        self.seed_scoring = seed_scoring;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::VocabTooSmall`] for an empty target and
    /// [`ConfigError::ZeroWindow`] for a zero-length window.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vocab_size == 0 {
            return Err(ConfigError::VocabTooSmall {
                requested: 0,
                minimum: 1,
            });
        }
        if self.window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bpe_rejects_vocab_below_byte_alphabet() {
        let err = BpeConfig::new(255).validate();
        assert_eq!(
            err,
            Err(ConfigError::VocabTooSmall {
                requested: 255,
                minimum: 256
            })
        );
        assert!(BpeConfig::new(256).validate().is_ok());
    }

    #[test]
    fn test_bpe_num_merges() {
        assert_eq!(BpeConfig::new(256).num_merges(), 0);
        assert_eq!(BpeConfig::new(300).num_merges(), 44);
    }

    #[test]
    fn test_unigram_validation() {
        assert!(UnigramConfig::new(3).validate().is_ok());
        assert!(matches!(
            UnigramConfig::new(0).validate(),
            Err(ConfigError::VocabTooSmall { .. })
        ));
        assert_eq!(
            UnigramConfig::new(10).with_window(0).validate(),
            Err(ConfigError::ZeroWindow)
        );
    }

    #[test]
    fn test_unigram_config_defaults_from_json() {
        let cfg: UnigramConfig =
            serde_json::from_str(r#"{"vocab_size": 64}"#).expect("minimal config should parse");
        assert_eq!(cfg, UnigramConfig::new(64));
        assert_eq!(cfg.seed_scoring, SeedScoring::Uniform);

        let cfg: UnigramConfig = serde_json::from_str(r#"{"vocab_size": 64, "seed_scoring": "frequency"}"#)
            .expect("seed scoring should parse");
        assert_eq!(cfg.seed_scoring, SeedScoring::Frequency);
    }
}
