//! Encoding/decoding surface shared by the BPE and Unigram engines.
//!
//! Both pipelines share the same shape:
//! 1. Whitespace preprocessing and UTF-8 byte conversion.
//! 2. Engine-specific segmentation of the bytes into vocabulary ids.
//! 3. On the way back, id -> bytes concatenation, UTF-8 decoding and postprocessing.

use std::path::Path;

use crate::{
    codec::Normalizer,
    error::{DecodeError, EncodeError, ErrorMode, PersistError},
    persistence::{self, Artifact},
    types::Token,
    vocab::Vocabulary,
};

/// A trained, immutable tokenizer.
pub trait Tokenizer {
    /// The id <-> bytes mapping.
    fn vocab(&self) -> &Vocabulary;

    /// Whitespace hook applied around encoding and decoding.
    fn normalizer(&self) -> &Normalizer;

    /// Converts text into a sequence of token ids.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if part of the input cannot be mapped to a token.
    fn encode(&self, text: &str) -> Result<Vec<Token>, EncodeError>;

    /// Snapshot of the full trained state in the portable schema.
    fn to_artifact(&self) -> Artifact;

    /// Decodes a token sequence back into text, failing on invalid UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidId`] if a token ID is not found in the
    /// vocabulary, or [`DecodeError::InvalidUtf8`] if the decoded bytes are not
    /// valid UTF-8.
    fn decode(&self, ids: &[Token]) -> Result<String, DecodeError> {
        self.decode_with(ids, ErrorMode::Strict)
    }

    /// Decodes a token sequence with an explicit UTF-8 error policy.
    ///
    /// # Errors
    ///
    /// Same as [`Tokenizer::decode`], except that invalid UTF-8 is replaced
    /// instead of reported under [`ErrorMode::Replace`].
    fn decode_with(&self, ids: &[Token], errors: ErrorMode) -> Result<String, DecodeError> {
        let bytes = self.vocab().concat(ids)?;
        self.normalizer().from_bytes(bytes, errors)
    }

    /// Returns the vocabulary size (number of tokens).
    fn vocab_size(&self) -> usize {
        self.vocab().len()
    }

    fn token_to_id(&self, bytes: &[u8]) -> Option<Token> {
        self.vocab().token_to_id(bytes)
    }

    fn id_to_token(&self, id: Token) -> Option<&[u8]> {
        self.vocab().id_to_token(id)
    }

    /// Writes the trained state to `path` as a versioned JSON artifact.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Io`] or [`PersistError::Json`] if writing fails.
    fn save(&self, path: &Path) -> Result<(), PersistError> {
        persistence::write_artifact(path, &self.to_artifact())
    }
}
