//! Bidirectional token <-> id mapping.

use std::collections::HashMap;

use crate::{
    config::BYTE_VOCAB_SIZE,
    error::DecodeError,
    types::{ByteSeq, Token},
};

/// Bijection between byte-sequence tokens and dense ids starting at 0.
///
/// - `tokens[id]`: byte content of each id (the inverse vocabulary)
/// - `ids[bytes]`: id of each byte content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    tokens: Vec<ByteSeq>,
    ids: HashMap<ByteSeq, Token>,
}

impl Vocabulary {
    /// Creates an empty vocabulary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a vocabulary holding the 256 single bytes at ids 0-255.
    pub fn byte_level() -> Self {
        let mut vocab = Self::new();
        for b in 0..BYTE_VOCAB_SIZE {
            vocab.push(vec![b as u8]);
        }
        vocab
    }

    /// Builds a vocabulary whose ids follow the iteration order of `tokens`.
    ///
    /// Returns the offending token if it is empty or repeated.
    pub fn from_tokens(tokens: impl IntoIterator<Item = ByteSeq>) -> Result<Self, ByteSeq> {
        let mut vocab = Self::new();
        for token in tokens {
            if token.is_empty() || vocab.ids.contains_key(&token) {
                return Err(token);
            }
            vocab.push(token);
        }
        Ok(vocab)
    }

    /// Appends `token` under the next free id and returns that id.
    ///
    /// Callers guarantee `token` is non-empty and not yet present.
    pub(crate) fn push(&mut self, token: ByteSeq) -> Token {
        let id = self.tokens.len();
        self.ids.insert(token.clone(), id);
        self.tokens.push(token);
        id
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns the id of `bytes`, if it is a token.
    pub fn token_to_id(&self, bytes: &[u8]) -> Option<Token> {
        self.ids.get(bytes).copied()
    }

    /// Returns the byte content of `id`, if it exists.
    pub fn id_to_token(&self, id: Token) -> Option<&[u8]> {
        self.tokens.get(id).map(Vec::as_slice)
    }

    /// Iterates `(id, bytes)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (Token, &[u8])> + '_ {
        self.tokens.iter().enumerate().map(|(id, t)| (id, t.as_slice()))
    }

    /// Concatenates the byte content of `ids` in order.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidId`] for the first id not in the vocabulary.
    pub fn concat(&self, ids: &[Token]) -> Result<Vec<u8>, DecodeError> {
        let mut bytes = Vec::with_capacity(ids.len() * 2);
        for &id in ids {
            let token = self.id_to_token(id).ok_or(DecodeError::InvalidId(id))?;
            bytes.extend_from_slice(token);
        }
        Ok(bytes)
    }
}
