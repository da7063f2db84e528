//! Text/byte boundary shared by both engines.
//!
//! Encoding runs `preprocess` before turning text into UTF-8 bytes, and
//! decoding runs `postprocess` after turning bytes back into text.

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, ErrorMode};

/// Whitespace normalization hook.
///
/// Spaces are rewritten to `sentinel` before encoding and the sentinel is
/// rewritten back to a space after decoding. The default sentinel is the
/// space itself, which makes both directions the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Normalizer {
    pub sentinel: char,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self { sentinel: ' ' }
    }
}

impl Normalizer {
    pub fn new(sentinel: char) -> Self {
        Self { sentinel }
    }

    /// Returns true when pre/postprocessing leave text untouched.
    pub fn is_identity(&self) -> bool {
        self.sentinel == ' '
    }

    pub fn preprocess(&self, text: &str) -> String {
        if self.is_identity() {
            return text.to_owned();
        }
        text.replace(' ', self.sentinel.encode_utf8(&mut [0; 4]))
    }

    pub fn postprocess(&self, text: &str) -> String {
        if self.is_identity() {
            return text.to_owned();
        }
        text.replace(self.sentinel, " ")
    }

    /// Preprocesses `text` and returns its UTF-8 bytes.
    pub fn to_bytes(&self, text: &str) -> Vec<u8> {
        self.preprocess(text).into_bytes()
    }

    /// Turns reconstructed bytes back into text and undoes preprocessing.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUtf8`] if `bytes` is not valid UTF-8 and
    /// `errors` is [`ErrorMode::Strict`].
    pub fn from_bytes(&self, bytes: Vec<u8>, errors: ErrorMode) -> Result<String, DecodeError> {
        let text = match errors {
            ErrorMode::Strict => String::from_utf8(bytes).map_err(DecodeError::InvalidUtf8)?,
            ErrorMode::Replace => String::from_utf8_lossy(&bytes).into_owned(),
        };
        Ok(self.postprocess(&text))
    }
}
