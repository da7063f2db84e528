//! Error types for tokenizer training, encoding, decoding and persistence.

use std::{fmt, str::FromStr};

use indicatif::style::TemplateError;

use crate::types::{ByteSeq, Token};

/// Controls how UTF-8 decoding errors are handled.
///
/// Unknown token IDs always produce errors regardless of mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Fail on invalid UTF-8.
    #[default]
    Strict,
    /// Replace invalid UTF-8 sequences with U+FFFD.
    Replace,
}

impl FromStr for ErrorMode {
    type Err = String;

    /// Parses an error mode string ("strict" or "replace").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Self::Strict),
            "replace" => Ok(Self::Replace),
            _ => Err(format!(
                "invalid error mode: {s:?} (expected \"strict\" or \"replace\")"
            )),
        }
    }
}

/// Invalid training configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Requested vocabulary is smaller than the engine can represent.
    VocabTooSmall { requested: usize, minimum: usize },
    /// Unigram seed window must cover at least one byte.
    ZeroWindow,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VocabTooSmall { requested, minimum } => write!(
                f,
                "vocab_size {requested} is below the minimum of {minimum}"
            ),
            Self::ZeroWindow => write!(f, "seed window must be at least 1 byte"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors that can occur while training a tokenizer.
#[derive(Debug)]
pub enum TrainError {
    /// The training configuration was rejected.
    Config(ConfigError),
    /// Progress bar template string was invalid.
    ProgressBarSetup(TemplateError),
    /// Re-segmenting the training corpus failed.
    Segmentation(EncodeError),
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
            Self::ProgressBarSetup(e) => write!(f, "template parsing failed: {e}"),
            Self::Segmentation(e) => write!(f, "corpus segmentation failed: {e}"),
        }
    }
}

impl std::error::Error for TrainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::ProgressBarSetup(e) => Some(e),
            Self::Segmentation(e) => Some(e),
        }
    }
}

impl From<ConfigError> for TrainError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<TemplateError> for TrainError {
    fn from(e: TemplateError) -> Self {
        Self::ProgressBarSetup(e)
    }
}

impl From<EncodeError> for TrainError {
    fn from(e: EncodeError) -> Self {
        Self::Segmentation(e)
    }
}

/// Errors that can occur during text encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A segmented token has no id in the vocabulary.
    UnknownToken(ByteSeq),
    /// No trained token covers the byte at `offset` of the preprocessed input.
    UnscorableByte { byte: u8, offset: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownToken(bytes) => write!(f, "token not in vocabulary: {bytes:?}"),
            Self::UnscorableByte { byte, offset } => write!(
                f,
                "byte 0x{byte:02x} at offset {offset} has no trained score"
            ),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Errors that can occur during token decoding.
#[derive(Debug)]
pub enum DecodeError {
    /// Token ID not found in vocabulary.
    InvalidId(Token),
    /// Decoded bytes are not valid UTF-8.
    InvalidUtf8(std::string::FromUtf8Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidId(t) => write!(f, "unknown token id: {t}"),
            Self::InvalidUtf8(e) => write!(f, "invalid UTF-8 in decoded bytes: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidId(_) => None,
            Self::InvalidUtf8(e) => Some(e),
        }
    }
}

/// Errors that can occur when saving or loading a tokenizer artifact.
#[derive(Debug)]
pub enum PersistError {
    /// Reading or writing the artifact file failed.
    Io(std::io::Error),
    /// The artifact is not valid JSON for the expected schema.
    Json(serde_json::Error),
    /// The artifact was written with a format version this build cannot read.
    UnsupportedVersion(u32),
    /// The artifact holds a different engine than the one requested.
    ModelMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// The artifact parsed but violates a vocabulary or rule invariant.
    Malformed(String),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "artifact i/o failed: {e}"),
            Self::Json(e) => write!(f, "artifact is not valid JSON: {e}"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported artifact format version {v}"),
            Self::ModelMismatch { expected, found } => {
                write!(f, "expected a {expected} artifact, found {found}")
            }
            Self::Malformed(msg) => write!(f, "malformed artifact: {msg}"),
        }
    }
}

impl std::error::Error for PersistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mode_from_str() {
        assert_eq!("strict".parse::<ErrorMode>(), Ok(ErrorMode::Strict));
        assert_eq!("replace".parse::<ErrorMode>(), Ok(ErrorMode::Replace));
        assert!("ignore".parse::<ErrorMode>().is_err());
    }

    #[test]
    fn test_unscorable_byte_message() {
        let err = EncodeError::UnscorableByte {
            byte: 0x7a,
            offset: 3,
        };
        assert_eq!(err.to_string(), "byte 0x7a at offset 3 has no trained score");
    }

    #[test]
    fn test_config_error_converts_into_train_error() {
        let err: TrainError = ConfigError::ZeroWindow.into();
        assert!(matches!(err, TrainError::Config(ConfigError::ZeroWindow)));
    }
}
