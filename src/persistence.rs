//! Versioned JSON artifacts for trained tokenizers.
//!
//! Format version 1:
//!
//! ```json
//! { "format_version": 1,
//!   "normalizer": { "sentinel": " " },
//!   "model": { "type": "bpe",
//!              "vocab": [ { "id": 0, "bytes": [0] }, ... ],
//!              "merges": [ { "left": 97, "right": 97, "id": 256 }, ... ] } }
//! ```
//!
//! A Unigram model is `{ "type": "unigram", "window": 14, "vocab": [ { "id",
//! "bytes", "score" }, ... ] }`. Token bytes are arrays of integers so the file
//! does not depend on tokens being valid UTF-8.

use std::{
    ffi::OsString,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    bpe::BpeTokenizer,
    codec::Normalizer,
    config::{BYTE_VOCAB_SIZE, FORMAT_VERSION},
    error::PersistError,
    tokenizer::Tokenizer,
    types::{ByteSeq, MergeRule, Score, Token},
    unigram::UnigramTokenizer,
    vocab::Vocabulary,
};

/// One vocabulary entry of a BPE artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabEntry {
    pub id: Token,
    pub bytes: ByteSeq,
}

/// One vocabulary entry of a Unigram artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub id: Token,
    pub bytes: ByteSeq,
    pub score: Score,
}

/// Engine-specific part of an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelArtifact {
    Bpe {
        vocab: Vec<VocabEntry>,
        merges: Vec<MergeRule>,
    },
    Unigram {
        window: usize,
        vocab: Vec<ScoredEntry>,
    },
}

impl ModelArtifact {
    pub(crate) fn bpe(vocab: &Vocabulary, merges: &[MergeRule]) -> Self {
        Self::Bpe {
            vocab: vocab
                .iter()
                .map(|(id, bytes)| VocabEntry {
                    id,
                    bytes: bytes.to_vec(),
                })
                .collect(),
            merges: merges.to_vec(),
        }
    }

    pub(crate) fn unigram<'a>(
        entries: impl Iterator<Item = (Token, &'a [u8], Score)>,
        window: usize,
    ) -> Self {
        Self::Unigram {
            window,
            vocab: entries
                .map(|(id, bytes, score)| ScoredEntry {
                    id,
                    bytes: bytes.to_vec(),
                    score,
                })
                .collect(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bpe { .. } => "bpe",
            Self::Unigram { .. } => "unigram",
        }
    }
}

/// Full trained state of a tokenizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub format_version: u32,
    pub normalizer: Normalizer,
    pub model: ModelArtifact,
}

impl Artifact {
    pub(crate) fn new(normalizer: Normalizer, model: ModelArtifact) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            normalizer,
            model,
        }
    }

    /// Rebuilds a BPE tokenizer, checking the merge-table invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::ModelMismatch`] for a Unigram artifact and
    /// [`PersistError::Malformed`] if an invariant does not hold.
    pub fn into_bpe(self) -> Result<BpeTokenizer, PersistError> {
        let (vocab, merges) = match self.model {
            ModelArtifact::Bpe { vocab, merges } => (vocab, merges),
            other => {
                return Err(PersistError::ModelMismatch {
                    expected: "bpe",
                    found: other.kind(),
                })
            }
        };

        check_dense(vocab.iter().map(|e| e.id))?;
        let vocab = Vocabulary::from_tokens(vocab.into_iter().map(|e| e.bytes))
            .map_err(|t| malformed(format!("empty or duplicate token {t:?}")))?;

        if vocab.len() != BYTE_VOCAB_SIZE + merges.len() {
            return Err(malformed(format!(
                "{} tokens do not match 256 bytes + {} merges",
                vocab.len(),
                merges.len()
            )));
        }
        for b in 0..BYTE_VOCAB_SIZE {
            if vocab.id_to_token(b) != Some(&[b as u8][..]) {
                return Err(malformed(format!("id {b} is not the byte {b}")));
            }
        }

        for (order, rule) in merges.iter().enumerate() {
            if rule.id != BYTE_VOCAB_SIZE + order || rule.left >= rule.id || rule.right >= rule.id {
                return Err(malformed(format!("merge {order} is out of order: {rule:?}")));
            }
            let left = vocab.id_to_token(rule.left).unwrap_or_default();
            let right = vocab.id_to_token(rule.right).unwrap_or_default();
            let merged = vocab.id_to_token(rule.id).unwrap_or_default();
            if merged.len() != left.len() + right.len() || !merged.starts_with(left) || !merged.ends_with(right) {
                return Err(malformed(format!(
                    "token {} is not the concatenation of {} and {}",
                    rule.id, rule.left, rule.right
                )));
            }
        }

        Ok(BpeTokenizer::from_parts(vocab, merges, self.normalizer))
    }

    /// Rebuilds a Unigram tokenizer, checking the score-table invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::ModelMismatch`] for a BPE artifact and
    /// [`PersistError::Malformed`] if an invariant does not hold.
    pub fn into_unigram(self) -> Result<UnigramTokenizer, PersistError> {
        let (window, vocab) = match self.model {
            ModelArtifact::Unigram { window, vocab } => (window, vocab),
            other => {
                return Err(PersistError::ModelMismatch {
                    expected: "unigram",
                    found: other.kind(),
                })
            }
        };

        if window == 0 {
            return Err(malformed("window must be at least 1".to_owned()));
        }
        check_dense(vocab.iter().map(|e| e.id))?;

        for entry in &vocab {
            if entry.bytes.is_empty() || entry.bytes.len() > window {
                return Err(malformed(format!(
                    "token {} has length {} outside 1..={window}",
                    entry.id,
                    entry.bytes.len()
                )));
            }
            if !entry.score.is_finite() {
                return Err(malformed(format!("token {} has score {}", entry.id, entry.score)));
            }
        }
        // Strictly ascending also rules out duplicates.
        if let Some(pair) = vocab.windows(2).find(|w| w[0].bytes >= w[1].bytes) {
            return Err(malformed(format!("token {} is out of byte order", pair[1].id)));
        }

        let entries = vocab.into_iter().map(|e| (e.bytes, e.score)).collect();
        Ok(UnigramTokenizer::from_sorted(entries, window, self.normalizer))
    }

    /// Rebuilds whichever engine the artifact holds.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Malformed`] if an invariant does not hold.
    pub fn into_tokenizer(self) -> Result<Box<dyn Tokenizer + Send + Sync>, PersistError> {
        match self.model {
            ModelArtifact::Bpe { .. } => Ok(Box::new(self.into_bpe()?)),
            ModelArtifact::Unigram { .. } => Ok(Box::new(self.into_unigram()?)),
        }
    }
}

fn malformed(msg: String) -> PersistError {
    PersistError::Malformed(msg)
}

/// Entry ids must be exactly `0, 1, 2, ...` in order.
fn check_dense(ids: impl Iterator<Item = Token>) -> Result<(), PersistError> {
    for (expected, id) in ids.enumerate() {
        if id != expected {
            return Err(malformed(format!("expected id {expected}, found {id}")));
        }
    }
    Ok(())
}

/// `<path>.tmp`, next to the target so the final rename stays on one filesystem.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_json(path: &Path, artifact: &Artifact) -> Result<(), PersistError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, artifact)?;
    writer.flush()?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(())
}

/// Writes `artifact` to `path` as compact JSON.
///
/// The JSON goes to a temporary sibling first and is renamed over `path`, so a
/// failed write leaves any previous artifact intact.
///
/// # Errors
///
/// Returns [`PersistError::Io`] or [`PersistError::Json`] if writing fails.
pub fn write_artifact(path: &Path, artifact: &Artifact) -> Result<(), PersistError> {
    let tmp_path = temp_sibling(path);
    if let Err(e) = write_json(&tmp_path, artifact) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Reads an artifact from `path`, checking its format version first.
///
/// # Errors
///
/// Returns [`PersistError::UnsupportedVersion`] for a version other than
/// [`FORMAT_VERSION`], and [`PersistError::Io`] / [`PersistError::Json`] if the
/// file cannot be read or parsed.
pub fn read_artifact(path: &Path) -> Result<Artifact, PersistError> {
    let json = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&json)?;

    let version = value
        .get("format_version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| malformed("missing format_version".to_owned()))?;
    if version != u64::from(FORMAT_VERSION) {
        return Err(PersistError::UnsupportedVersion(
            u32::try_from(version).unwrap_or(u32::MAX),
        ));
    }

    Ok(serde_json::from_value(value)?)
}

/// Loads a tokenizer of either engine from `path`.
///
/// # Errors
///
/// See [`read_artifact`] and [`Artifact::into_tokenizer`].
pub fn load_tokenizer(path: impl AsRef<Path>) -> Result<Box<dyn Tokenizer + Send + Sync>, PersistError> {
    read_artifact(path.as_ref())?.into_tokenizer()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnigramConfig;

    fn bpe() -> BpeTokenizer {
        match BpeTokenizer::train("the cat sat on the mat", 270) {
            Ok(tok) => tok,
            Err(e) => panic!("training failed: {e}"),
        }
    }

    fn unigram() -> UnigramTokenizer {
        match UnigramTokenizer::train("the cat sat on the mat", 30) {
            Ok(tok) => tok,
            Err(e) => panic!("training failed: {e}"),
        }
    }

    #[test]
    fn test_bpe_save_load_identical() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("bpe.json");
        let tok = bpe();
        tok.save(&path).expect("save succeeds");

        let loaded = BpeTokenizer::load(&path).expect("load succeeds");
        assert_eq!(loaded.merges(), tok.merges());
        assert_eq!(loaded.vocab(), tok.vocab());
        for text in ["the mat", "a cat on a hat", "", "ünseen"] {
            assert_eq!(loaded.encode(text).ok(), tok.encode(text).ok());
        }
    }

    #[test]
    fn test_unigram_save_load_identical() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("unigram.json");
        let tok = unigram();
        tok.save(&path).expect("save succeeds");

        let loaded = UnigramTokenizer::load(&path).expect("load succeeds");
        assert_eq!(loaded.vocab(), tok.vocab());
        for (_, bytes, score) in tok.scored_tokens() {
            assert_eq!(loaded.score(bytes).map(f64::to_bits), Some(score.to_bits()));
        }
        for text in ["the mat", "cat sat", "tacos"] {
            assert_eq!(loaded.encode(text), tok.encode(text));
        }
    }

    #[test]
    fn test_load_tokenizer_dispatches_on_type() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("any.json");
        unigram().save(&path).expect("save succeeds");
        let tok = load_tokenizer(&path).expect("load succeeds");
        let ids = tok.encode("the cat").expect("all bytes scored");
        assert_eq!(tok.decode(&ids).expect("ids are valid"), "the cat");
    }

    #[test]
    fn test_model_mismatch() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("bpe.json");
        bpe().save(&path).expect("save succeeds");
        match UnigramTokenizer::load(&path) {
            Err(PersistError::ModelMismatch { expected, found }) => {
                assert_eq!((expected, found), ("unigram", "bpe"));
            }
            other => panic!("expected ModelMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_version() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("future.json");
        std::fs::write(&path, r#"{"format_version": 7, "anything": []}"#).expect("write");
        assert!(matches!(
            read_artifact(&path),
            Err(PersistError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_rejects_broken_merge() {
        let mut artifact = bpe().to_artifact();
        if let ModelArtifact::Bpe { merges, .. } = &mut artifact.model {
            merges[0].right = merges[0].left.wrapping_add(1) % 256;
        }
        assert!(matches!(artifact.into_bpe(), Err(PersistError::Malformed(_))));
    }

    #[test]
    fn test_rejects_sparse_ids() {
        let mut artifact = unigram().to_artifact();
        if let ModelArtifact::Unigram { vocab, .. } = &mut artifact.model {
            vocab[1].id = 99;
        }
        assert!(matches!(artifact.into_unigram(), Err(PersistError::Malformed(_))));
    }

    #[test]
    fn test_failed_save_keeps_previous_artifact() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("model.json");
        let first = bpe();
        first.save(&path).expect("save succeeds");
        assert!(!dir.path().join("model.json.tmp").exists());

        // A directory squatting on the temp name makes the next write fail.
        std::fs::create_dir(dir.path().join("model.json.tmp")).expect("create dir");
        let second = BpeTokenizer::train("completely different text", 300).expect("valid config");
        assert!(matches!(second.save(&path), Err(PersistError::Io(_))));

        let loaded = BpeTokenizer::load(&path).expect("previous artifact is intact");
        assert_eq!(loaded.merges(), first.merges());
    }

    #[test]
    fn test_custom_sentinel_survives_save_load() {
        let dir = tempfile::tempdir().expect("temp dir");
        let norm = Normalizer::new('\u{2581}');
        let corpus = "the cat sat on the mat";
        let texts = ["the mat", "a cat sat", "on the  mat "];

        let cfg = UnigramConfig::new(40).with_normalizer(norm);
        let uni = UnigramTokenizer::train_with_config(corpus, &cfg).expect("valid config");
        let uni_path = dir.path().join("unigram.json");
        uni.save(&uni_path).expect("save succeeds");
        let uni_loaded = UnigramTokenizer::load(&uni_path).expect("load succeeds");
        assert_eq!(uni_loaded.normalizer(), &norm);
        // Spaces reach the model only as the sentinel's bytes.
        assert!(uni_loaded.token_to_id(&[0xe2]).is_some());
        assert!(uni_loaded.token_to_id(b" ").is_none());

        let bpe_cfg = crate::config::BpeConfig::new(280).with_normalizer(norm);
        let bpe = BpeTokenizer::train_with_config(corpus, &bpe_cfg).expect("valid config");
        let bpe_path = dir.path().join("bpe.json");
        bpe.save(&bpe_path).expect("save succeeds");
        let bpe_loaded = BpeTokenizer::load(&bpe_path).expect("load succeeds");
        assert_eq!(bpe_loaded.normalizer(), &norm);

        for text in texts {
            let ids = uni.encode(text).expect("corpus bytes only");
            assert_eq!(uni_loaded.encode(text), Ok(ids.clone()));
            assert_eq!(uni_loaded.decode(&ids).expect("ids are valid"), text);

            let ids = bpe.encode(text).expect("bpe encode never fails");
            assert_eq!(bpe_loaded.encode(text), Ok(ids.clone()));
            assert_eq!(bpe_loaded.decode(&ids).expect("ids are valid"), text);
        }
    }

    #[test]
    fn test_schema_is_tagged() {
        let cfg = UnigramConfig::new(5).with_window(2);
        let tok = UnigramTokenizer::train_with_config("abab", &cfg).expect("valid config");
        let json = serde_json::to_value(tok.to_artifact()).expect("serializable");
        assert_eq!(json["format_version"], 1);
        assert_eq!(json["model"]["type"], "unigram");
        assert_eq!(json["model"]["window"], 2);
        assert_eq!(json["model"]["vocab"][0]["bytes"], serde_json::json!([97]));
    }
}
