//! PyO3 bindings, built with the `python` feature.

use std::{borrow::Cow, path::PathBuf, str::FromStr};

use pyo3::{
    exceptions::{PyIOError, PyValueError},
    prelude::*,
};

use crate::{
    BpeConfig, BpeTokenizer, ErrorMode, Normalizer, PersistError, Tokenizer, UnigramConfig,
    UnigramTokenizer,
};

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn persist_error(e: PersistError) -> PyErr {
    match e {
        PersistError::Io(e) => PyIOError::new_err(e.to_string()),
        other => value_error(other),
    }
}

fn decode_impl(tok: &impl Tokenizer, ids: Vec<usize>, errors: &str) -> PyResult<String> {
    let mode = ErrorMode::from_str(errors).map_err(PyValueError::new_err)?;
    tok.decode_with(&ids, mode).map_err(value_error)
}

/// Python wrapper for the BPE tokenizer.
#[pyclass(name = "BpeTokenizer", module = "_subtok")]
pub struct PyBpeTokenizer {
    inner: BpeTokenizer,
}

#[pymethods]
impl PyBpeTokenizer {
    #[staticmethod]
    #[pyo3(signature = (corpus, vocab_size, show_progress = false, sentinel = ' '))]
    fn train(corpus: &str, vocab_size: usize, show_progress: bool, sentinel: char) -> PyResult<Self> {
        let cfg = BpeConfig::new(vocab_size)
            .with_progress(show_progress)
            .with_normalizer(Normalizer::new(sentinel));
        let inner = BpeTokenizer::train_with_config(corpus, &cfg).map_err(value_error)?;
        Ok(Self { inner })
    }

    #[staticmethod]
    fn load(path: PathBuf) -> PyResult<Self> {
        let inner = BpeTokenizer::load(path).map_err(persist_error)?;
        Ok(Self { inner })
    }

    fn encode(&self, text: &str) -> PyResult<Vec<usize>> {
        self.inner.encode(text).map_err(value_error)
    }

    #[pyo3(signature = (ids, errors = "strict"))]
    fn decode(&self, ids: Vec<usize>, errors: &str) -> PyResult<String> {
        decode_impl(&self.inner, ids, errors)
    }

    fn save(&self, path: PathBuf) -> PyResult<()> {
        self.inner.save(&path).map_err(persist_error)
    }

    #[getter]
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    fn token_to_id(&self, token: &[u8]) -> Option<usize> {
        self.inner.token_to_id(token)
    }

    fn id_to_token(&self, id: usize) -> Option<Cow<'_, [u8]>> {
        self.inner.id_to_token(id).map(Cow::Borrowed)
    }

    /// Merge rules as `((left, right), id)` in priority order.
    fn merges(&self) -> Vec<((usize, usize), usize)> {
        self.inner
            .merges()
            .iter()
            .map(|rule| ((rule.left, rule.right), rule.id))
            .collect()
    }
}

/// Python wrapper for the Unigram tokenizer.
#[pyclass(name = "UnigramTokenizer", module = "_subtok")]
pub struct PyUnigramTokenizer {
    inner: UnigramTokenizer,
}

#[pymethods]
impl PyUnigramTokenizer {
    #[staticmethod]
    #[pyo3(signature = (
        corpus,
        vocab_size,
        window = crate::DEFAULT_WINDOW,
        byte_fallback = false,
        show_progress = false,
        sentinel = ' '
    ))]
    fn train(
        corpus: &str,
        vocab_size: usize,
        window: usize,
        byte_fallback: bool,
        show_progress: bool,
        sentinel: char,
    ) -> PyResult<Self> {
        let cfg = UnigramConfig::new(vocab_size)
            .with_window(window)
            .with_byte_fallback(byte_fallback)
            .with_progress(show_progress)
            .with_normalizer(Normalizer::new(sentinel));
        let inner = UnigramTokenizer::train_with_config(corpus, &cfg).map_err(value_error)?;
        Ok(Self { inner })
    }

    #[staticmethod]
    fn load(path: PathBuf) -> PyResult<Self> {
        let inner = UnigramTokenizer::load(path).map_err(persist_error)?;
        Ok(Self { inner })
    }

    fn encode(&self, text: &str) -> PyResult<Vec<usize>> {
        self.inner.encode(text).map_err(value_error)
    }

    #[pyo3(signature = (ids, errors = "strict"))]
    fn decode(&self, ids: Vec<usize>, errors: &str) -> PyResult<String> {
        decode_impl(&self.inner, ids, errors)
    }

    fn save(&self, path: PathBuf) -> PyResult<()> {
        self.inner.save(&path).map_err(persist_error)
    }

    #[getter]
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    fn token_to_id(&self, token: &[u8]) -> Option<usize> {
        self.inner.token_to_id(token)
    }

    fn id_to_token(&self, id: usize) -> Option<Cow<'_, [u8]>> {
        self.inner.id_to_token(id).map(Cow::Borrowed)
    }

    fn score(&self, token: &[u8]) -> Option<f64> {
        self.inner.score(token)
    }
}

#[pymodule]
fn _subtok(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyBpeTokenizer>()?;
    m.add_class::<PyUnigramTokenizer>()?;
    Ok(())
}
