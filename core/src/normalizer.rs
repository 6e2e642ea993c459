//! Multilingual text normalization: case folding, glued-token expansion, tokenization and
//! stemming.

use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use unicode_normalization::UnicodeNormalization;

use crate::{Error, Result};

lazy_static! {
    static ref ALNUM_RUN: Regex = Regex::new(r"[\p{Alphabetic}\p{M}\p{N}]+").expect("valid regex");
    static ref NON_ALNUM: Regex = Regex::new(r"[^\p{Alphabetic}\p{M}\p{N}\s]+").expect("valid regex");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid regex");
}

/// ISO 639-1 codes of the languages stemmed by default.
pub const DEFAULT_LANGUAGES: &[(&str, Algorithm)] = &[
    ("da", Algorithm::Danish),
    ("de", Algorithm::German),
    ("en", Algorithm::English),
    ("es", Algorithm::Spanish),
    ("fi", Algorithm::Finnish),
    ("fr", Algorithm::French),
    ("hu", Algorithm::Hungarian),
    ("it", Algorithm::Italian),
    ("nl", Algorithm::Dutch),
    ("no", Algorithm::Norwegian),
    ("pt", Algorithm::Portuguese),
    ("ro", Algorithm::Romanian),
    ("sv", Algorithm::Swedish),
];

/// A deterministic stemming capability for one language.
pub trait Stem: Send + Sync {
    fn stem<'a>(&self, word: &'a str) -> Cow<'a, str>;
}

impl Stem for Stemmer {
    fn stem<'a>(&self, word: &'a str) -> Cow<'a, str> {
        Stemmer::stem(self, word)
    }
}

/// How [`Normalizer::normalize`] treats the tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode<'a> {
    /// Stem every token with the stemmer of the given language.
    Document(&'a str),
    /// Stem every token with every stemmer; return the sorted, deduplicated union of stems
    /// and original tokens.
    Query,
    /// Tokenize only.
    Plain,
}

/// Text normalization service holding an immutable language -> stemmer registry.
///
/// Built once and shared by reference with every worker.
pub struct Normalizer {
    stemmers: BTreeMap<String, Box<dyn Stem>>,
}

impl Normalizer {
    /// A normalizer with no stemmers; only [`Mode::Plain`] and [`Mode::Query`] are useful.
    pub fn empty() -> Self {
        Self { stemmers: BTreeMap::new() }
    }

    /// Registers `stemmer` for `language`, replacing any previous one.
    pub fn with_stemmer(mut self, language: impl Into<String>, stemmer: impl Stem + 'static) -> Self {
        self.stemmers.insert(language.into(), Box::new(stemmer));
        self
    }

    pub fn supports(&self, language: &str) -> bool {
        self.stemmers.contains_key(language)
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.stemmers.keys().map(String::as_str)
    }

    /// Normalizes `text` and returns the tokens joined by single spaces.
    pub fn normalize(&self, text: &str, mode: Mode<'_>) -> Result<String> {
        Ok(self.tokens(text, mode)?.join(" "))
    }

    /// Normalizes `text` and returns the resulting tokens.
    ///
    /// In [`Mode::Document`] the token order follows the text, with glued-token expansions
    /// appended at the end. In [`Mode::Query`] the tokens are sorted and unique.
    pub fn tokens(&self, text: &str, mode: Mode<'_>) -> Result<Vec<String>> {
        match mode {
            Mode::Plain => Ok(tokenize(text)),
            Mode::Document(language) => {
                let stemmer = self
                    .stemmers
                    .get(language)
                    .ok_or_else(|| Error::UnsupportedLanguage(language.to_string()))?;
                Ok(tokenize(text).iter().map(|t| stemmer.stem(t).into_owned()).collect())
            }
            Mode::Query => {
                let mut forms = BTreeSet::new();
                for token in tokenize(text) {
                    for stemmer in self.stemmers.values() {
                        forms.insert(stemmer.stem(&token).into_owned());
                    }
                    forms.insert(token);
                }
                Ok(forms.into_iter().collect())
            }
        }
    }
}

impl Default for Normalizer {
    /// Snowball stemmers for [`DEFAULT_LANGUAGES`].
    fn default() -> Self {
        DEFAULT_LANGUAGES
            .iter()
            .fold(Self::empty(), |n, (code, algorithm)| n.with_stemmer(*code, Stemmer::create(*algorithm)))
    }
}

/// Case-folds `text`, expands glued tokens and splits it into alphanumeric tokens.
///
/// A whitespace-delimited word holding two or more alphanumeric runs separated by punctuation
/// (`i'm`, `34+45`, `ph.d.`) yields its split runs in place and, appended after the whole
/// text, the runs concatenated (`im`, `3445`, `phd`).
pub fn tokenize(text: &str) -> Vec<String> {
    let folded: String = text.nfkc().collect::<String>().to_lowercase();
    let expanded = expand_glued(&folded);
    let stripped = NON_ALNUM.replace_all(&expanded, " ");
    collapse_whitespace(&stripped)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Appends the punctuation-free form of every glued word to `text`.
fn expand_glued(text: &str) -> Cow<'_, str> {
    let glued: Vec<String> = text
        .split_whitespace()
        .filter_map(|word| {
            let runs: Vec<&str> = ALNUM_RUN.find_iter(word).map(|m| m.as_str()).collect();
            (runs.len() > 1).then(|| runs.concat())
        })
        .collect();
    if glued.is_empty() {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{text} {}", glued.join(" ")))
    }
}

/// Replaces runs of whitespace with a single space and trims both ends.
pub fn collapse_whitespace(text: &str) -> Cow<'_, str> {
    match WHITESPACE.replace_all(text, " ") {
        Cow::Borrowed(s) => Cow::Borrowed(s.trim()),
        Cow::Owned(s) => Cow::Owned(s.trim().to_string()),
    }
}
