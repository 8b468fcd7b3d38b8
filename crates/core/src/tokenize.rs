//! Signature tokenizer for exact and q-gram blocking.
//!
//! Values are normalized (trim and/or lowercase) before tokenizing. Exact
//! blocking yields the normalized value as its only token; q-gram blocking
//! yields every contiguous window of `q` characters, falling back to the whole
//! value when it is shorter than `q`. Lengths are counted in Unicode scalar
//! values, not bytes.

use crate::config::MIN_QGRAM_SIZE;
use crate::error::BlockingError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;

/// Blocking method, tagged by `type` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Method {
    /// One token per value: the normalized value itself.
    #[serde(rename = "base-block")]
    BaseBlock,
    /// Overlapping character windows of length `q`.
    #[serde(rename = "q-gram")]
    QGram { q: usize },
}

/// Normalization applied to every value before tokenizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Normalization {
    /// Case-fold values (`Smith` and `smith` share a token).
    pub lowercase: bool,
    /// Strip leading and trailing whitespace.
    pub trim: bool,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            lowercase: true,
            trim: true,
        }
    }
}

impl Normalization {
    /// No normalization at all; values are tokenized verbatim.
    pub const VERBATIM: Normalization = Normalization {
        lowercase: false,
        trim: false,
    };

    /// Applies the normalization; only case-folding allocates.
    pub fn apply<'a>(&self, value: &'a str) -> Cow<'a, str> {
        let value = if self.trim { value.trim() } else { value };
        if self.lowercase {
            Cow::Owned(value.to_lowercase())
        } else {
            Cow::Borrowed(value)
        }
    }
}

/// Converts blocking values into signature tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tokenizer {
    method: Method,
    normalization: Normalization,
}

impl Tokenizer {
    /// Creates a tokenizer. Fails if a q-gram size is below [`MIN_QGRAM_SIZE`].
    pub fn new(method: Method, normalization: Normalization) -> Result<Self, BlockingError> {
        if let Method::QGram { q } = method {
            if q < MIN_QGRAM_SIZE {
                return Err(BlockingError::Config(format!(
                    "q-gram size must be >= {}, got {}",
                    MIN_QGRAM_SIZE, q
                )));
            }
        }
        Ok(Self {
            method,
            normalization,
        })
    }

    /// Exact blocking with the default normalization.
    pub fn exact() -> Self {
        Self {
            method: Method::BaseBlock,
            normalization: Normalization::default(),
        }
    }

    /// Q-gram blocking with the default normalization.
    pub fn qgram(q: usize) -> Result<Self, BlockingError> {
        Self::new(Method::QGram { q }, Normalization::default())
    }

    /// The configured blocking method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The configured normalization.
    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    /// Tokens for a single value, in left-to-right order.
    ///
    /// Repeated windows (e.g. `aa` twice in `aaa`) are kept; deduplication
    /// happens per record in [`record_tokens`](Tokenizer::record_tokens).
    /// Every value yields at least one token; a value that is empty after
    /// normalization yields the empty token.
    pub fn tokens(&self, value: &str) -> Vec<String> {
        let normalized = self.normalization.apply(value);
        match self.method {
            Method::BaseBlock => vec![normalized.into_owned()],
            Method::QGram { q } => qgrams(&normalized, q),
        }
    }

    /// Union of the tokens of all values of one record, first-seen order.
    pub fn record_tokens<S: AsRef<str>>(&self, values: &[S]) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for value in values {
            for token in self.tokens(value.as_ref()) {
                if seen.insert(token.clone()) {
                    out.push(token);
                }
            }
        }
        out
    }
}

fn qgrams(value: &str, q: usize) -> Vec<String> {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < q {
        return vec![value.to_string()];
    }
    chars.windows(q).map(|w| w.iter().collect()).collect()
}
