//! Transpose of a block index: identifier → tokens.
//!
//! Only used as scratch state by the candidate generator. Entries borrow from
//! the source [`BlockIndex`], so inverting never copies token or id strings.

use crate::index::BlockIndex;
use std::collections::HashMap;

/// Mapping from record identifier to the tokens whose buckets contain it.
#[derive(Debug, Default)]
pub struct InvertedIndex<'a> {
    entries: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> InvertedIndex<'a> {
    /// Tokens of `id`, if it appears in any retained bucket.
    pub fn get(&self, id: &str) -> Option<&[&'a str]> {
        self.entries.get(id).map(Vec::as_slice)
    }

    /// Number of distinct identifiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no identifier is present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All `(id, tokens)` entries, in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &[&'a str])> + '_ {
        self.entries.iter().map(|(id, tokens)| (*id, tokens.as_slice()))
    }
}

/// Inverts every bucket of `index`.
pub fn invert(index: &BlockIndex) -> InvertedIndex<'_> {
    invert_where(index, |_| true)
}

/// Inverts only the buckets whose token satisfies `keep`.
pub fn invert_where<'a, F>(index: &'a BlockIndex, keep: F) -> InvertedIndex<'a>
where
    F: Fn(&str) -> bool,
{
    let mut entries: HashMap<&'a str, Vec<&'a str>> = HashMap::new();
    for (token, ids) in index.iter() {
        if !keep(token) {
            continue;
        }
        for id in ids {
            entries.entry(id.as_str()).or_default().push(token);
        }
    }
    InvertedIndex { entries }
}
