//! Per-dataset block index: token → identifiers sharing it.
//!
//! A [`BlockIndexBuilder`] owns the mutable bucket map during one build pass
//! and is consumed by [`finalize`](BlockIndexBuilder::finalize), which yields
//! an immutable [`BlockIndex`]. Only a `BlockIndex` is accepted by the
//! candidate generator, so an unfinished index can never reach the join.

use crate::config::MAX_LOGGED_SKIPS;
use crate::error::{BlockingError, ExtractionError};
use crate::extract::FieldExtractor;
use crate::source::SourceRecord;
use crate::tokenize::Tokenizer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation shared between a controller and build passes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every build pass holding this flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`cancel`](CancelFlag::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters collected during one build pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Records pulled from the source, malformed ones included.
    pub records_read: u64,
    /// Records whose identifier resolved and whose tokens were inserted.
    pub records_indexed: u64,
    /// Records skipped because they were malformed or had no usable identifier.
    pub records_skipped: u64,
    /// Indexed records that produced no tokens at all.
    pub records_without_tokens: u64,
}

/// Mutable accumulator for one dataset's block index.
#[derive(Debug)]
pub struct BlockIndexBuilder {
    name: String,
    extractor: FieldExtractor,
    tokenizer: Tokenizer,
    buckets: HashMap<String, Vec<String>>,
    stats: BuildStats,
    cancel: Option<CancelFlag>,
}

impl BlockIndexBuilder {
    /// Creates an empty builder.
    pub fn new(name: impl Into<String>, extractor: FieldExtractor, tokenizer: Tokenizer) -> Self {
        Self {
            name: name.into(),
            extractor,
            tokenizer,
            buckets: HashMap::new(),
            stats: BuildStats::default(),
            cancel: None,
        }
    }

    /// Checks `flag` once per record during [`build`](BlockIndexBuilder::build).
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Index name used in logs and snapshots.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Counters so far.
    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    /// Appends `id` to the bucket of every token, creating buckets as needed.
    ///
    /// Inserting the same identifier twice duplicates it in its buckets.
    pub fn insert<S: AsRef<str>>(&mut self, id: &str, tokens: &[S]) {
        for token in tokens {
            self.buckets
                .entry(token.as_ref().to_string())
                .or_default()
                .push(id.to_string());
        }
    }

    /// Extracts, tokenizes and inserts one structured record.
    pub fn add_record(&mut self, record: &Value) -> Result<(), ExtractionError> {
        let extracted = self.extractor.extract(record)?;
        let tokens = self.tokenizer.record_tokens(&extracted.values);
        if tokens.is_empty() {
            self.stats.records_without_tokens += 1;
        }
        self.insert(&extracted.id, &tokens);
        self.stats.records_indexed += 1;
        Ok(())
    }

    /// Runs a full build pass over `records` and freezes the result.
    ///
    /// Malformed records and records without a resolvable identifier are
    /// skipped and counted. A read error or cancellation aborts the pass and
    /// drops everything accumulated so far.
    pub fn build<I>(mut self, records: I) -> Result<BlockIndex, BlockingError>
    where
        I: IntoIterator<Item = io::Result<SourceRecord>>,
    {
        let mut records = records.into_iter();
        loop {
            if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                tracing::warn!(
                    index = %self.name,
                    records = self.stats.records_read,
                    "Build cancelled, discarding partial index"
                );
                return Err(BlockingError::Cancelled {
                    index: self.name,
                    records: self.stats.records_read,
                });
            }
            let Some(next) = records.next() else {
                break;
            };
            let record = next.inspect_err(|e| {
                tracing::error!(index = %self.name, "Read failed, aborting build: {}", e);
            })?;
            self.stats.records_read += 1;
            let outcome = match &record {
                SourceRecord::Parsed { value, .. } => self.add_record(value),
                SourceRecord::Malformed { line, reason } => Err(ExtractionError::Malformed {
                    line: *line,
                    reason: reason.clone(),
                }),
            };
            if let Err(e) = outcome {
                self.skip(record.line(), &e);
            }
        }
        Ok(self.finalize())
    }

    /// Convenience over [`build`](BlockIndexBuilder::build) for in-memory records.
    pub fn build_from_values<I>(self, values: I) -> Result<BlockIndex, BlockingError>
    where
        I: IntoIterator<Item = Value>,
    {
        self.build(crate::source::from_values(values))
    }

    fn skip(&mut self, line: u64, error: &ExtractionError) {
        self.stats.records_skipped += 1;
        if self.stats.records_skipped <= MAX_LOGGED_SKIPS {
            tracing::warn!(index = %self.name, line, "Skipping record: {}", error);
        }
    }

    /// Drops empty buckets and freezes the index.
    pub fn finalize(mut self) -> BlockIndex {
        self.buckets.retain(|_, ids| !ids.is_empty());
        if self.stats.records_skipped > MAX_LOGGED_SKIPS {
            tracing::warn!(
                index = %self.name,
                "{} records skipped ({} logged)",
                self.stats.records_skipped,
                MAX_LOGGED_SKIPS
            );
        }
        tracing::info!(
            index = %self.name,
            records_read = self.stats.records_read,
            records_indexed = self.stats.records_indexed,
            records_skipped = self.stats.records_skipped,
            tokens = self.buckets.len(),
            "Block index finalized"
        );
        BlockIndex::from_parts(self.name, self.tokenizer, self.buckets, self.stats)
    }
}

/// Immutable block index mapping each signature token to its identifiers.
///
/// Bucket order follows insertion order and carries no meaning. Freely
/// shareable across threads for reads.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    name: String,
    tokenizer: Tokenizer,
    buckets: HashMap<String, Vec<String>>,
    stats: BuildStats,
}

impl BlockIndex {
    pub(crate) fn from_parts(
        name: String,
        tokenizer: Tokenizer,
        buckets: HashMap<String, Vec<String>>,
        stats: BuildStats,
    ) -> Self {
        Self {
            name,
            tokenizer,
            buckets,
            stats,
        }
    }

    pub(crate) fn buckets(&self) -> &HashMap<String, Vec<String>> {
        &self.buckets
    }

    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tokenizer the index was built with.
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Counters from the build pass.
    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    /// Identifiers sharing `token`, if the token is present.
    pub fn get(&self, token: &str) -> Option<&[String]> {
        self.buckets.get(token).map(Vec::as_slice)
    }

    /// Bucket size of `token`; 0 when absent.
    pub fn bucket_size(&self, token: &str) -> usize {
        self.buckets.get(token).map_or(0, Vec::len)
    }

    /// Returns `true` if the index has a bucket for `token`.
    pub fn contains_token(&self, token: &str) -> bool {
        self.buckets.contains_key(token)
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if the index holds no tokens.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// All tokens, in unspecified order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> + '_ {
        self.buckets.keys().map(String::as_str)
    }

    /// All `(token, identifiers)` entries, in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.buckets
            .iter()
            .map(|(token, ids)| (token.as_str(), ids.as_slice()))
    }

    /// Checks structural invariants; used after loading a snapshot.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("index name is empty".to_string());
        }
        for (token, ids) in &self.buckets {
            if ids.is_empty() {
                return Err(format!("bucket for token '{}' is empty", token));
            }
            if ids.iter().any(String::is_empty) {
                return Err(format!("bucket for token '{}' holds an empty id", token));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::{BTreeMap, BTreeSet};

    fn builder(tokenizer: Tokenizer) -> BlockIndexBuilder {
        let extractor = FieldExtractor::new("id", &["name"]).unwrap();
        BlockIndexBuilder::new("test", extractor, tokenizer)
    }

    fn as_sets(index: &BlockIndex) -> BTreeMap<String, BTreeSet<String>> {
        index
            .iter()
            .map(|(t, ids)| (t.to_string(), ids.iter().cloned().collect()))
            .collect()
    }

    #[test]
    fn test_insert_creates_and_appends() {
        let mut b = builder(Tokenizer::exact());
        b.insert("id1", &["smith"]);
        b.insert("id2", &["smith", "jones"]);
        let index = b.finalize();
        assert_eq!(index.get("smith").unwrap(), ["id1", "id2"]);
        assert_eq!(index.get("jones").unwrap(), ["id2"]);
        assert_eq!(index.bucket_size("brown"), 0);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_double_insert_duplicates_identifier() {
        let mut b = builder(Tokenizer::exact());
        b.insert("id1", &["smith"]);
        b.insert("id1", &["smith"]);
        assert_eq!(b.finalize().bucket_size("smith"), 2);
    }

    #[test]
    fn test_record_contributes_once_per_token() {
        let extractor = FieldExtractor::new("id", &["first", "last"]).unwrap();
        let b = BlockIndexBuilder::new("dup", extractor, Tokenizer::exact());
        let index = b
            .build_from_values(vec![json!({"id": "r1", "first": "Lee", "last": "lee"})])
            .unwrap();
        assert_eq!(index.get("lee").unwrap(), ["r1"]);
    }

    #[test]
    fn test_blank_value_stays_blockable() {
        let index = builder(Tokenizer::qgram(2).unwrap())
            .build_from_values(vec![
                json!({"id": "r1", "name": "  "}),
                json!({"id": "r2", "name": ""}),
            ])
            .unwrap();
        assert_eq!(index.get("").unwrap(), ["r1", "r2"]);
        assert_eq!(index.stats().records_without_tokens, 0);
        assert!(index.validate().is_ok());
    }

    #[test]
    fn test_build_skips_bad_records() {
        let records = vec![
            Ok(SourceRecord::Parsed {
                line: 1,
                value: json!({"id": "a", "name": "Smith"}),
            }),
            Ok(SourceRecord::Parsed {
                line: 2,
                value: json!({"name": "NoId"}),
            }),
            Ok(SourceRecord::Malformed {
                line: 3,
                reason: "bad json".into(),
            }),
            Ok(SourceRecord::Parsed {
                line: 4,
                value: json!({"id": "b"}),
            }),
        ];
        let index = builder(Tokenizer::exact()).build(records).unwrap();
        let stats = index.stats();
        assert_eq!(stats.records_read, 4);
        assert_eq!(stats.records_indexed, 2);
        assert_eq!(stats.records_skipped, 2);
        assert_eq!(stats.records_without_tokens, 1);
        assert_eq!(index.get("smith").unwrap(), ["a"]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_read_error_aborts_build() {
        let records = vec![
            Ok(SourceRecord::Parsed {
                line: 1,
                value: json!({"id": "a", "name": "Smith"}),
            }),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "disk gone")),
        ];
        let err = builder(Tokenizer::exact()).build(records).unwrap_err();
        assert!(matches!(err, BlockingError::Io(_)));
    }

    #[test]
    fn test_cancelled_build_returns_no_index() {
        let flag = CancelFlag::new();
        let b = builder(Tokenizer::exact()).with_cancel_flag(flag.clone());
        let trigger = flag.clone();
        let records = (0..10).map(move |i| {
            if i == 3 {
                trigger.cancel();
            }
            Ok(SourceRecord::Parsed {
                line: i + 1,
                value: json!({"id": format!("r{i}"), "name": "x"}),
            })
        });
        match b.build(records) {
            Err(BlockingError::Cancelled { index, records }) => {
                assert_eq!(index, "test");
                assert_eq!(records, 4);
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_rebuild_is_bucket_for_bucket_identical() {
        let values = vec![
            json!({"id": "1", "name": "smith"}),
            json!({"id": "2", "name": "smyth"}),
            json!({"id": "3", "name": "jones"}),
            json!({"id": "4", "name": "smith"}),
        ];
        let tok = Tokenizer::qgram(2).unwrap();
        let first = builder(tok).build_from_values(values.clone()).unwrap();
        let second = builder(tok).build_from_values(values).unwrap();
        assert_eq!(as_sets(&first), as_sets(&second));
    }

    #[test]
    fn test_validate() {
        let mut b = builder(Tokenizer::exact());
        b.insert("id1", &["smith"]);
        assert!(b.finalize().validate().is_ok());

        let mut broken = builder(Tokenizer::exact()).finalize();
        broken.buckets.insert("ghost".into(), Vec::new());
        assert!(broken.validate().is_err());
    }
}
