//! End-to-end blocking: two build passes, a barrier, then the join.
//!
//! [`Blocker`] ties a validated [`BlockingConfig`] to the extractors and
//! tokenizer it implies. Build passes over the two datasets are independent
//! and run concurrently in [`build_pair`](Blocker::build_pair); candidate
//! generation only starts once both indexes are finalized.

use crate::candidates::{generate, generate_with, CandidateSet, GenerationStats};
use crate::config::{BlockingConfig, DatasetSide};
use crate::error::BlockingError;
use crate::extract::FieldExtractor;
use crate::index::{BlockIndex, BlockIndexBuilder, CancelFlag};
use crate::record::CandidatePair;
use crate::sink::PairSink;
use crate::source::SourceRecord;
use crate::tokenize::Tokenizer;
use std::io;

/// A configured blocking run.
#[derive(Debug, Clone)]
pub struct Blocker {
    threshold: i64,
    tokenizer: Tokenizer,
    first: FieldExtractor,
    second: FieldExtractor,
    cancel: CancelFlag,
}

impl Blocker {
    /// Validates `config` and prepares extractors for both datasets.
    pub fn new(config: &BlockingConfig) -> Result<Self, BlockingError> {
        Ok(Self {
            threshold: config.threshold,
            tokenizer: config.tokenizer()?,
            first: config.extractor(DatasetSide::First)?,
            second: config.extractor(DatasetSide::Second)?,
            cancel: CancelFlag::new(),
        })
    }

    /// Uses `flag` to cancel build passes started by this blocker.
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    /// Overrides the pruning threshold.
    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.threshold = threshold;
        self
    }

    /// The flag checked once per record by build passes.
    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Pruning threshold.
    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// Tokenizer shared by both datasets.
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// A fresh builder for one dataset, named after its side.
    pub fn builder(&self, side: DatasetSide) -> BlockIndexBuilder {
        let extractor = match side {
            DatasetSide::First => self.first.clone(),
            DatasetSide::Second => self.second.clone(),
        };
        BlockIndexBuilder::new(side.as_str(), extractor, self.tokenizer)
            .with_cancel_flag(self.cancel.clone())
    }

    /// Runs one build pass.
    pub fn build_index<I>(&self, side: DatasetSide, records: I) -> Result<BlockIndex, BlockingError>
    where
        I: IntoIterator<Item = io::Result<SourceRecord>>,
    {
        self.builder(side).build(records)
    }

    /// Builds both indexes concurrently and waits for both.
    ///
    /// If either pass fails, no index is returned. When both fail, a
    /// cancellation is reported only if nothing more specific happened.
    pub fn build_pair<A, B>(&self, first: A, second: B) -> Result<(BlockIndex, BlockIndex), BlockingError>
    where
        A: IntoIterator<Item = io::Result<SourceRecord>> + Send,
        B: IntoIterator<Item = io::Result<SourceRecord>> + Send,
    {
        let (first, second) = rayon::join(
            || self.build_index(DatasetSide::First, first),
            || self.build_index(DatasetSide::Second, second),
        );
        match (first, second) {
            (Ok(a), Ok(b)) => Ok((a, b)),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Err(a @ BlockingError::Cancelled { .. }), Err(b)) => {
                if matches!(b, BlockingError::Cancelled { .. }) {
                    Err(a)
                } else {
                    Err(b)
                }
            }
            (Err(a), Err(_)) => Err(a),
        }
    }

    /// Generates the full candidate set.
    pub fn candidates(&self, first: &BlockIndex, second: &BlockIndex) -> Result<CandidateSet, BlockingError> {
        generate(first, second, self.threshold)
    }

    /// Streams candidate pairs in batches of at most `batch_size`.
    pub fn emit_batches<F>(
        &self,
        first: &BlockIndex,
        second: &BlockIndex,
        batch_size: usize,
        mut on_batch: F,
    ) -> Result<GenerationStats, BlockingError>
    where
        F: FnMut(Vec<CandidatePair>) -> Result<(), BlockingError>,
    {
        let batch_size = batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);
        let stats = generate_with(first, second, self.threshold, |pair| {
            batch.push(pair);
            if batch.len() >= batch_size {
                on_batch(std::mem::replace(&mut batch, Vec::with_capacity(batch_size)))?;
            }
            Ok(())
        })?;
        if !batch.is_empty() {
            on_batch(batch)?;
        }
        Ok(stats)
    }

    /// Streams candidate pairs into `sink` and flushes it.
    pub fn write_to<S: PairSink + ?Sized>(
        &self,
        first: &BlockIndex,
        second: &BlockIndex,
        sink: &S,
        batch_size: usize,
    ) -> Result<GenerationStats, BlockingError> {
        let stats = self.emit_batches(first, second, batch_size, |batch| sink.write_batch(&batch))?;
        sink.flush()?;
        Ok(stats)
    }
}
