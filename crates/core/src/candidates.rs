//! Threshold-pruned candidate-pair generation.
//!
//! Given two finalized block indexes the generator:
//!
//! 1. computes a [`PrunePlan`] once, up front: every token whose combined
//!    bucket size across both indexes exceeds the threshold is dropped from
//!    both sides;
//! 2. inverts the first index over the surviving tokens;
//! 3. for each first-dataset id, unions the second-dataset ids found in the
//!    buckets of its tokens and emits one pair per member of that union.
//!
//! Join cost is bounded by the sizes of the retained buckets, regardless of
//! how skewed the token distribution is. Neither input index is mutated.

use crate::error::BlockingError;
use crate::index::BlockIndex;
use crate::invert::invert_where;
use crate::record::CandidatePair;
use std::collections::HashSet;

/// Tokens removed from consideration for one pair of indexes.
#[derive(Debug)]
pub struct PrunePlan<'a> {
    pruned: HashSet<&'a str>,
    considered: usize,
    threshold: i64,
}

impl<'a> PrunePlan<'a> {
    /// Marks every token of either index whose combined size is above `threshold`.
    ///
    /// A threshold `<= 0` prunes every token.
    pub fn compute(first: &'a BlockIndex, second: &'a BlockIndex, threshold: i64) -> Self {
        let mut pruned = HashSet::new();
        let mut considered = 0;
        let second_only = second.tokens().filter(|t| !first.contains_token(t));
        for token in first.tokens().chain(second_only) {
            considered += 1;
            let combined = first.bucket_size(token) + second.bucket_size(token);
            if combined as i64 > threshold {
                pruned.insert(token);
            }
        }
        Self {
            pruned,
            considered,
            threshold,
        }
    }

    /// Returns `true` if `token` contributes no candidates.
    pub fn is_pruned(&self, token: &str) -> bool {
        self.pruned.contains(token)
    }

    /// Number of pruned tokens.
    pub fn pruned_count(&self) -> usize {
        self.pruned.len()
    }

    /// Number of distinct tokens across both indexes.
    pub fn considered_count(&self) -> usize {
        self.considered
    }

    /// Threshold the plan was computed with.
    pub fn threshold(&self) -> i64 {
        self.threshold
    }
}

/// Counters from one generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationStats {
    /// Distinct tokens across both indexes.
    pub tokens_considered: usize,
    /// Tokens dropped by the threshold.
    pub tokens_pruned: usize,
    /// First-dataset ids with at least one retained token.
    pub first_ids_joined: usize,
    /// Candidate pairs emitted.
    pub pairs_emitted: u64,
}

/// Deduplicated set of candidate pairs plus generation counters.
#[derive(Debug, Default)]
pub struct CandidateSet {
    pairs: HashSet<CandidatePair>,
    stats: GenerationStats,
}

impl CandidateSet {
    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if no pair was generated.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Returns `true` if `(first, second)` is a candidate.
    pub fn contains(&self, first: &str, second: &str) -> bool {
        self.pairs.contains(&CandidatePair::new(first, second))
    }

    /// Iterates pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &CandidatePair> + '_ {
        self.pairs.iter()
    }

    /// Generation counters.
    pub fn stats(&self) -> GenerationStats {
        self.stats
    }

    /// Consumes the set, returning the pairs sorted for deterministic output.
    pub fn into_sorted_vec(self) -> Vec<CandidatePair> {
        let mut pairs: Vec<CandidatePair> = self.pairs.into_iter().collect();
        pairs.sort_unstable();
        pairs
    }

    /// Consumes the set, returning the raw pair set.
    pub fn into_pairs(self) -> HashSet<CandidatePair> {
        self.pairs
    }
}

impl IntoIterator for CandidateSet {
    type Item = CandidatePair;
    type IntoIter = std::collections::hash_set::IntoIter<CandidatePair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

/// Generates the candidate-pair set for two finalized indexes.
pub fn generate(
    first: &BlockIndex,
    second: &BlockIndex,
    threshold: i64,
) -> Result<CandidateSet, BlockingError> {
    let mut pairs = HashSet::new();
    let stats = generate_with(first, second, threshold, |pair| {
        pairs.insert(pair);
        Ok(())
    })?;
    Ok(CandidateSet { pairs, stats })
}

/// Streams candidate pairs to `emit` without materializing the full set.
///
/// Pairs are produced grouped by first-dataset id; each pair is emitted
/// exactly once. An error returned by `emit` stops generation and is
/// propagated.
pub fn generate_with<F>(
    first: &BlockIndex,
    second: &BlockIndex,
    threshold: i64,
    mut emit: F,
) -> Result<GenerationStats, BlockingError>
where
    F: FnMut(CandidatePair) -> Result<(), BlockingError>,
{
    if first.tokenizer() != second.tokenizer() {
        return Err(BlockingError::IncompatibleIndexes {
            first: first.name().to_string(),
            second: second.name().to_string(),
        });
    }

    let plan = PrunePlan::compute(first, second, threshold);
    tracing::debug!(
        first = first.name(),
        second = second.name(),
        threshold,
        tokens_considered = plan.considered_count(),
        tokens_pruned = plan.pruned_count(),
        "Prune plan computed"
    );

    let inverted = invert_where(first, |token| {
        !plan.is_pruned(token) && second.contains_token(token)
    });

    let mut stats = GenerationStats {
        tokens_considered: plan.considered_count(),
        tokens_pruned: plan.pruned_count(),
        first_ids_joined: inverted.len(),
        pairs_emitted: 0,
    };

    let mut matched: HashSet<&str> = HashSet::new();
    for (first_id, tokens) in inverted.iter() {
        matched.clear();
        for token in tokens {
            if let Some(second_ids) = second.get(token) {
                matched.extend(second_ids.iter().map(String::as_str));
            }
        }
        for second_id in matched.drain() {
            emit(CandidatePair::new(first_id, second_id))?;
            stats.pairs_emitted += 1;
        }
    }

    tracing::info!(
        first = first.name(),
        second = second.name(),
        pairs = stats.pairs_emitted,
        tokens_pruned = stats.tokens_pruned,
        "Candidate generation complete"
    );
    Ok(stats)
}
