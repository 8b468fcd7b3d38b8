//! # recblock-core
//!
//! Blocking for record linkage: index two JSON datasets by signature tokens
//! (exact values or q-grams), prune oversized blocks, and emit the candidate
//! record pairs that share at least one surviving token.
//!
//! This is the synchronous library crate; the `recblock` binary in
//! `recblock-cli` drives it from an async runtime.

/// Candidate generation: block pruning and the join of two indexes.
pub mod candidates;
/// Configuration file schema and global defaults.
pub mod config;
/// Error types shared across the crate.
pub mod error;
/// JSON path evaluation and record extraction.
pub mod extract;
/// Block index construction, finalization, and cancellation.
pub mod index;
/// Token-keyed to record-keyed inversion of a block index.
pub mod invert;
/// Two-dataset blocking runs.
pub mod pipeline;
/// Record and candidate pair types.
pub mod record;
/// Output sinks for candidate pairs.
pub mod sink;
/// Disk snapshots of finalized indexes.
pub mod snapshot;
/// JSON Lines record sources.
pub mod source;
/// Exact and q-gram tokenizers.
pub mod tokenize;

pub use candidates::{generate, generate_with, CandidateSet, GenerationStats, PrunePlan};
pub use config::{BlockingConfig, DatasetKeys, DatasetSide};
pub use error::{BlockingError, ExtractionError};
pub use extract::{FieldExtractor, FieldPath};
pub use index::{BlockIndex, BlockIndexBuilder, BuildStats, CancelFlag};
pub use invert::{invert, invert_where, InvertedIndex};
pub use pipeline::Blocker;
pub use record::{CandidatePair, RecordRef};
pub use sink::{JsonLinesSink, PairSink};
pub use snapshot::{load_index, save_index};
pub use source::{from_values, JsonLinesSource, SourceRecord};
pub use tokenize::{Method, Normalization, Tokenizer};

/// Result alias for fallible blocking operations.
pub type Result<T> = std::result::Result<T, BlockingError>;
