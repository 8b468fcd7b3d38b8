//! Error types for the blocking engine.
//!
//! [`BlockingError`] covers everything that aborts a configuration, build pass,
//! generation call or sink write. [`ExtractionError`] describes a single record
//! that could not be resolved; build passes recover from it locally by skipping
//! the record and counting it.

use std::io;

use thiserror::Error;

/// Fatal errors surfaced to the caller.
#[derive(Debug, Error)]
pub enum BlockingError {
    /// Invalid or incomplete configuration. Raised before any record is read.
    #[error("configuration error: {0}")]
    Config(String),
    /// A record could not be resolved against the configured paths.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Reading an input stream or writing an output sink failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A build pass was cancelled; the partial index has been discarded.
    #[error("build of index '{index}' cancelled after {records} records")]
    Cancelled { index: String, records: u64 },
    /// Two indexes built with different tokenizers were handed to the generator.
    #[error("indexes '{first}' and '{second}' were built with different tokenizers")]
    IncompatibleIndexes { first: String, second: String },
    /// An index snapshot could not be written, read or verified.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

/// Why a single record was skipped during a build pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// The identifier path matched nothing (or only `null`).
    #[error("identifier path '{path}' matched no value")]
    MissingId { path: String },
    /// The identifier path matched more than one value.
    #[error("identifier path '{path}' matched {count} values, expected exactly one")]
    AmbiguousId { path: String, count: usize },
    /// The identifier path matched an object or array.
    #[error("identifier at '{path}' is not a scalar")]
    NonScalarId { path: String },
    /// The identifier resolved to an empty string.
    #[error("identifier at '{path}' is empty")]
    EmptyId { path: String },
    /// The input line was not a parseable structured record.
    #[error("malformed record on line {line}: {reason}")]
    Malformed { line: u64, reason: String },
}
